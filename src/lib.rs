pub mod a2a;
pub mod auth;
pub mod circuit_breaker;
pub mod cli;
pub mod commands;
pub mod config;
pub mod conversion_warnings;
pub mod converters;
pub mod daemon;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod health_checker;
pub mod image_utils;
pub mod logging;
pub mod mcp;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod pid;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod router;
pub mod server;
pub mod signals;
pub mod streaming;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
