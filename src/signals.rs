use anyhow::{bail, Result};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

#[cfg(unix)]
use nix::libc;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::config::Config;
use crate::registry::ProviderRegistry;

/// Shutdown signal types
#[derive(Debug, Clone, Copy)]
pub enum ShutdownSignal {
    /// Graceful shutdown (drain connections, clean up)
    Graceful,
}

/// Setup signal handlers for the server
///
/// Returns a broadcast sender for shutdown signals and a join handle for the signal task
///
/// Handles:
/// - SIGTERM/SIGINT: Graceful shutdown
/// - SIGHUP: Configuration reload
#[cfg(unix)]
pub fn setup_signal_handlers(
    config: Arc<ArcSwap<Config>>,
    registry: Arc<ArcSwap<ProviderRegistry>>,
) -> (
    broadcast::Sender<ShutdownSignal>,
    tokio::task::JoinHandle<()>,
) {
    let (shutdown_tx, _) = broadcast::channel(16);
    let tx_clone = shutdown_tx.clone();

    let handle = tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");
        let mut sighup = signal(SignalKind::hangup()).expect("Failed to setup SIGHUP handler");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("SIGTERM received, initiating graceful shutdown");
                    let _ = tx_clone.send(ShutdownSignal::Graceful);
                    break;
                }
                _ = sigint.recv() => {
                    info!("SIGINT received, initiating graceful shutdown");
                    let _ = tx_clone.send(ShutdownSignal::Graceful);
                    break;
                }
                _ = sighup.recv() => {
                    info!("SIGHUP received, reloading configuration");
                    if let Err(e) = reload_config(config.clone(), &registry).await {
                        error!("Failed to reload configuration: {}", e);
                    } else {
                        info!("Configuration reloaded successfully");
                    }
                }
            }
        }
    });

    (shutdown_tx, handle)
}

/// Windows placeholder - signals not fully supported
#[cfg(not(unix))]
pub fn setup_signal_handlers(
    _config: Arc<ArcSwap<Config>>,
    _registry: Arc<ArcSwap<ProviderRegistry>>,
) -> (
    broadcast::Sender<ShutdownSignal>,
    tokio::task::JoinHandle<()>,
) {
    let (shutdown_tx, _) = broadcast::channel(16);
    let tx_clone = shutdown_tx.clone();

    let handle = tokio::spawn(async move {
        // On Windows, only Ctrl+C is supported
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, initiating shutdown");
                let _ = tx_clone.send(ShutdownSignal::Graceful);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        }
    });

    (shutdown_tx, handle)
}

/// Reload configuration atomically with load balancer rebuild
///
/// This loads a new configuration, validates it, rebuilds load balancers,
/// and atomically swaps both config and load balancers.
/// If any step fails, the old configuration remains in place.
async fn reload_config(
    config: Arc<ArcSwap<Config>>,
    registry: &Arc<ArcSwap<ProviderRegistry>>,
) -> Result<()> {
    info!("Loading new configuration...");

    // Phase 1: Load and validate new config
    let new_config = crate::config::load_config()?;

    info!(
        "New configuration loaded. Server: {}:{}, Routing Rules: {}, API Keys: {}",
        new_config.server.host,
        new_config.server.port,
        new_config.routing.rules.len(),
        new_config.api_keys.len()
    );

    // Phase 2: Build new provider registry from new config
    info!("Building new provider registry...");
    let new_registry = crate::server::create_provider_registry(&new_config, None);

    // Phase 3: Validate that each provider has at least one healthy instance
    for (provider_name, registered) in new_registry.iter() {
        let healthy_count = registered.load_balancer.healthy_instance_count().await;
        if healthy_count == 0 {
            bail!(
                "Rejecting reload: Provider {} has no healthy instances (all instances are disabled or unhealthy)",
                provider_name
            );
        }
        info!(
            "Provider {} has {} healthy instance(s)",
            provider_name, healthy_count
        );
    }

    // Phase 3.5: Migrate sessions from old registry to new ones
    info!("Migrating sticky sessions from old load balancers...");
    let old_registry = registry.load();
    let mut total_migrated = 0;
    let mut total_dropped = 0;

    for (provider_name, new_reg) in new_registry.iter() {
        if let Some(old_reg) = old_registry.get(provider_name) {
            let stats = new_reg
                .load_balancer
                .migrate_sessions_from(&old_reg.load_balancer)
                .await;

            total_migrated += stats.migrated;
            total_dropped += stats.total_dropped();

            info!(
                provider = %provider_name,
                total = stats.total_sessions,
                migrated = stats.migrated,
                dropped_expired = stats.dropped_expired,
                dropped_not_found = stats.dropped_instance_not_found,
                dropped_disabled = stats.dropped_instance_disabled,
                dropped_unhealthy = stats.dropped_instance_unhealthy,
                "Session migration completed for provider"
            );
        } else {
            info!(
                provider = %provider_name,
                "No old load balancer found, skipping session migration"
            );
        }
    }

    info!(
        total_migrated = total_migrated,
        total_dropped = total_dropped,
        "Session migration completed for all providers"
    );

    // Phase 4: Atomic swap - both config and registry are updated together
    config.store(Arc::new(new_config));
    registry.store(Arc::new(new_registry));

    info!("Configuration and provider registry swapped atomically");
    Ok(())
}

/// Send a signal to a process by PID (for stop/reload commands)
#[cfg(unix)]
pub fn send_signal_to_pid(pid: u32, signal_kind: SignalKind) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let nix_signal = match signal_kind.as_raw_value() {
        libc::SIGTERM => Signal::SIGTERM,
        libc::SIGHUP => Signal::SIGHUP,
        libc::SIGINT => Signal::SIGINT,
        libc::SIGKILL => Signal::SIGKILL,
        libc::SIGCONT => Signal::SIGCONT,
        _ => bail!("Unsupported signal: {:?}", signal_kind),
    };

    info!("Sending signal {:?} to PID {}", nix_signal, pid);

    kill(Pid::from_raw(pid as i32), nix_signal)
        .map_err(|e| anyhow::anyhow!("Failed to send signal to PID {}: {}", pid, e))?;

    Ok(())
}

/// Windows placeholder
#[cfg(not(unix))]
pub fn send_signal_to_pid(_pid: u32, _signal_kind: ()) -> Result<()> {
    bail!("Signal sending not supported on this platform");
}
