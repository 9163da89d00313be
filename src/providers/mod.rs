pub mod adapter;
pub mod anthropic;
pub mod generic_openai;
pub mod gemini;
pub mod mock;

pub use adapter::{Adapter, AdapterStream, ProviderKind};
