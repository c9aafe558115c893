pub mod capabilities;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod pricing;
pub mod providers;
pub mod registry;
pub mod server;
pub mod storage;
pub mod structured_output;
pub mod tts;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::{DispatchError, ProviderError};
pub use registry::ProviderRegistry;
pub use types::{ProviderOutput, ProviderRequest, ProviderResponse};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
