pub mod cli;
pub mod config;
pub mod error;
pub mod k8s;
pub mod metrics;
pub mod scheduler;
pub mod targets;

pub use error::{DiscoveryError, FetchError, Result, TargetwatchError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
