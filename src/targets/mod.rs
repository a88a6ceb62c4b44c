pub mod fetcher;
pub mod types;

pub use fetcher::{HttpTargetFetcher, TargetSource};
pub use types::{RawTarget, TargetData, TargetStatusDocument};
