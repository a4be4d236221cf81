pub mod client;
pub mod error;
pub mod usage;

pub use client::{UpstreamClient, UpstreamResponse};
pub use error::UpstreamError;
pub use usage::TokenUsage;
