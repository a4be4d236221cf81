pub mod client;
pub mod config;
pub mod error;
mod interval;
mod mapping;
mod scroll;
mod usage;

pub use client::EventStore;
pub use config::StoreConfig;
pub use error::StoreError;
pub use scroll::ScrollStream;
