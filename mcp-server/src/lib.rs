//! Taskhive server: configuration, telemetry and the stdio transport
//! around the facade layer. The composition root lives in `main.rs`.

pub mod config;
pub mod stdio;
pub mod telemetry;

pub use config::Config;
