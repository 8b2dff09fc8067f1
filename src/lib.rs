pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod types;

// Wide-to-relational transform engine
pub mod pipeline;

// Use cases and the ports they depend on
pub mod app;
// Adapters: JSON row source, JSON file sink, in-memory store
pub mod infra;
