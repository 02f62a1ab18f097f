//! marketdash library
//!
//! Market data backend for the financial dashboard: an upstream fetcher
//! behind a server-side TTL cache with stale-if-error fallback, and a client
//! orchestrator with its own session cache.

pub mod boundary;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod refresh;
pub mod server;
pub mod telemetry;
