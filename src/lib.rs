// Library crate shared by the binary and the integration tests.

pub mod auth;
pub mod config;
pub mod credits;
pub mod error;
pub mod extractor;
pub mod insight;
pub mod model;
pub mod orchestrator;
pub mod reconcile;
pub mod routes;
pub mod scan_log;
pub mod server;
pub mod settings;
pub mod state;
pub mod store;
