pub mod config;
pub mod error;
pub mod inference;
pub mod routes;
pub mod server;
pub mod telemetry;
