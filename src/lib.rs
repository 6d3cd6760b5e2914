pub mod app;
pub mod config;
pub mod handlers;
pub mod host;
pub mod http;
pub mod manager;
pub mod observability;
pub mod server;
