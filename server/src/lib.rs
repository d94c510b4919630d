//! knm Server
//!
//! HTTP front end over the FX engine: fiat cross-rates on `/rates` and crypto
//! conversions on `/exchange`.

pub mod api;
pub mod config;
pub mod server;

pub use api::ApiServer;
pub use config::ServerConfig;
pub use server::serve;
