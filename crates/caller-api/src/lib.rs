//! HTTP surface for caller spam detection.

pub mod config;
pub mod server;
