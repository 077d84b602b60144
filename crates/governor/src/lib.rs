//! Module governor service: configuration and read-only HTTP views

pub mod api;
pub mod config;
