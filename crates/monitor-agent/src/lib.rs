//! Process edge of the adaptive monitor: configuration and HTTP endpoints

pub mod api;
pub mod config;
