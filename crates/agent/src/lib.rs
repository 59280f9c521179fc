//! Host agent
//!
//! Periodically samples the local host and ships each sample to the
//! health analyzer. Exposes its own health and metrics endpoints.

pub mod api;
pub mod config;
