//! Health analyzer
//!
//! Receives host samples over HTTP, classifies them and stores every
//! result as an analysis record.

pub mod api;
pub mod config;
