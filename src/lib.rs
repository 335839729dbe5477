//! storewatch library - store uptime/downtime reports
//!
//! This module exports internal components for integration testing.

pub mod calculator;
pub mod cli;
pub mod config;
pub mod error;
pub mod extrapolate;
pub mod health;
pub mod hours;
pub mod ingest;
pub mod jobs;
pub mod model;
pub mod report;
pub mod search;
pub mod server;
pub mod store;
