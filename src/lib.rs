//! Stakeholder's Dashboard over a recruiting dataset in a data warehouse.
//!
//! This library exposes the core modules for the binary and the integration
//! tests.

pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod logging;
pub mod queries;
pub mod recruiting;
pub mod safety;
pub mod server;
pub mod session;
