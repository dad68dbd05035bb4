//! Integration tests for the hiring dashboard.

pub mod dashboard_test;
pub mod snowflake_test;
