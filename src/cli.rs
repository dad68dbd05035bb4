//! Command-line argument parsing for the dashboard.

use clap::Parser;
use hiring_dashboard::config::{parse_bind_addr, DEFAULT_BIND};
use hiring_dashboard::db::WarehouseBackend;
use hiring_dashboard::error::Result;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Stakeholder dashboard over the recruiting tables of a data warehouse.
#[derive(Parser, Debug)]
#[command(name = "hiring-dashboard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Env file with the credential fields
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// TOML secrets file with a [snowflake_credentials] table
    #[arg(long, value_name = "PATH")]
    pub secrets: Option<PathBuf>,

    /// Warehouse backend: snowflake, postgres or mock
    #[arg(
        short = 'b',
        long,
        value_name = "BACKEND",
        env = "DASHBOARD_BACKEND",
        default_value = "snowflake"
    )]
    pub backend: String,

    /// Use mock warehouse (in-memory demo data, no credentials)
    #[arg(long)]
    pub mock_db: bool,

    /// Address the web server listens on
    #[arg(long, value_name = "ADDR", env = "DASHBOARD_BIND", default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Render the page once and exit instead of serving it
    #[arg(long)]
    pub once: bool,

    /// Write the page rendered by --once to a file instead of stdout
    #[arg(long, value_name = "PATH", requires = "once")]
    pub output_file: Option<PathBuf>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Backend selected by `--backend` or `--mock-db`.
    pub fn backend(&self) -> Result<WarehouseBackend> {
        if self.mock_db {
            return Ok(WarehouseBackend::Mock);
        }
        self.backend.parse()
    }

    /// Parsed listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        parse_bind_addr(&self.bind)
    }
}
