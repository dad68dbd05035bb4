//! Stakeholder's Dashboard: hiring figures for 2021 from the data warehouse.

mod cli;

use cli::Cli;
use hiring_dashboard::config::{Credentials, WarehouseConfig};
use hiring_dashboard::dashboard::{load_dashboard, DashboardRenderer};
use hiring_dashboard::db::{MockWarehouse, WarehouseBackend, WarehouseConnector};
use hiring_dashboard::error::{DashboardError, Result};
use hiring_dashboard::logging;
use hiring_dashboard::server::{self, AppState};
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    logging::init_stderr_logging();

    if let Err(e) = run().await {
        error!("{}: {}", e.category(), e.message());
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse_args();
    let connector = build_connector(&cli)?;
    let renderer = DashboardRenderer::new()?;

    if cli.once {
        return render_once(&cli, connector.as_ref(), &renderer).await;
    }

    let addr = cli.bind_addr()?;
    server::serve(addr, Arc::new(AppState::new(connector, renderer))).await
}

/// Builds the connector for the selected backend.
fn build_connector(cli: &Cli) -> Result<Arc<dyn WarehouseConnector>> {
    let backend = cli.backend()?;
    if backend == WarehouseBackend::Mock {
        info!("Using mock warehouse with demo data");
        return Ok(Arc::new(MockWarehouse::demo()));
    }

    let credentials = Credentials::resolve(cli.secrets.as_deref(), cli.env_file.as_deref())?;
    info!("Warehouse: {} ({})", credentials.display_string(), backend);
    Ok(Arc::new(WarehouseConfig::new(backend, credentials)))
}

/// Performs a single run and writes the page.
async fn render_once(
    cli: &Cli,
    connector: &dyn WarehouseConnector,
    renderer: &DashboardRenderer,
) -> Result<()> {
    let dashboard = load_dashboard(connector).await?;
    let html = renderer.render(&dashboard)?;

    match &cli.output_file {
        Some(path) => {
            std::fs::write(path, html).map_err(|e| {
                DashboardError::internal(format!("Failed to write {}: {e}", path.display()))
            })?;
            info!("Dashboard written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(html.as_bytes())
                .and_then(|_| stdout.flush())
                .map_err(|e| DashboardError::internal(format!("Failed to write page: {e}")))?;
        }
    }

    Ok(())
}
