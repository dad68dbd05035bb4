//! Scoped warehouse sessions.
//!
//! A run opens one session, executes its queries in order and closes the
//! session exactly once on every exit path before returning.

use crate::db::{QueryResult, WarehouseClient, WarehouseConnector};
use crate::error::{DashboardError, Result};
use crate::queries::QueryDefinition;
use crate::safety;
use tracing::{debug, error, info, warn};

/// An open session that only runs read-only statements.
///
/// Dropping a session that was not closed, for example when the run is
/// cancelled mid-query, closes it on the current runtime in the background.
pub struct Session {
    client: Option<Box<dyn WarehouseClient>>,
}

impl Session {
    /// Opens a session through the connector.
    pub async fn open(connector: &dyn WarehouseConnector) -> Result<Self> {
        let client = connector.connect().await.inspect_err(|e| {
            error!("Failed to open warehouse session: {}", e);
        })?;
        info!("Opened {} session", client.backend());
        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&self) -> Result<&dyn WarehouseClient> {
        self.client
            .as_deref()
            .ok_or_else(|| DashboardError::internal("Session is closed"))
    }

    /// Executes one dashboard query.
    pub async fn run(&self, definition: &QueryDefinition) -> Result<QueryResult> {
        let client = self.client()?;
        let id = definition.id.as_str();
        safety::ensure_read_only(definition.sql, client.backend())?;

        debug!(query = id, "Executing query");
        let result = client.execute_query(definition.sql).await.inspect_err(|e| {
            error!(query = id, "Query failed: {}", e);
        })?;

        info!(
            query = id,
            rows = result.row_count,
            elapsed_ms = result.execution_time.as_millis() as u64,
            "Query finished"
        );
        Ok(result)
    }

    /// Releases the session.
    pub async fn close(mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.close().await?;
            debug!("Closed warehouse session");
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Warehouse session abandoned before close, closing in background");
                handle.spawn(async move {
                    if let Err(e) = client.close().await {
                        warn!("Failed to close abandoned warehouse session: {}", e);
                    }
                });
            }
            Err(_) => warn!("Warehouse session dropped outside a runtime and left open"),
        }
    }
}

/// Runs the queries in order on a single session.
///
/// The session is closed whether or not a query fails. The first failure
/// stops the run and is returned after the close; nothing is returned for
/// the queries that did succeed. A failure to close is logged and does not
/// replace the run's outcome.
pub async fn run_queries(
    connector: &dyn WarehouseConnector,
    definitions: &[&'static QueryDefinition],
) -> Result<Vec<(&'static QueryDefinition, QueryResult)>> {
    let session = Session::open(connector).await?;

    let outcome = run_all(&session, definitions).await;

    if let Err(e) = session.close().await {
        warn!("Failed to close warehouse session: {}", e);
    }

    outcome
}

async fn run_all(
    session: &Session,
    definitions: &[&'static QueryDefinition],
) -> Result<Vec<(&'static QueryDefinition, QueryResult)>> {
    let mut results = Vec::with_capacity(definitions.len());
    for definition in definitions.iter().copied() {
        let result = session.run(definition).await?;
        results.push((definition, result));
    }
    Ok(results)
}
