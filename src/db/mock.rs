//! Mock warehouse for testing and `--mock-db` runs.
//!
//! Serves the dashboard queries from an in-memory recruiting dataset and
//! records how sessions are used.

use super::{QueryResult, WarehouseBackend, WarehouseClient, WarehouseConnector};
use crate::error::{DashboardError, Result};
use crate::queries::{self, QueryId};
use crate::recruiting::{DepartmentHires, QuarterlyHires, RecruitingDataset};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Default)]
struct SessionStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    executed: AtomicUsize,
}

/// An in-memory warehouse holding one recruiting dataset.
#[derive(Debug, Clone)]
pub struct MockWarehouse {
    dataset: Arc<RecruitingDataset>,
    stats: Arc<SessionStats>,
}

impl MockWarehouse {
    /// Creates a warehouse serving the given dataset.
    pub fn new(dataset: RecruitingDataset) -> Self {
        Self {
            dataset: Arc::new(dataset),
            stats: Arc::default(),
        }
    }

    /// Creates a warehouse serving [`RecruitingDataset::demo`].
    pub fn demo() -> Self {
        Self::new(RecruitingDataset::demo())
    }

    /// The dataset this warehouse serves.
    pub fn dataset(&self) -> &RecruitingDataset {
        &self.dataset
    }

    /// Number of sessions opened so far.
    pub fn sessions_opened(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    /// Number of sessions closed so far. Repeated closes of one session count once.
    pub fn sessions_closed(&self) -> usize {
        self.stats.closed.load(Ordering::SeqCst)
    }

    /// Number of statements executed successfully so far.
    pub fn queries_executed(&self) -> usize {
        self.stats.executed.load(Ordering::SeqCst)
    }

    fn open_session(&self) -> MockWarehouseClient {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        MockWarehouseClient {
            dataset: Arc::clone(&self.dataset),
            stats: Arc::clone(&self.stats),
            closed: AtomicBool::new(false),
            statements: AtomicUsize::new(0),
            fail_on_query: None,
        }
    }
}

impl Default for MockWarehouse {
    fn default() -> Self {
        Self::new(RecruitingDataset::default())
    }
}

#[async_trait]
impl WarehouseConnector for MockWarehouse {
    async fn connect(&self) -> Result<Box<dyn WarehouseClient>> {
        Ok(Box::new(self.open_session()))
    }
}

/// A session on a [`MockWarehouse`].
#[derive(Debug)]
pub struct MockWarehouseClient {
    dataset: Arc<RecruitingDataset>,
    stats: Arc<SessionStats>,
    closed: AtomicBool,
    statements: AtomicUsize,
    /// 1-based statement number that fails, if any.
    fail_on_query: Option<(usize, String)>,
}

impl MockWarehouseClient {
    fn evaluate(&self, sql: &str) -> Result<QueryResult> {
        let definition = queries::find_by_sql(sql).ok_or_else(|| {
            DashboardError::query(
                "SQL compilation error: the mock warehouse only answers the dashboard queries",
            )
        })?;

        Ok(match definition.id {
            QueryId::QuarterlyHires => {
                QuarterlyHires::to_result(&self.dataset.quarterly_hiring_matrix())
            }
            QueryId::AboveAverageDepartments => {
                DepartmentHires::to_result(&self.dataset.above_average_departments())
            }
        })
    }
}

#[async_trait]
impl WarehouseClient for MockWarehouseClient {
    fn backend(&self) -> WarehouseBackend {
        WarehouseBackend::Mock
    }

    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DashboardError::query("Session is closed"));
        }

        let attempt = self.statements.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((fail_at, message)) = &self.fail_on_query {
            if attempt == *fail_at {
                return Err(DashboardError::query(message.clone()));
            }
        }

        let start = Instant::now();
        let result = self.evaluate(sql)?;
        self.stats.executed.fetch_add(1, Ordering::SeqCst);
        debug!("Mock warehouse returned {} rows", result.row_count);

        Ok(result.with_execution_time(start.elapsed().max(Duration::from_millis(1))))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Where a [`FailingWarehouse`] fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailurePoint {
    /// Opening the session fails with a connection error.
    Connect(String),
    /// The n-th statement (1-based) of a session fails with a query error.
    Query(usize, String),
}

/// A mock warehouse that fails at a chosen point, for exercising error paths.
#[derive(Debug, Clone)]
pub struct FailingWarehouse {
    inner: MockWarehouse,
    failure: FailurePoint,
}

impl FailingWarehouse {
    /// Fails every connection attempt.
    pub fn on_connect(message: impl Into<String>) -> Self {
        Self {
            inner: MockWarehouse::demo(),
            failure: FailurePoint::Connect(message.into()),
        }
    }

    /// Fails the n-th statement of each session.
    pub fn on_query(n: usize, message: impl Into<String>) -> Self {
        Self {
            inner: MockWarehouse::demo(),
            failure: FailurePoint::Query(n, message.into()),
        }
    }

    /// The underlying mock warehouse, for inspecting session counts.
    pub fn warehouse(&self) -> &MockWarehouse {
        &self.inner
    }
}

#[async_trait]
impl WarehouseConnector for FailingWarehouse {
    async fn connect(&self) -> Result<Box<dyn WarehouseClient>> {
        match &self.failure {
            FailurePoint::Connect(message) => Err(DashboardError::connection(message.clone())),
            FailurePoint::Query(n, message) => {
                let mut client = self.inner.open_session();
                client.fail_on_query = Some((*n, message.clone()));
                Ok(Box::new(client))
            }
        }
    }
}
