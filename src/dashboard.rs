//! Dashboard assembly and HTML rendering.

use crate::db::{QueryResult, Value, WarehouseConnector};
use crate::error::{DashboardError, Result};
use crate::queries::{QueryDefinition, DASHBOARD_QUERIES};
use crate::session;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tera::{Context, Tera};

/// Page title.
pub const PAGE_TITLE: &str = "Stakeholder's Dashboard";

const BASE_TEMPLATE: &str = include_str!("templates/base.html");
const DASHBOARD_TEMPLATE: &str = include_str!("templates/dashboard.html");
const ERROR_TEMPLATE: &str = include_str!("templates/error.html");

/// One query and its result.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSection {
    pub query: &'static QueryDefinition,
    pub result: QueryResult,
}

/// The results of one dashboard run.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub title: &'static str,
    pub sections: Vec<DashboardSection>,
    pub generated_at: DateTime<Utc>,
}

impl Dashboard {
    /// Finds the section for a query id.
    pub fn section(&self, id: &str) -> Option<&DashboardSection> {
        self.sections.iter().find(|s| s.query.id.as_str() == id)
    }
}

/// Performs one run: opens a session, runs every dashboard query, closes
/// the session.
pub async fn load_dashboard(connector: &dyn WarehouseConnector) -> Result<Dashboard> {
    let results = session::run_queries(connector, &DASHBOARD_QUERIES).await?;
    Ok(Dashboard {
        title: PAGE_TITLE,
        sections: results
            .into_iter()
            .map(|(query, result)| DashboardSection { query, result })
            .collect(),
        generated_at: Utc::now(),
    })
}

#[derive(Serialize)]
struct CellView {
    text: String,
    numeric: bool,
    null: bool,
}

impl From<&Value> for CellView {
    fn from(value: &Value) -> Self {
        Self {
            text: value.to_display_string(),
            numeric: value.is_numeric(),
            null: value.is_null(),
        }
    }
}

#[derive(Serialize)]
struct SectionView<'a> {
    id: &'static str,
    header: &'static str,
    description: &'static str,
    ordering: &'static str,
    columns: &'a [crate::db::ColumnInfo],
    rows: Vec<Vec<CellView>>,
    row_count: usize,
    elapsed_ms: u64,
}

impl<'a> From<&'a DashboardSection> for SectionView<'a> {
    fn from(section: &'a DashboardSection) -> Self {
        Self {
            id: section.query.id.as_str(),
            header: section.query.header,
            description: section.query.description,
            ordering: section.query.ordering,
            columns: &section.result.columns,
            rows: section
                .result
                .rows
                .iter()
                .map(|row| row.iter().map(CellView::from).collect())
                .collect(),
            row_count: section.result.row_count,
            elapsed_ms: section.result.execution_time.as_millis() as u64,
        }
    }
}

/// Renders dashboards and error pages to HTML.
///
/// Templates are compiled once; output is HTML-escaped.
#[derive(Debug, Clone)]
pub struct DashboardRenderer {
    tera: Tera,
}

impl DashboardRenderer {
    /// Compiles the page templates.
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("base.html", BASE_TEMPLATE),
            ("dashboard.html", DASHBOARD_TEMPLATE),
            ("error.html", ERROR_TEMPLATE),
        ])
        .map_err(|e| DashboardError::render(format!("Invalid template: {e}")))?;
        Ok(Self { tera })
    }

    /// Renders the dashboard page.
    pub fn render(&self, dashboard: &Dashboard) -> Result<String> {
        let sections: Vec<SectionView<'_>> =
            dashboard.sections.iter().map(SectionView::from).collect();

        let mut context = Context::new();
        context.insert("title", dashboard.title);
        context.insert("sections", &sections);
        context.insert(
            "generated_at",
            &dashboard.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );

        self.render_template("dashboard.html", &context)
    }

    /// Renders the page shown when a run fails.
    pub fn render_error(&self, error: &DashboardError) -> Result<String> {
        let mut context = Context::new();
        context.insert("title", PAGE_TITLE);
        context.insert("category", error.category());
        context.insert("message", error.message());

        self.render_template("error.html", &context)
    }

    fn render_template(&self, name: &str, context: &Context) -> Result<String> {
        self.tera
            .render(name, context)
            .map_err(|e| DashboardError::render(format!("Failed to render {name}: {e}")))
    }
}
