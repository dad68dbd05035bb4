//! Read-only enforcement for warehouse statements.
//!
//! Every statement is parsed in the backend's dialect before it is sent.
//! Only a single pure query is allowed; anything that could write, including
//! a data-modifying CTE nested anywhere in the query, is refused.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::parser::Parser;

use crate::db::WarehouseBackend;
use crate::error::{DashboardError, Result};

/// Checks that `sql` is a single read-only query in the backend's dialect.
pub fn ensure_read_only(sql: &str, backend: WarehouseBackend) -> Result<()> {
    let dialect = backend.dialect();
    let statements = Parser::parse_sql(&*dialect, sql)
        .map_err(|e| DashboardError::query(format!("SQL parse error: {e}")))?;

    match statements.as_slice() {
        [] => Err(DashboardError::query("Empty SQL statement")),
        [Statement::Query(query)] if is_read_only_query(query) => Ok(()),
        [statement] => Err(DashboardError::query(format!(
            "Refusing to run {} statement: the dashboard is read-only",
            leading_keyword(statement)
        ))),
        many => Err(DashboardError::query(format!(
            "Expected a single statement, found {}",
            many.len()
        ))),
    }
}

/// First keyword of the statement, for error messages.
fn leading_keyword(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .next()
        .unwrap_or("an unknown")
        .to_uppercase()
}

fn is_read_only_query(query: &Query) -> bool {
    let ctes_read_only = query
        .with
        .as_ref()
        .map_or(true, |with| with.cte_tables.iter().all(|cte| is_read_only_query(&cte.query)));

    ctes_read_only && is_read_only_set_expr(&query.body)
}

fn is_read_only_set_expr(set_expr: &SetExpr) -> bool {
    match set_expr {
        SetExpr::Select(select) => is_read_only_select(select),
        SetExpr::Query(query) => is_read_only_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            is_read_only_set_expr(left) && is_read_only_set_expr(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        // INSERT, UPDATE, DELETE, MERGE bodies
        _ => false,
    }
}

fn is_read_only_select(select: &Select) -> bool {
    select.from.iter().all(is_read_only_table_with_joins)
}

fn is_read_only_table_with_joins(twj: &TableWithJoins) -> bool {
    is_read_only_table_factor(&twj.relation)
        && twj
            .joins
            .iter()
            .all(|join| is_read_only_table_factor(&join.relation))
}

fn is_read_only_table_factor(factor: &TableFactor) -> bool {
    match factor {
        TableFactor::Derived { subquery, .. } => is_read_only_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => is_read_only_table_with_joins(table_with_joins),
        _ => true,
    }
}
