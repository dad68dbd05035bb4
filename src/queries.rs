//! The two dashboard queries.
//!
//! Both statements are plain ANSI SQL accepted unchanged by Snowflake and
//! Postgres. The quarter pivot is written as conditional aggregation so
//! that a quarter without hires yields 0 rather than NULL on either backend.

use serde::Serialize;

/// Identifies a dashboard query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryId {
    QuarterlyHires,
    AboveAverageDepartments,
}

impl QueryId {
    /// Stable identifier used in logs and the JSON API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuarterlyHires => "quarterly_hires",
            Self::AboveAverageDepartments => "above_average_departments",
        }
    }
}

/// A fixed, parameterless query and the captions shown with its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryDefinition {
    pub id: QueryId,
    /// Section header on the page.
    pub header: &'static str,
    /// What the table contains.
    pub description: &'static str,
    /// How the table is initially ordered.
    pub ordering: &'static str,
    /// SQL text sent to the warehouse.
    #[serde(skip)]
    pub sql: &'static str,
}

/// Number of employees hired in 2021 per department and job, by quarter.
pub const QUARTERLY_HIRES: QueryDefinition = QueryDefinition {
    id: QueryId::QuarterlyHires,
    header: "Requirement 1",
    description: "Number of employees hired for each job and department in 2021 divided by quarter.",
    ordering: "The table is initially ordered alphabetically by department and job.",
    sql: r#"
WITH hires_2021 AS (
    SELECT
        he.id AS hire_id,
        de.department AS department,
        jo.job AS job,
        CONCAT('Q', EXTRACT(QUARTER FROM he.datetime)) AS quarter_label
    FROM hired_employees AS he
    LEFT JOIN departments AS de ON he.department_id = de.id
    LEFT JOIN jobs AS jo ON he.job_id = jo.id
    WHERE EXTRACT(YEAR FROM he.datetime) = 2021
)
SELECT
    department AS "DEPARTMENT",
    job AS "JOB",
    COUNT(CASE WHEN quarter_label = 'Q1' THEN hire_id END) AS "Q1",
    COUNT(CASE WHEN quarter_label = 'Q2' THEN hire_id END) AS "Q2",
    COUNT(CASE WHEN quarter_label = 'Q3' THEN hire_id END) AS "Q3",
    COUNT(CASE WHEN quarter_label = 'Q4' THEN hire_id END) AS "Q4"
FROM hires_2021
GROUP BY department, job
ORDER BY department ASC NULLS LAST, job ASC NULLS LAST
"#,
};

/// Departments that hired more employees in 2021 than the mean department.
pub const ABOVE_AVERAGE_DEPARTMENTS: QueryDefinition = QueryDefinition {
    id: QueryId::AboveAverageDepartments,
    header: "Requirement 2",
    description: "List of ids, name and number of employees hired of each department that hired more employees than the mean of employees hired in 2021 for all the departments.",
    ordering: "The table is initially ordered by the number of employees hired (descending).",
    sql: r#"
WITH hires_2021 AS (
    SELECT
        he.id AS hire_id,
        de.id AS department_id,
        de.department AS department
    FROM hired_employees AS he
    LEFT JOIN departments AS de ON he.department_id = de.id
    WHERE EXTRACT(YEAR FROM he.datetime) = 2021
),
department_hires AS (
    SELECT
        department_id AS id,
        department,
        COUNT(hire_id) AS hired
    FROM hires_2021
    GROUP BY department_id, department
)
SELECT id AS "ID", department AS "DEPARTMENT", hired AS "HIRED"
FROM department_hires
WHERE hired > (SELECT AVG(hired) FROM department_hires)
ORDER BY hired DESC, id ASC NULLS LAST
"#,
};

/// The queries shown on the dashboard, in page order.
pub const DASHBOARD_QUERIES: [&QueryDefinition; 2] = [&QUARTERLY_HIRES, &ABOVE_AVERAGE_DEPARTMENTS];

/// Looks up the dashboard query with the given SQL text, ignoring
/// surrounding whitespace.
pub fn find_by_sql(sql: &str) -> Option<&'static QueryDefinition> {
    let sql = sql.trim();
    DASHBOARD_QUERIES
        .into_iter()
        .find(|definition| definition.sql.trim() == sql)
}
