//! Recruiting dataset model and reference evaluation of the dashboard queries.
//!
//! The warehouse runs the SQL in [`crate::queries`]; this module computes the
//! same two derived tables in Rust over in-memory relations. The mock
//! warehouse serves these results, and tests use them to check what a live
//! warehouse returns.

use crate::db::{ColumnInfo, QueryResult, Row, Value};
use crate::error::{DashboardError, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Calendar year both dashboard queries report on.
pub const REPORT_YEAR: i32 = 2021;

/// A row of the `departments` relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Department {
    pub id: i64,
    pub department: String,
}

/// A row of the `jobs` relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: i64,
    pub job: String,
}

/// A row of the `hired_employees` relation: one hiring event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hire {
    pub id: i64,
    pub department_id: Option<i64>,
    pub job_id: Option<i64>,
    pub datetime: NaiveDateTime,
}

impl Hire {
    /// Calendar quarter of the hire, 1 through 4.
    pub fn quarter(&self) -> u32 {
        (self.datetime.month() - 1) / 3 + 1
    }

    fn in_report_year(&self) -> bool {
        self.datetime.year() == REPORT_YEAR
    }
}

/// The three source relations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecruitingDataset {
    pub hired_employees: Vec<Hire>,
    pub departments: Vec<Department>,
    pub jobs: Vec<Job>,
}

impl RecruitingDataset {
    /// Creates an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a department.
    pub fn with_department(mut self, id: i64, name: impl Into<String>) -> Self {
        self.departments.push(Department {
            id,
            department: name.into(),
        });
        self
    }

    /// Adds a job.
    pub fn with_job(mut self, id: i64, name: impl Into<String>) -> Self {
        self.jobs.push(Job {
            id,
            job: name.into(),
        });
        self
    }

    /// Adds a hiring event.
    pub fn with_hire(
        mut self,
        id: i64,
        department_id: Option<i64>,
        job_id: Option<i64>,
        datetime: NaiveDateTime,
    ) -> Self {
        self.hired_employees.push(Hire {
            id,
            department_id,
            job_id,
            datetime,
        });
        self
    }

    /// A small dataset for `--mock-db` runs.
    ///
    /// Covers hires outside the report year, every quarter, a hire whose
    /// department does not exist, and a hire with no job.
    pub fn demo() -> Self {
        let mut dataset = Self::new()
            .with_department(1, "Engineering")
            .with_department(2, "Sales")
            .with_department(3, "Legal")
            .with_department(4, "Support")
            .with_job(1, "Backend Developer")
            .with_job(2, "Account Executive")
            .with_job(3, "Paralegal")
            .with_job(4, "Support Specialist")
            .with_job(5, "Data Engineer");

        type Hired = (Option<i64>, Option<i64>, (i32, u32, u32), (u32, u32, u32));
        let hires: [Hired; 24] = [
            (Some(1), Some(1), (2021, 1, 11), (9, 0, 0)),
            (Some(1), Some(1), (2021, 2, 3), (10, 30, 0)),
            (Some(1), Some(1), (2021, 5, 20), (14, 0, 0)),
            (Some(1), Some(5), (2021, 4, 6), (9, 15, 0)),
            (Some(1), Some(5), (2021, 8, 30), (11, 45, 0)),
            (Some(1), Some(5), (2021, 11, 2), (16, 20, 0)),
            (Some(1), Some(1), (2021, 12, 13), (8, 0, 0)),
            (Some(2), Some(2), (2021, 3, 1), (9, 0, 0)),
            (Some(2), Some(2), (2021, 3, 15), (9, 0, 0)),
            (Some(2), Some(2), (2021, 7, 7), (13, 0, 0)),
            (Some(2), Some(2), (2021, 10, 18), (10, 0, 0)),
            (Some(2), Some(2), (2021, 10, 25), (10, 0, 0)),
            (Some(3), Some(3), (2021, 6, 14), (12, 0, 0)),
            (Some(4), Some(4), (2021, 2, 22), (8, 30, 0)),
            (Some(4), Some(4), (2021, 9, 9), (8, 30, 0)),
            (Some(4), None, (2021, 9, 10), (8, 30, 0)),
            (Some(99), Some(4), (2021, 4, 19), (15, 0, 0)),
            (Some(1), Some(1), (2020, 12, 31), (23, 59, 59)),
            (Some(2), Some(2), (2020, 6, 1), (9, 0, 0)),
            (Some(3), Some(3), (2022, 1, 1), (0, 0, 0)),
            (Some(3), Some(3), (2022, 3, 8), (9, 0, 0)),
            (Some(4), Some(4), (2019, 11, 11), (11, 11, 11)),
            (None, Some(1), (2020, 2, 2), (2, 2, 2)),
            (Some(2), Some(5), (2022, 7, 4), (9, 0, 0)),
        ];

        for (index, (department_id, job_id, (y, m, d), (h, mi, s))) in
            hires.into_iter().enumerate()
        {
            let datetime =
                NaiveDate::from_ymd_opt(y, m, d).and_then(|date| date.and_hms_opt(h, mi, s));
            if let Some(datetime) = datetime {
                dataset = dataset.with_hire(index as i64 + 1, department_id, job_id, datetime);
            }
        }

        dataset
    }

    fn department_names(&self) -> HashMap<i64, &str> {
        self.departments
            .iter()
            .map(|d| (d.id, d.department.as_str()))
            .collect()
    }

    fn job_names(&self) -> HashMap<i64, &str> {
        self.jobs.iter().map(|j| (j.id, j.job.as_str())).collect()
    }

    fn report_year_hires(&self) -> impl Iterator<Item = &Hire> {
        self.hired_employees.iter().filter(|h| h.in_report_year())
    }

    /// Number of report-year hires per (department name, job name) pair,
    /// split by quarter, ordered by department then job with nulls last.
    pub fn quarterly_hiring_matrix(&self) -> Vec<QuarterlyHires> {
        let departments = self.department_names();
        let jobs = self.job_names();

        let mut groups: HashMap<(Option<&str>, Option<&str>), [i64; 4]> = HashMap::new();
        for hire in self.report_year_hires() {
            let department = hire
                .department_id
                .and_then(|id| departments.get(&id).copied());
            let job = hire.job_id.and_then(|id| jobs.get(&id).copied());
            let counts = groups.entry((department, job)).or_insert([0; 4]);
            counts[(hire.quarter() - 1) as usize] += 1;
        }

        let mut matrix: Vec<QuarterlyHires> = groups
            .into_iter()
            .map(|((department, job), [q1, q2, q3, q4])| QuarterlyHires {
                department: department.map(String::from),
                job: job.map(String::from),
                q1,
                q2,
                q3,
                q4,
            })
            .collect();

        matrix.sort_by(|a, b| {
            nulls_last(&a.department, &b.department).then_with(|| nulls_last(&a.job, &b.job))
        });
        matrix
    }

    /// Departments whose report-year hire count is strictly above the mean
    /// over all departments that hired at least once that year, ordered by
    /// hire count descending then department id.
    ///
    /// Returns no rows when nobody was hired in the report year.
    pub fn above_average_departments(&self) -> Vec<DepartmentHires> {
        let departments = self.department_names();

        let mut groups: HashMap<(Option<i64>, Option<&str>), i64> = HashMap::new();
        for hire in self.report_year_hires() {
            let key = match hire
                .department_id
                .and_then(|id| departments.get(&id).map(|name| (id, *name)))
            {
                Some((id, name)) => (Some(id), Some(name)),
                None => (None, None),
            };
            *groups.entry(key).or_insert(0) += 1;
        }

        if groups.is_empty() {
            return Vec::new();
        }

        // hired > total / n, kept in integers
        let group_count = groups.len() as i64;
        let total: i64 = groups.values().sum();

        let mut above: Vec<DepartmentHires> = groups
            .into_iter()
            .filter(|(_, hired)| hired * group_count > total)
            .map(|((id, department), hired)| DepartmentHires {
                id,
                department: department.map(String::from),
                hired,
            })
            .collect();

        above.sort_by(|a, b| b.hired.cmp(&a.hired).then_with(|| nulls_last(&a.id, &b.id)));
        above
    }

    /// Mean report-year hire count over departments with at least one hire.
    pub fn mean_department_hires(&self) -> Option<f64> {
        let departments = self.department_names();
        let mut groups: HashMap<Option<i64>, i64> = HashMap::new();
        for hire in self.report_year_hires() {
            let id = hire
                .department_id
                .filter(|id| departments.contains_key(id));
            *groups.entry(id).or_insert(0) += 1;
        }
        if groups.is_empty() {
            return None;
        }
        let total: i64 = groups.values().sum();
        Some(total as f64 / groups.len() as f64)
    }
}

/// Orders present values ascending and places missing values after them.
fn nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// One row of the quarterly hiring matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarterlyHires {
    pub department: Option<String>,
    pub job: Option<String>,
    pub q1: i64,
    pub q2: i64,
    pub q3: i64,
    pub q4: i64,
}

impl QuarterlyHires {
    /// Hires across all four quarters.
    pub fn total(&self) -> i64 {
        self.q1 + self.q2 + self.q3 + self.q4
    }

    /// Column layout of the matrix as returned by the warehouse.
    pub fn columns() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("DEPARTMENT", "text"),
            ColumnInfo::new("JOB", "text"),
            ColumnInfo::new("Q1", "fixed"),
            ColumnInfo::new("Q2", "fixed"),
            ColumnInfo::new("Q3", "fixed"),
            ColumnInfo::new("Q4", "fixed"),
        ]
    }

    fn to_row(&self) -> Row {
        vec![
            Value::from(self.department.clone()),
            Value::from(self.job.clone()),
            Value::Int(self.q1),
            Value::Int(self.q2),
            Value::Int(self.q3),
            Value::Int(self.q4),
        ]
    }

    /// Builds a tabular result from matrix rows.
    pub fn to_result(rows: &[Self]) -> QueryResult {
        QueryResult::with_data(Self::columns(), rows.iter().map(Self::to_row).collect())
    }

    /// Reads matrix rows back out of a warehouse result.
    ///
    /// Columns are located by name, ignoring case.
    pub fn from_result(result: &QueryResult) -> Result<Vec<Self>> {
        let department = required_column(result, "department")?;
        let job = required_column(result, "job")?;
        let quarters = [
            required_column(result, "q1")?,
            required_column(result, "q2")?,
            required_column(result, "q3")?,
            required_column(result, "q4")?,
        ];

        result
            .rows
            .iter()
            .map(|row| {
                Ok(Self {
                    department: text_cell(row, department)?,
                    job: text_cell(row, job)?,
                    q1: count_cell(row, quarters[0])?,
                    q2: count_cell(row, quarters[1])?,
                    q3: count_cell(row, quarters[2])?,
                    q4: count_cell(row, quarters[3])?,
                })
            })
            .collect()
    }
}

/// One row of the above-average department list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartmentHires {
    pub id: Option<i64>,
    pub department: Option<String>,
    pub hired: i64,
}

impl DepartmentHires {
    /// Column layout of the list as returned by the warehouse.
    pub fn columns() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("ID", "fixed"),
            ColumnInfo::new("DEPARTMENT", "text"),
            ColumnInfo::new("HIRED", "fixed"),
        ]
    }

    fn to_row(&self) -> Row {
        vec![
            Value::from(self.id),
            Value::from(self.department.clone()),
            Value::Int(self.hired),
        ]
    }

    /// Builds a tabular result from department rows.
    pub fn to_result(rows: &[Self]) -> QueryResult {
        QueryResult::with_data(Self::columns(), rows.iter().map(Self::to_row).collect())
    }

    /// Reads department rows back out of a warehouse result.
    pub fn from_result(result: &QueryResult) -> Result<Vec<Self>> {
        let id = required_column(result, "id")?;
        let department = required_column(result, "department")?;
        let hired = required_column(result, "hired")?;

        result
            .rows
            .iter()
            .map(|row| {
                let id = match row.get(id) {
                    Some(Value::Null) | None => None,
                    Some(_) => Some(count_cell(row, id)?),
                };
                Ok(Self {
                    id,
                    department: text_cell(row, department)?,
                    hired: count_cell(row, hired)?,
                })
            })
            .collect()
    }
}

fn required_column(result: &QueryResult, name: &str) -> Result<usize> {
    result
        .column_index(name)
        .ok_or_else(|| DashboardError::query(format!("Result is missing column '{name}'")))
}

fn text_cell(row: &Row, index: usize) -> Result<Option<String>> {
    match row.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(DashboardError::query(format!(
            "Expected text, found {other:?}"
        ))),
    }
}

fn count_cell(row: &Row, index: usize) -> Result<i64> {
    match row.get(index) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Int(i)) => Ok(*i),
        Some(Value::Float(f)) if f.fract() == 0.0 => Ok(*f as i64),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| DashboardError::query(format!("Expected a count, found '{s}'"))),
        Some(other) => Err(DashboardError::query(format!(
            "Expected a count, found {other:?}"
        ))),
    }
}
