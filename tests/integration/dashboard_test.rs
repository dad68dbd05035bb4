//! End-to-end dashboard runs against the mock warehouse.

use chrono::NaiveDateTime;
use hiring_dashboard::dashboard::{load_dashboard, DashboardRenderer, PAGE_TITLE};
use hiring_dashboard::db::MockWarehouse;
use hiring_dashboard::recruiting::{DepartmentHires, QuarterlyHires, RecruitingDataset};
use pretty_assertions::assert_eq;

fn at(datetime: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(datetime, "%Y-%m-%d %H:%M:%S").unwrap()
}

#[tokio::test]
async fn test_demo_dashboard_matches_reference_evaluation() {
    let warehouse = MockWarehouse::demo();
    let dashboard = load_dashboard(&warehouse).await.unwrap();

    let matrix = dashboard.section("quarterly_hires").unwrap();
    assert_eq!(
        QuarterlyHires::from_result(&matrix.result).unwrap(),
        warehouse.dataset().quarterly_hiring_matrix()
    );

    let above = dashboard.section("above_average_departments").unwrap();
    let departments = DepartmentHires::from_result(&above.result).unwrap();
    assert_eq!(
        departments,
        vec![
            DepartmentHires {
                id: Some(1),
                department: Some("Engineering".to_string()),
                hired: 7,
            },
            DepartmentHires {
                id: Some(2),
                department: Some("Sales".to_string()),
                hired: 5,
            },
        ]
    );

    assert_eq!(warehouse.sessions_opened(), 1);
    assert_eq!(warehouse.sessions_closed(), 1);
}

#[tokio::test]
async fn test_demo_page_renders_both_sections() {
    let dashboard = load_dashboard(&MockWarehouse::demo()).await.unwrap();
    let html = DashboardRenderer::new().unwrap().render(&dashboard).unwrap();

    assert_eq!(dashboard.title, PAGE_TITLE);
    assert!(html.contains("Dashboard</title>"));
    assert!(html.contains("<h2>Requirement 1</h2>"));
    assert!(html.contains("<h2>Requirement 2</h2>"));
    assert!(html.contains("Backend Developer"));
    let first = html.find("Requirement 1").unwrap();
    let second = html.find("Requirement 2").unwrap();
    assert!(first < second);
}

#[tokio::test]
async fn test_no_hires_in_2021_gives_empty_tables() {
    let dataset = RecruitingDataset::new()
        .with_department(1, "Engineering")
        .with_job(1, "Backend Developer")
        .with_hire(1, Some(1), Some(1), at("2020-12-31 23:59:59"))
        .with_hire(2, Some(1), Some(1), at("2022-01-01 00:00:00"));

    let dashboard = load_dashboard(&MockWarehouse::new(dataset)).await.unwrap();

    for section in &dashboard.sections {
        assert!(section.result.is_empty(), "{} should be empty", section.query.id.as_str());
        assert!(!section.result.columns.is_empty());
    }

    let html = DashboardRenderer::new().unwrap().render(&dashboard).unwrap();
    assert!(html.contains("0 rows in"));
}

#[tokio::test]
async fn test_single_department_is_never_above_average() {
    let dataset = RecruitingDataset::new()
        .with_department(1, "Engineering")
        .with_job(1, "Backend Developer")
        .with_hire(1, Some(1), Some(1), at("2021-01-05 09:00:00"))
        .with_hire(2, Some(1), Some(1), at("2021-06-05 09:00:00"));

    let dashboard = load_dashboard(&MockWarehouse::new(dataset)).await.unwrap();

    let matrix = dashboard.section("quarterly_hires").unwrap();
    assert_eq!(
        QuarterlyHires::from_result(&matrix.result).unwrap(),
        vec![QuarterlyHires {
            department: Some("Engineering".to_string()),
            job: Some("Backend Developer".to_string()),
            q1: 1,
            q2: 1,
            q3: 0,
            q4: 0,
        }]
    );
    assert!(dashboard
        .section("above_average_departments")
        .unwrap()
        .result
        .is_empty());
}

#[tokio::test]
async fn test_hire_counts_add_up() {
    let warehouse = MockWarehouse::demo();
    let dashboard = load_dashboard(&warehouse).await.unwrap();

    let matrix =
        QuarterlyHires::from_result(&dashboard.section("quarterly_hires").unwrap().result).unwrap();
    let total: i64 = matrix.iter().map(QuarterlyHires::total).sum();
    assert_eq!(total, 17);
}
