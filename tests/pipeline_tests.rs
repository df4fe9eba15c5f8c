mod common;

use chrono::{Duration, Utc};
use common::{pipeline_with, ScriptedClient, MAPPING_REPLY, NARRATIVE_REPLY, SAMPLE_CSV};
use report_services::error::AppError;
use report_services::models::{AnalysisReport, ChartPoint, ReportStatus};
use report_services::services::pipeline::ReportPipeline;
use report_services::services::report_store::ReportStore;
use report_services::services::tabular::ParseLimits;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn completed_report_carries_local_aggregates_and_narrative() {
    let client = ScriptedClient::new(vec![Ok(MAPPING_REPLY), Ok(NARRATIVE_REPLY)]);
    let (pipeline, _store) = pipeline_with(client.clone()).await;

    let report = assert_ok!(pipeline.analyze("alice", "sales.csv", SAMPLE_CSV.as_bytes()).await);

    assert_eq!(report.status, ReportStatus::Completed);
    let mapping = report.column_mapping.as_ref().unwrap();
    assert_eq!(mapping.revenue.as_deref(), Some("revenue"));

    let analysis = report.analysis.as_ref().unwrap();
    assert_eq!(analysis.summary.total_revenue, 130.0);
    assert_eq!(analysis.summary.total_orders, 3);
    assert_eq!(analysis.summary.total_items_sold, 4);
    assert_eq!(analysis.insights.len(), 3);
    assert_eq!(analysis.recommendations.len(), 3);
    assert_eq!(
        analysis.category_breakdown,
        vec![ChartPoint::new("A", 150.0), ChartPoint::new("B", -20.0)]
    );

    // Headers go to the mapper verbatim, aggregates to the narrator
    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].user.contains("date, revenue, qty, category"));
    assert!(requests[1].user.contains("Revenue $130"));
    assert!(requests[1].user.contains("\"2024-01-02\""));

    let stored = pipeline.get_report("alice", &report.id).await.unwrap();
    assert_eq!(stored, report_with_second_precision(report));
}

#[tokio::test]
async fn malformed_narrative_falls_back_to_summary_only() {
    let client = ScriptedClient::new(vec![Ok(MAPPING_REPLY), Ok("I think sales are great!")]);
    let (pipeline, _store) = pipeline_with(client).await;

    let report = pipeline.analyze("alice", "sales.csv", SAMPLE_CSV.as_bytes()).await.unwrap();

    assert_eq!(report.status, ReportStatus::Completed);
    let analysis = report.analysis.unwrap();
    assert_eq!(analysis.summary.total_revenue, 130.0);
    assert_eq!(analysis.summary.total_items_sold, 4);
    assert!(analysis.insights.is_empty());
    assert!(analysis.recommendations.is_empty());
    assert!(analysis.sales_trend.is_empty());
    assert!(analysis.category_breakdown.is_empty());
}

#[tokio::test]
async fn narrative_transport_failure_also_falls_back() {
    let client = ScriptedClient::new(vec![Ok(MAPPING_REPLY), Err("connection reset")]);
    let (pipeline, _store) = pipeline_with(client).await;

    let report = pipeline.analyze("alice", "sales.csv", SAMPLE_CSV.as_bytes()).await.unwrap();
    assert_eq!(report.status, ReportStatus::Completed);
    assert!(report.analysis.unwrap().insights.is_empty());
}

#[tokio::test]
async fn mapping_failure_marks_report_failed() {
    let client = ScriptedClient::new(vec![Ok("sorry, I can't do that")]);
    let (pipeline, store) = pipeline_with(client.clone()).await;

    let err = pipeline.analyze("alice", "sales.csv", SAMPLE_CSV.as_bytes()).await.unwrap_err();
    assert!(matches!(err, AppError::Service(_)));
    assert_eq!(client.request_count(), 1);

    let failed = latest_report(&store, "alice").await;
    assert_eq!(failed.status, ReportStatus::Failed);
    assert!(failed.column_mapping.is_none());
    assert!(failed.analysis.is_none());

    // The failed attempt does not count against the daily limit
    assert_eq!(store.count_completed_since("alice", Utc::now() - Duration::hours(1)).await.unwrap(), 0);
}

#[tokio::test]
async fn unwritable_completion_leaves_a_failed_record() {
    let path = std::env::temp_dir().join(format!("reports-{}.db", uuid::Uuid::new_v4().simple()));
    let store = ReportStore::open(path.to_str().unwrap()).await.unwrap();

    // Only the write that moves a report to completed is refused
    let side = rusqlite::Connection::open(&path).unwrap();
    side.execute_batch(
        "CREATE TRIGGER refuse_completion BEFORE UPDATE ON reports
         WHEN NEW.status = 'completed'
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
    )
    .unwrap();

    let client = ScriptedClient::new(vec![Ok(MAPPING_REPLY), Ok(NARRATIVE_REPLY)]);
    let pipeline = ReportPipeline::new(client, store.clone(), ParseLimits::default(), 1);

    let err = pipeline.analyze("alice", "sales.csv", SAMPLE_CSV.as_bytes()).await.unwrap_err();
    assert!(matches!(err, AppError::Database(msg) if msg.contains("disk full")));

    let failed = latest_report(&store, "alice").await;
    assert_eq!(failed.status, ReportStatus::Failed);
    assert!(failed.column_mapping.is_some());
    assert!(failed.analysis.is_none());

    drop(side);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn missing_revenue_column_is_a_validation_failure_with_mapping_kept() {
    let mapping = MAPPING_REPLY.replace("\"revenue\": \"revenue\"", "\"revenue\": null");
    let client = ScriptedClient::new(vec![Ok(mapping.as_str())]);
    let (pipeline, store) = pipeline_with(client.clone()).await;

    let err = pipeline.analyze("alice", "sales.csv", SAMPLE_CSV.as_bytes()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    // Narrative is never requested once aggregation fails
    assert_eq!(client.request_count(), 1);

    let failed = latest_report(&store, "alice").await;
    assert_eq!(failed.status, ReportStatus::Failed);
    assert!(failed.column_mapping.is_some());
    assert!(failed.analysis.is_none());
}

#[tokio::test]
async fn bad_files_are_rejected_before_any_ai_call() {
    let client = ScriptedClient::new(vec![]);
    let (pipeline, _store) = pipeline_with(client.clone()).await;

    let wrong_type = pipeline.analyze("alice", "sales.pdf", b"%PDF").await;
    assert!(matches!(wrong_type, Err(AppError::InvalidInput(_))));

    let empty = pipeline.analyze("alice", "sales.csv", b"date,revenue\n").await;
    assert!(matches!(empty, Err(AppError::InvalidInput(msg)) if msg == "File is empty"));

    let mut big = String::from("revenue\n");
    for i in 0..10_001 {
        big.push_str(&format!("{}\n", i));
    }
    let too_many = pipeline.analyze("alice", "big.csv", big.as_bytes()).await;
    assert!(matches!(too_many, Err(AppError::InvalidInput(msg)) if msg.contains("Too many rows")));

    assert_eq!(client.request_count(), 0);
}

#[tokio::test]
async fn second_completed_report_in_a_day_is_rate_limited() {
    let client = ScriptedClient::new(vec![Ok(MAPPING_REPLY), Ok(NARRATIVE_REPLY)]);
    let (pipeline, _store) = pipeline_with(client.clone()).await;

    assert_ok!(pipeline.analyze("alice", "sales.csv", SAMPLE_CSV.as_bytes()).await);

    // Rejected before parsing: even garbage input reports the limit
    let err = assert_err!(pipeline.analyze("alice", "junk.bin", b"junk").await);
    assert!(matches!(err, AppError::RateLimited(_)));
    assert_eq!(client.request_count(), 2);
}

#[tokio::test]
async fn limit_is_per_identity() {
    let client = ScriptedClient::new(vec![
        Ok(MAPPING_REPLY),
        Ok(NARRATIVE_REPLY),
        Ok(MAPPING_REPLY),
        Ok(NARRATIVE_REPLY),
    ]);
    let (pipeline, _store) = pipeline_with(client).await;

    assert_ok!(pipeline.analyze("alice", "sales.csv", SAMPLE_CSV.as_bytes()).await);
    assert_ok!(pipeline.analyze("bob", "sales.csv", SAMPLE_CSV.as_bytes()).await);
}

#[tokio::test]
async fn reports_are_only_visible_to_their_owner() {
    let client = ScriptedClient::new(vec![Ok(MAPPING_REPLY), Ok(NARRATIVE_REPLY)]);
    let (pipeline, _store) = pipeline_with(client).await;

    let report = pipeline.analyze("alice", "sales.csv", SAMPLE_CSV.as_bytes()).await.unwrap();

    assert!(pipeline.get_report("alice", &report.id).await.is_ok());
    let err = pipeline.get_report("bob", &report.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

async fn latest_report(store: &ReportStore, owner: &str) -> AnalysisReport {
    store
        .list_for_owner(owner)
        .await
        .unwrap()
        .into_iter()
        .next()
        .expect("a report was recorded")
}

fn report_with_second_precision(mut report: AnalysisReport) -> AnalysisReport {
    use chrono::TimeZone;
    report.created_at = Utc.timestamp_opt(report.created_at.timestamp(), 0).unwrap();
    report
}
