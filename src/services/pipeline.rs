use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::AppError;
use crate::models::{AnalysisContent, AnalysisReport, Table};
use crate::services::aggregator;
use crate::services::column_mapping;
use crate::services::llm_agent::CompletionClient;
use crate::services::narrative;
use crate::services::report_store::ReportStore;
use crate::services::tabular::{self, ParseLimits};

/// Runs one upload through parse, mapping, aggregation and narrative, and
/// records the report's lifecycle in the store.
#[derive(Clone)]
pub struct ReportPipeline {
    client: Arc<dyn CompletionClient>,
    store: ReportStore,
    limits: ParseLimits,
    daily_limit: u32,
}

impl ReportPipeline {
    pub fn new(client: Arc<dyn CompletionClient>, store: ReportStore, limits: ParseLimits, daily_limit: u32) -> Self {
        Self { client, store, limits, daily_limit }
    }

    pub async fn analyze(&self, owner_id: &str, filename: &str, data: &[u8]) -> Result<AnalysisReport, AppError> {
        let start = std::time::Instant::now();
        tracing::info!("Starting analysis of {} for {}", filename, owner_id);

        self.ensure_quota(owner_id).await?;

        // Bad files never get a report record
        let table = tabular::parse(data, filename, &self.limits)?;

        let mut report = AnalysisReport::start(owner_id, filename);
        self.store.insert(&report).await?;

        let outcome = match self.run_stages(&mut report, &table).await {
            Ok(content) => self.store_completed(&report, content).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(completed) => {
                tracing::info!("Report {} completed in {:?}", completed.id, start.elapsed());
                Ok(completed)
            }
            Err(e) => {
                tracing::error!("Report {} failed: {}", report.id, e);
                report.fail()?;
                if let Err(store_err) = self.store.update(&report).await {
                    tracing::error!("Could not mark report {} as failed: {}", report.id, store_err);
                }
                Err(e)
            }
        }
    }

    /// Resolves the mapping (kept on `report` even if a later stage fails),
    /// aggregates and writes the narrative.
    async fn run_stages(&self, report: &mut AnalysisReport, table: &Table) -> Result<AnalysisContent, AppError> {
        let mapping = column_mapping::resolve(self.client.as_ref(), &table.headers()).await?;
        report.column_mapping = Some(mapping.clone());

        let aggregation = aggregator::aggregate(table, &mapping)?;
        tracing::info!(
            "Aggregated {} orders, revenue {}, {} trend points, {} categories",
            aggregation.summary.total_orders,
            aggregation.summary.total_revenue,
            aggregation.sales_trend.len(),
            aggregation.category_breakdown.len()
        );

        Ok(narrative::synthesize(self.client.as_ref(), &aggregation).await)
    }

    // `report` stays in preprocessing until the completed row is written
    async fn store_completed(&self, report: &AnalysisReport, content: AnalysisContent) -> Result<AnalysisReport, AppError> {
        let mut completed = report.clone();
        completed.complete(content)?;
        self.store.update(&completed).await?;
        Ok(completed)
    }

    pub async fn get_report(&self, owner_id: &str, report_id: &str) -> Result<AnalysisReport, AppError> {
        self.store
            .get(report_id, owner_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Report not found".to_string()))
    }

    pub async fn list_reports(&self, owner_id: &str) -> Result<Vec<AnalysisReport>, AppError> {
        self.store.list_for_owner(owner_id).await
    }

    /// Check-then-act against the store: concurrent uploads from one
    /// identity can both pass, so the limit is best-effort under concurrency.
    async fn ensure_quota(&self, owner_id: &str) -> Result<(), AppError> {
        let completed = self
            .store
            .count_completed_since(owner_id, start_of_utc_day(Utc::now()))
            .await?;
        if completed >= self.daily_limit {
            tracing::warn!("{} reached the daily limit ({} completed today)", owner_id, completed);
            return Err(AppError::RateLimited(format!(
                "Daily limit reached ({} report{} per day)",
                self.daily_limit,
                if self.daily_limit == 1 { "" } else { "s" }
            )));
        }
        Ok(())
    }
}

pub fn start_of_utc_day(now: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| now.naive_utc());
    Utc.from_utc_datetime(&midnight)
}
