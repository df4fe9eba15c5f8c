#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use report_services::error::AppError;
use report_services::services::llm_agent::{CompletionClient, CompletionRequest};
use report_services::services::pipeline::ReportPipeline;
use report_services::services::report_store::ReportStore;
use report_services::services::tabular::ParseLimits;

pub const MAPPING_REPLY: &str = r#"{
    "order_id": null, "date": "date", "revenue": "revenue", "quantity": "qty",
    "product": null, "customer": null, "category": "category"
}"#;

pub const NARRATIVE_REPLY: &str = r#"Here you go:
{
    "summary": {"total_orders": 3, "total_revenue": 130.0, "total_items_sold": 4},
    "insights": ["Category A carries the store", "Returns hit category B", "Sales dipped on Jan 2"],
    "recommendations": ["Promote A", "Investigate B refunds", "Run a mid-week offer"],
    "sales_trend": [{"name": "2024-01-01", "value": 150.0}, {"name": "2024-01-02", "value": -20.0}],
    "category_breakdown": [{"name": "A", "value": 150.0}, {"name": "B", "value": -20.0}]
}"#;

pub const SAMPLE_CSV: &str = "\
date,revenue,qty,category
2024-01-01,$100.00,2,A
2024-01-01,$50,1,A
2024-01-02,(20),1,B
";

/// Plays back canned model replies in order and records every request.
#[derive(Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
        let replies = replies
            .into_iter()
            .map(|reply| reply.map(str::to_string).map_err(str::to_string))
            .collect();
        Arc::new(Self { replies: Mutex::new(replies), requests: Mutex::new(Vec::new()) })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AppError> {
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(AppError::Service(message)),
            None => Err(AppError::Service("no scripted reply left".to_string())),
        }
    }
}

pub async fn pipeline_with(client: Arc<ScriptedClient>) -> (ReportPipeline, ReportStore) {
    let store = ReportStore::open_in_memory().await.unwrap();
    let pipeline = ReportPipeline::new(client, store.clone(), ParseLimits::default(), 1);
    (pipeline, store)
}
