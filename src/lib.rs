pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use services::llm_agent::{CompletionClient, LlmAgent};
use services::pipeline::ReportPipeline;
use services::report_store::ReportStore;
use services::tabular::ParseLimits;

// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub pipeline: ReportPipeline,
}

impl AppState {
    pub fn new(config: config::Config, client: Arc<dyn CompletionClient>, store: ReportStore) -> Self {
        let limits = ParseLimits {
            max_bytes: config.max_file_size,
            max_rows: config.max_rows,
        };
        let pipeline = ReportPipeline::new(client, store, limits, config.daily_report_limit);
        Self { config, pipeline }
    }

    /// Wires the OpenAI client and the on-disk store from configuration.
    pub async fn from_config(config: config::Config) -> Result<Self, error::AppError> {
        let client = LlmAgent::new(
            &config.openai_key,
            &config.openai_model,
            config.openai_api_base.as_deref(),
            config.ai_timeout,
        );
        let store = ReportStore::open(&config.database_path).await?;
        Ok(Self::new(config, Arc::new(client), store))
    }
}
