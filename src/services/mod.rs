pub mod aggregator;
pub mod column_mapping;
pub mod llm_agent;
pub mod narrative;
pub mod numeric;
pub mod pipeline;
pub mod report_store;
pub mod tabular;
