//! Narrative synthesis: the model writes insights around numbers we already
//! computed. Its reply is validated field by field; anything unusable is
//! replaced by a fallback built only from the local aggregates.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::{AggregateSummary, AnalysisContent, ChartPoint};
use crate::services::aggregator::Aggregation;
use crate::services::llm_agent::{extract_json_object, CompletionClient, CompletionRequest};

const NARRATIVE_MAX_TOKENS: u16 = 1000;
pub const MAX_TREND_POINTS: usize = 20;
pub const MAX_CATEGORY_POINTS: usize = 5;

/// What the model is allowed to see: totals and the pre-bucketed series.
#[derive(Debug, Clone, Serialize)]
pub struct NarrativeInput<'a> {
    pub total_revenue: f64,
    pub total_items_sold: i64,
    pub total_orders: u64,
    pub trend: &'a [ChartPoint],
    pub categories: &'a [ChartPoint],
}

impl<'a> From<&'a Aggregation> for NarrativeInput<'a> {
    fn from(aggregation: &'a Aggregation) -> Self {
        Self {
            total_revenue: aggregation.summary.total_revenue,
            total_items_sold: aggregation.summary.total_items_sold,
            total_orders: aggregation.summary.total_orders,
            trend: &aggregation.sales_trend,
            categories: &aggregation.category_breakdown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NarrativeOutcome {
    Valid(AnalysisContent),
    Malformed(String),
}

/// Never fails: transport errors and malformed replies both yield the fallback.
pub async fn synthesize(client: &dyn CompletionClient, aggregation: &Aggregation) -> AnalysisContent {
    let start = std::time::Instant::now();
    let input = NarrativeInput::from(aggregation);

    let request = match build_request(&input) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Could not serialise narrative input, using fallback: {}", e);
            return fallback_content(&aggregation.summary);
        }
    };

    let reply = match client.complete(request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!("Narrative request failed, using fallback: {}", e);
            return fallback_content(&aggregation.summary);
        }
    };

    match validate_narrative(&reply, &aggregation.summary) {
        NarrativeOutcome::Valid(content) => {
            tracing::info!(
                "Narrative generated in {:?}: {} insights, {} recommendations",
                start.elapsed(),
                content.insights.len(),
                content.recommendations.len()
            );
            content
        }
        NarrativeOutcome::Malformed(reason) => {
            tracing::warn!("Malformed narrative reply, using fallback: {}", reason);
            fallback_content(&aggregation.summary)
        }
    }
}

fn build_request(input: &NarrativeInput<'_>) -> Result<CompletionRequest, serde_json::Error> {
    let trend = serde_json::to_string(input.trend)?;
    let categories = serde_json::to_string(input.categories)?;

    let user = format!(
        r#"Analyze e-commerce data.
Metrics: Revenue ${}, Items sold {}, Orders {}.

Trend (last {} points): {}
Top categories: {}"#,
        input.total_revenue,
        input.total_items_sold,
        input.total_orders,
        input.trend.len(),
        trend,
        categories
    );

    let system = format!(
        r#"You are a business analyst writing a short report for a store owner.
Return ONLY a JSON object of this shape:
{{
    "summary": {{ "total_orders": {}, "total_revenue": {}, "total_items_sold": {} }},
    "insights": ["3 distinct strategic insights"],
    "recommendations": ["3 actionable steps"],
    "sales_trend": [{{"name": "YYYY-MM-DD", "value": 123.45}}],
    "category_breakdown": [{{"name": "CategoryName", "value": 1000}}]
}}
Limit sales_trend to {} points and category_breakdown to {} points."#,
        input.total_orders,
        input.total_revenue,
        input.total_items_sold,
        MAX_TREND_POINTS,
        MAX_CATEGORY_POINTS
    );

    Ok(CompletionRequest { system, user, max_tokens: NARRATIVE_MAX_TOKENS })
}

/// The summary always comes from `summary`; the model's echo is ignored.
pub fn validate_narrative(reply: &str, summary: &AggregateSummary) -> NarrativeOutcome {
    match parse_content(reply, summary) {
        Ok(content) => NarrativeOutcome::Valid(content),
        Err(reason) => NarrativeOutcome::Malformed(reason),
    }
}

pub fn fallback_content(summary: &AggregateSummary) -> AnalysisContent {
    AnalysisContent {
        summary: summary.clone(),
        insights: Vec::new(),
        recommendations: Vec::new(),
        sales_trend: Vec::new(),
        category_breakdown: Vec::new(),
    }
}

fn parse_content(reply: &str, summary: &AggregateSummary) -> Result<AnalysisContent, String> {
    let json_str = extract_json_object(reply).ok_or("no JSON object in reply")?;
    let value: Value = serde_json::from_str(json_str).map_err(|e| e.to_string())?;
    let object = value.as_object().ok_or("reply is not a JSON object")?;

    let mut sales_trend = points(object, "sales_trend")?;
    sales_trend.truncate(MAX_TREND_POINTS);
    let mut category_breakdown = points(object, "category_breakdown")?;
    category_breakdown.truncate(MAX_CATEGORY_POINTS);

    Ok(AnalysisContent {
        summary: summary.clone(),
        insights: strings(object, "insights")?,
        recommendations: strings(object, "recommendations")?,
        sales_trend,
        category_breakdown,
    })
}

fn strings(object: &Map<String, Value>, key: &str) -> Result<Vec<String>, String> {
    let items = object
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("'{}' must be an array of strings", key))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("'{}' contains a non-string entry", key))
        })
        .collect()
}

/// Series are optional; when present every entry needs a name and a finite value.
fn points(object: &Map<String, Value>, key: &str) -> Result<Vec<ChartPoint>, String> {
    let items = match object.get(key) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(format!("'{}' must be an array", key)),
    };

    items
        .iter()
        .map(|item| {
            let name = match item.get("name") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => return Err(format!("'{}' entry is missing a name", key)),
            };
            let value = item
                .get("value")
                .and_then(Value::as_f64)
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("'{}' entry '{}' has no numeric value", key, name))?;
            let secondary_value = match item.get("secondary_value") {
                None | Some(Value::Null) => None,
                Some(v) => Some(
                    v.as_f64()
                        .ok_or_else(|| format!("'{}' entry '{}' has a non-numeric secondary value", key, name))?,
                ),
            };
            Ok(ChartPoint { name, value, secondary_value })
        })
        .collect()
}
