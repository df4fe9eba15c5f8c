//! Deterministic totals and chart series computed from a parsed table.
//!
//! Nothing here talks to the network: the numbers handed to the narrative
//! model are computed locally so that the report stays correct even when the
//! model output is discarded.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::AppError;
use crate::models::{AggregateSummary, Cell, ChartPoint, ColumnMapping, Role, Table};
use crate::services::numeric::clean_series;

/// Most recent daily buckets kept for the trend series.
pub const TREND_BUCKETS: usize = 30;
pub const TOP_CATEGORIES: usize = 5;

const DATETIME_FORMATS: [&str; 10] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
];

// Month-first before day-first for ambiguous slashed dates
const DATE_FORMATS: [&str; 10] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub summary: AggregateSummary,
    pub sales_trend: Vec<ChartPoint>,
    pub category_breakdown: Vec<ChartPoint>,
}

pub fn aggregate(table: &Table, mapping: &ColumnMapping) -> Result<Aggregation, AppError> {
    let revenue_column = mapping
        .get(Role::Revenue)
        .ok_or_else(|| AppError::Validation("Revenue column missing".to_string()))?;
    let revenue_cells = table.column(revenue_column).ok_or_else(|| {
        AppError::Validation(format!(
            "Revenue column missing: '{}' is not in the uploaded file",
            revenue_column
        ))
    })?;

    let revenue = clean_series(revenue_cells);
    let total_revenue: f64 = revenue.iter().sum();

    let total_items_sold = mapping
        .resolve(Role::Quantity, table)
        .and_then(|name| table.column(name))
        .map(|cells| clean_series(cells).iter().sum::<f64>() as i64)
        .unwrap_or(0);

    let sales_trend = mapping
        .resolve(Role::Date, table)
        .and_then(|name| table.column(name))
        .map(|dates| daily_trend(dates, &revenue))
        .unwrap_or_default();

    let category_breakdown = mapping
        .resolve(Role::Category, table)
        .and_then(|name| table.column(name))
        .map(|categories| top_categories(categories, &revenue))
        .unwrap_or_default();

    Ok(Aggregation {
        summary: AggregateSummary {
            total_orders: table.row_count() as u64,
            total_revenue,
            total_items_sold,
        },
        sales_trend,
        category_breakdown,
    })
}

/// Revenue summed per calendar day, oldest first, limited to the last
/// [`TREND_BUCKETS`] days. Rows with unparseable dates are skipped.
pub fn daily_trend(dates: &[Cell], revenue: &[f64]) -> Vec<ChartPoint> {
    let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (cell, value) in dates.iter().zip(revenue) {
        if let Some(day) = parse_calendar_date(cell) {
            *buckets.entry(day).or_insert(0.0) += value;
        }
    }

    let skip = buckets.len().saturating_sub(TREND_BUCKETS);
    buckets
        .into_iter()
        .skip(skip)
        .map(|(day, value)| ChartPoint::new(day.format("%Y-%m-%d").to_string(), value))
        .collect()
}

/// Revenue summed per category label, largest first, top [`TOP_CATEGORIES`].
/// Equal sums keep label order.
pub fn top_categories(categories: &[Cell], revenue: &[f64]) -> Vec<ChartPoint> {
    let mut buckets: BTreeMap<String, f64> = BTreeMap::new();
    for (cell, value) in categories.iter().zip(revenue) {
        if cell.is_empty() {
            continue;
        }
        *buckets.entry(cell.to_string()).or_insert(0.0) += value;
    }

    let mut ranked: Vec<(String, f64)> = buckets.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
        .into_iter()
        .take(TOP_CATEGORIES)
        .map(|(name, value)| ChartPoint::new(name, value))
        .collect()
}

pub fn parse_calendar_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Text(text) => parse_date_text(text.trim()),
        _ => None,
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        })
}
