use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A raw cell as decoded from the upload, before any normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Text(String),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => write!(f, "nan"),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Cell::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Cell::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

/// Column-major table. All columns share one length and names are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self, AppError> {
        let row_count = columns.first().map_or(0, |c| c.cells.len());
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(AppError::InvalidInput(format!(
                    "Duplicate column name: {}",
                    column.name
                )));
            }
            if column.cells.len() != row_count {
                return Err(AppError::InvalidInput(format!(
                    "Column {} has {} rows, expected {}",
                    column.name,
                    column.cells.len(),
                    row_count
                )));
            }
        }
        Ok(Self { columns, row_count })
    }

    /// Builds a table from row-major data, padding short rows with `Cell::Empty`.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, AppError> {
        let mut columns: Vec<Column> = headers
            .into_iter()
            .map(|name| Column { name, cells: Vec::with_capacity(rows.len()) })
            .collect();

        for (idx, row) in rows.into_iter().enumerate() {
            if row.len() > columns.len() {
                return Err(AppError::InvalidInput(format!(
                    "Row {} has {} fields, expected {}",
                    idx + 1,
                    row.len(),
                    columns.len()
                )));
            }
            let mut cells = row.into_iter();
            for column in columns.iter_mut() {
                column.cells.push(cells.next().unwrap_or(Cell::Empty));
            }
        }

        Self::new(columns)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.cells.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    OrderId,
    Date,
    Revenue,
    Quantity,
    Product,
    Customer,
    Category,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::OrderId,
        Role::Date,
        Role::Revenue,
        Role::Quantity,
        Role::Product,
        Role::Customer,
        Role::Category,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::OrderId => "order_id",
            Role::Date => "date",
            Role::Revenue => "revenue",
            Role::Quantity => "quantity",
            Role::Product => "product",
            Role::Customer => "customer",
            Role::Category => "category",
        }
    }
}

/// Semantic role -> header name. `None` means unmapped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub order_id: Option<String>,
    pub date: Option<String>,
    pub revenue: Option<String>,
    pub quantity: Option<String>,
    pub product: Option<String>,
    pub customer: Option<String>,
    pub category: Option<String>,
}

impl ColumnMapping {
    pub fn get(&self, role: Role) -> Option<&str> {
        let slot = match role {
            Role::OrderId => &self.order_id,
            Role::Date => &self.date,
            Role::Revenue => &self.revenue,
            Role::Quantity => &self.quantity,
            Role::Product => &self.product,
            Role::Customer => &self.customer,
            Role::Category => &self.category,
        };
        slot.as_deref()
    }

    pub fn set(&mut self, role: Role, column: Option<String>) {
        let slot = match role {
            Role::OrderId => &mut self.order_id,
            Role::Date => &mut self.date,
            Role::Revenue => &mut self.revenue,
            Role::Quantity => &mut self.quantity,
            Role::Product => &mut self.product,
            Role::Customer => &mut self.customer,
            Role::Category => &mut self.category,
        };
        *slot = column;
    }

    /// The mapped column for `role`, only if the table actually has it.
    pub fn resolve<'a>(&'a self, role: Role, table: &Table) -> Option<&'a str> {
        self.get(role).filter(|name| table.has_column(name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub total_orders: u64,
    pub total_revenue: f64,
    pub total_items_sold: i64,
}

/// One bar or point on a chart: a date bucket or a category label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_value: Option<f64>,
}

impl ChartPoint {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self { name: name.into(), value, secondary_value: None }
    }
}

pub type TrendPoint = ChartPoint;
pub type CategoryPoint = ChartPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContent {
    pub summary: AggregateSummary,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub sales_trend: Vec<TrendPoint>,
    pub category_breakdown: Vec<CategoryPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Preprocessing,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Preprocessing => "preprocessing",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "preprocessing" => Some(ReportStatus::Preprocessing),
            "completed" => Some(ReportStatus::Completed),
            "failed" => Some(ReportStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReportStatus::Preprocessing)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub id: String,
    pub owner_id: String,
    pub filename: String,
    pub status: ReportStatus,
    pub column_mapping: Option<ColumnMapping>,
    pub analysis: Option<AnalysisContent>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisReport {
    pub fn start(owner_id: &str, filename: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            owner_id: owner_id.to_string(),
            filename: filename.to_string(),
            status: ReportStatus::Preprocessing,
            column_mapping: None,
            analysis: None,
            created_at: Utc::now(),
        }
    }

    pub fn complete(&mut self, analysis: AnalysisContent) -> Result<(), AppError> {
        self.ensure_open()?;
        self.analysis = Some(analysis);
        self.status = ReportStatus::Completed;
        Ok(())
    }

    pub fn fail(&mut self) -> Result<(), AppError> {
        self.ensure_open()?;
        self.status = ReportStatus::Failed;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(AppError::Internal(format!(
                "Report {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }
}
