//! Upload decoding: raw bytes plus a filename become a [`Table`].

pub mod delimited;
pub mod utils;
pub mod workbook;

use std::path::Path;

use crate::error::AppError;
use crate::models::Table;

pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;
pub const MAX_ROWS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    pub max_bytes: usize,
    pub max_rows: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self { max_bytes: MAX_FILE_SIZE, max_rows: MAX_ROWS }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xls,
}

impl FileFormat {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let extension = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(FileFormat::Csv),
            "xlsx" => Some(FileFormat::Xlsx),
            "xls" => Some(FileFormat::Xls),
            _ => None,
        }
    }
}

/// Rejects uploads that can be refused without decoding anything.
pub fn check_upload(data: &[u8], filename: &str, limits: &ParseLimits) -> Result<FileFormat, AppError> {
    if data.len() > limits.max_bytes {
        return Err(AppError::InvalidInput(format!(
            "File too large (max {}MB)",
            limits.max_bytes / (1024 * 1024)
        )));
    }

    FileFormat::from_filename(filename).ok_or_else(|| {
        AppError::InvalidInput("Unsupported file format. Please upload CSV or Excel.".to_string())
    })
}

pub fn parse(data: &[u8], filename: &str, limits: &ParseLimits) -> Result<Table, AppError> {
    let start = std::time::Instant::now();
    let format = check_upload(data, filename, limits)?;
    tracing::info!("Parsing {} ({:?}, {}KB)", filename, format, data.len() / 1024);

    let table = match format {
        FileFormat::Csv => delimited::read_csv(data),
        FileFormat::Xlsx => workbook::read_xlsx(data),
        FileFormat::Xls => workbook::read_xls(data),
    }
    .map_err(|e| {
        tracing::warn!("Failed to parse {}: {}", filename, e);
        AppError::InvalidInput(format!("Failed to parse file: {}", e))
    })?;

    if table.row_count() == 0 {
        return Err(AppError::InvalidInput("File is empty".to_string()));
    }
    if table.row_count() > limits.max_rows {
        return Err(AppError::InvalidInput(format!(
            "Too many rows (max {})",
            limits.max_rows
        )));
    }

    tracing::info!(
        "Parsed {} rows x {} columns in {:?}",
        table.row_count(),
        table.headers().len(),
        start.elapsed()
    );
    Ok(table)
}
