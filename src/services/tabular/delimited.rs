use super::utils::{unique_headers, DecodeError};
use crate::models::{Cell, Table};

pub fn read_csv(data: &[u8]) -> Result<Table, DecodeError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let headers = unique_headers(reader.headers()?.iter());

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() > headers.len() {
            // Line numbers are 1-based and the header takes the first line
            return Err(DecodeError::Shape(format!(
                "Expected {} fields in line {}, saw {}",
                headers.len(),
                idx + 2,
                record.len()
            )));
        }
        rows.push(record.iter().map(cell_from_field).collect());
    }

    Table::from_rows(headers, rows).map_err(|e| DecodeError::Shape(e.to_string()))
}

fn cell_from_field(field: &str) -> Cell {
    if field.is_empty() {
        Cell::Empty
    } else {
        Cell::Text(field.to_string())
    }
}
