use std::io::{Cursor, Read, Seek};

use calamine::{open_workbook_from_rs, Data, Reader, Xls, Xlsx};

use super::utils::{excel_serial_to_datetime, unique_headers, DecodeError};
use crate::models::{Cell, Table};

pub fn read_xlsx(data: &[u8]) -> Result<Table, DecodeError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(data))?;
    read_first_sheet(&mut workbook)
}

pub fn read_xls(data: &[u8]) -> Result<Table, DecodeError> {
    let mut workbook: Xls<_> = open_workbook_from_rs(Cursor::new(data))?;
    read_first_sheet(&mut workbook)
}

/// Only the first worksheet is analysed; its first row holds the headers.
fn read_first_sheet<RS, R>(workbook: &mut R) -> Result<Table, DecodeError>
where
    RS: Read + Seek,
    R: Reader<RS>,
    DecodeError: From<R::Error>,
{
    let sheet_names = workbook.sheet_names().to_vec();
    let sheet_name = sheet_names
        .first()
        .ok_or_else(|| DecodeError::Shape("No sheets found in workbook".to_string()))?;
    tracing::debug!("Reading sheet {} of {:?}", sheet_name, sheet_names);

    let range = workbook.worksheet_range(sheet_name)?;
    let mut rows = range.rows();

    let headers = match rows.next() {
        Some(header_row) => unique_headers(header_row.iter().map(header_text)),
        None => return Table::from_rows(Vec::new(), Vec::new()).map_err(|e| DecodeError::Shape(e.to_string())),
    };

    let data_rows: Vec<Vec<Cell>> = rows
        .map(|row| row.iter().map(cell_from_data).collect::<Vec<_>>())
        .filter(|row| !row.iter().all(Cell::is_empty))
        .collect();

    Table::from_rows(headers, data_rows).map_err(|e| DecodeError::Shape(e.to_string()))
}

fn header_text(cell: &Data) -> String {
    match cell_from_data(cell) {
        Cell::Empty => String::new(),
        other => other.to_string(),
    }
}

pub(crate) fn cell_from_data(cell: &Data) -> Cell {
    match cell {
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) if s.is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(d) => excel_serial_to_datetime(d.as_f64())
            .map(Cell::DateTime)
            .unwrap_or(Cell::Number(d.as_f64())),
        Data::DateTimeIso(s) => Cell::Text(s.clone()),
        // Error cells and durations carry nothing the report can use
        _ => Cell::Empty,
    }
}
