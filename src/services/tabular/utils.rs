use std::collections::HashSet;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Xlsx(#[from] calamine::XlsxError),

    #[error("{0}")]
    Xls(#[from] calamine::XlsError),

    #[error("{0}")]
    Shape(String),
}

/// Makes header names unique the way dataframe readers do: blanks become
/// `Unnamed: <idx>`, repeats get `.1`, `.2`, ... appended.
pub fn unique_headers<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let raw: Vec<String> = raw
        .into_iter()
        .enumerate()
        .map(|(idx, name)| {
            let name = name.as_ref();
            if name.is_empty() {
                format!("Unnamed: {}", idx)
            } else {
                name.to_string()
            }
        })
        .collect();

    let mut existing_names: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut headers = Vec::with_capacity(raw.len());
    for name in raw {
        let mut candidate = name.clone();
        let mut counter = 1;
        while !existing_names.insert(candidate.clone()) {
            candidate = format!("{}.{}", name, counter);
            counter += 1;
        }
        headers.push(candidate);
    }
    headers
}

/// Converts an Excel serial date (days since 1899-12-30) to a calendar timestamp.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round();
    if millis > i64::MAX as f64 {
        return None;
    }
    epoch.checked_add_signed(Duration::milliseconds(millis as i64))
}
