//! Coercion of messy spreadsheet values into clean numbers.
//!
//! Every cell goes through the same fixed sequence: render as text, lowercase
//! and trim, map null-like tokens to zero, turn accounting negatives such as
//! `(1,200.50)` into `-1,200.50`, drop everything that is not a digit, a dot or
//! a minus sign, then parse. Anything that still fails to parse becomes `0.0`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Cell;

const NULL_TOKENS: [&str; 4] = ["nan", "null", "none", ""];

static NON_NUMERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^0-9.\-]").expect("static pattern is valid")
});

/// Cleans a whole column. The output has exactly one finite value per input cell.
pub fn clean_series(cells: &[Cell]) -> Vec<f64> {
    cells.iter().map(clean_value).collect()
}

pub fn clean_value(cell: &Cell) -> f64 {
    match cell {
        // Already numeric, rendering to text and back would only lose precision
        Cell::Number(n) if n.is_finite() => *n,
        other => clean_text(&other.to_string()),
    }
}

pub fn clean_text(raw: &str) -> f64 {
    let lowered = raw.to_lowercase();
    let mut value = lowered.trim().to_string();

    if NULL_TOKENS.contains(&value.as_str()) {
        value = "0".to_string();
    }

    if value.starts_with('(') && value.ends_with(')') {
        value = format!("-{}", value.trim_matches(|c| c == '(' || c == ')'));
    }

    let stripped = NON_NUMERIC.replace_all(&value, "");
    parse_or_zero(&stripped)
}

fn parse_or_zero(token: &str) -> f64 {
    match token.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => 0.0,
    }
}
