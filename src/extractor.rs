//! Table extractor — turns a header-stripped table into one derived number.
//!
//! The formula reads three columns (B, D, E by sheet position):
//!
//! ```text
//! result = (last(B) * 100) / (median(D) * (1 + last(E)))
//! ```
//!
//! Each column drops its own missing cells before the formula is applied,
//! so `last(B)` and `last(E)` need not come from the same row. Pure, no I/O.

use std::cmp::Ordering;

/// Column positions used by the formula (0-indexed).
pub const COLUMN_B: usize = 1;
pub const COLUMN_D: usize = 3;
pub const COLUMN_E: usize = 4;

/// Minimum table width the formula can address.
pub const MIN_COLUMNS: usize = COLUMN_E + 1;

/// A single spreadsheet cell as handed over by the reader.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Blank or a missing-value marker.
    Empty,
    Number(f64),
    /// Any non-numeric content (text, booleans, dates, error values).
    Text(String),
}

impl Cell {
    fn is_missing(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Number(n) => n.is_nan(),
            Cell::Text(_) => false,
        }
    }
}

/// Data rows of a worksheet, header already removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Widest row in the table.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Non-missing cells of one column, in original row order.
    fn column(&self, index: usize) -> Vec<&Cell> {
        self.rows
            .iter()
            .filter_map(|row| row.get(index))
            .filter(|cell| !cell.is_missing())
            .collect()
    }
}

/// Why no number could be derived from a table.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractionFailure {
    #[error("no data rows")]
    Empty,

    #[error("missing data in columns B, D or E")]
    MissingData,

    #[error("denominator is zero")]
    ZeroDenominator,

    #[error("parse error: {0}")]
    ParseError(String),
}

/// Either the derived number or the reason there is none.
pub type ExtractionResult = Result<f64, ExtractionFailure>;

/// Compute the derived number for `table`.
///
/// Never panics and never returns a partial value.
pub fn extract(table: &Table) -> ExtractionResult {
    if table.is_empty() {
        return Err(ExtractionFailure::Empty);
    }
    let width = table.width();
    if width < MIN_COLUMNS {
        return Err(ExtractionFailure::ParseError(format!(
            "expected at least {MIN_COLUMNS} columns, found {width}"
        )));
    }

    let col_d = table.column(COLUMN_D);
    let col_e = table.column(COLUMN_E);
    let col_b = table.column(COLUMN_B);

    let (Some(last_e), Some(last_b)) = (col_e.last(), col_b.last()) else {
        return Err(ExtractionFailure::MissingData);
    };
    if col_d.is_empty() {
        return Err(ExtractionFailure::MissingData);
    }

    let d_values = col_d
        .iter()
        .map(|cell| numeric(cell, "D"))
        .collect::<Result<Vec<f64>, _>>()?;
    let median_d = median(&d_values).ok_or(ExtractionFailure::MissingData)?;
    let bottom_e = numeric(last_e, "E")?;
    let bottom_b = numeric(last_b, "B")?;

    let denominator = median_d * (1.0 + bottom_e);
    if denominator == 0.0 {
        return Err(ExtractionFailure::ZeroDenominator);
    }

    let value = (bottom_b * 100.0) / denominator;
    if !value.is_finite() {
        return Err(ExtractionFailure::ParseError(format!(
            "result is not finite ({value})"
        )));
    }
    Ok(value)
}

/// Median of `values`; the mean of the two middle values for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn numeric(cell: &Cell, column: &str) -> Result<f64, ExtractionFailure> {
    match cell {
        Cell::Number(n) => Ok(*n),
        Cell::Text(s) => Err(ExtractionFailure::ParseError(format!(
            "non-numeric value {s:?} in column {column}"
        ))),
        Cell::Empty => Err(ExtractionFailure::MissingData),
    }
}
