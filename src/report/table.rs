//! Presentation cells and report tables.
//!
//! Analyses hand over unrounded numbers; this is where they become text.

use std::fmt;

/// A single presentation value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Int(i64),
    /// Money or percentage, two decimals.
    Decimal(f64),
    /// Z-score or correlation, four decimals.
    Score(f64),
    Bool(bool),
    /// Undefined value.
    Empty,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn count(value: u64) -> Self {
        Cell::Int(value as i64)
    }

    pub fn decimal(value: Option<f64>) -> Self {
        value.map_or(Cell::Empty, Cell::Decimal)
    }

    pub fn score(value: Option<f64>) -> Self {
        value.map_or(Cell::Empty, Cell::Score)
    }

    pub fn optional_text(value: Option<impl Into<String>>) -> Self {
        value.map_or(Cell::Empty, |v| Cell::Text(v.into()))
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Int(v) => write!(f, "{}", v),
            Cell::Decimal(v) if v.is_finite() => write!(f, "{:.2}", v),
            Cell::Score(v) if v.is_finite() => write!(f, "{:.4}", v),
            Cell::Decimal(_) | Cell::Score(_) | Cell::Empty => Ok(()),
            Cell::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A named table ready to be written to a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl ReportTable {
    pub fn new<S: Into<String>>(name: impl Into<String>, headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<Cell>) {
        debug_assert_eq!(row.len(), self.headers.len(), "row width in {}", self.name);
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rendered rows, one string per cell.
    pub fn rendered_rows(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.rows.iter().map(|row| row.iter().map(Cell::render).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_rounding() {
        assert_eq!(Cell::Decimal(100.0 / 3.0).render(), "33.33");
        assert_eq!(Cell::Score(1.788_854_4).render(), "1.7889");
        assert_eq!(Cell::decimal(None).render(), "");
        assert_eq!(Cell::Decimal(f64::NAN).render(), "");
        assert_eq!(Cell::count(7).render(), "7");
        assert_eq!(Cell::Bool(true).render(), "true");
    }

    #[test]
    fn test_table_rows() {
        let mut table = ReportTable::new("demo", ["a", "b"]);
        assert!(table.is_empty());

        table.push(vec![Cell::text("x"), Cell::Decimal(2.0)]);
        let rows: Vec<Vec<String>> = table.rendered_rows().collect();
        assert_eq!(rows, vec![vec!["x".to_string(), "2.00".to_string()]]);
        assert_eq!(table.len(), 1);
    }
}
