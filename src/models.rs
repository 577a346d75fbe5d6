use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One raw cell of a tabular source, as the source provided it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    pub fn from_json(v: &serde_json::Value) -> Cell {
        match v {
            serde_json::Value::Null => Cell::Empty,
            serde_json::Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
            serde_json::Value::String(s) => Cell::Text(s.clone()),
            serde_json::Value::Bool(b) => Cell::Text(b.to_string()),
            other => Cell::Text(other.to_string()),
        }
    }

    /// Empty cells read as "", numbers in their shortest form.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Empty => String::new(),
        }
    }
}

pub type Row = HashMap<String, Cell>;

/// Header-ordered table. `columns` is the CSV header or the key order of the
/// first JSON object; positional column fallbacks index into it.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

pub fn cell<'a>(row: &'a Row, column: Option<&str>) -> &'a Cell {
    static EMPTY: Cell = Cell::Empty;
    column.and_then(|c| row.get(c)).unwrap_or(&EMPTY)
}

/// Monetary amount from a raw cell, in millions of pounds.
///
/// Thousands separators are dropped. Anything that does not come out as a
/// finite number is `None`, and the record is left out of the metric.
pub fn parse_amount(cell: &Cell) -> Option<f64> {
    let v = match cell {
        Cell::Number(n) => *n,
        Cell::Text(s) => {
            let cleaned = s.trim().replace(',', "");
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok()?
        }
        Cell::Empty => return None,
    };
    v.is_finite().then_some(v)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathwayRecord {
    pub co_benefit: String,
    pub pathway: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub source_bucket: String,
    pub impact_bucket: String,
    pub amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_thousands_separated_text() {
        assert_eq!(parse_amount(&Cell::Text("1,234.5".into())), Some(1234.5));
        assert_eq!(parse_amount(&Cell::Text(" -12 ".into())), Some(-12.0));
        assert_eq!(parse_amount(&Cell::Number(3.25)), Some(3.25));
    }

    #[test]
    fn unparseable_cells_are_excluded() {
        assert_eq!(parse_amount(&Cell::Text("n/a".into())), None);
        assert_eq!(parse_amount(&Cell::Text("".into())), None);
        assert_eq!(parse_amount(&Cell::Text("inf".into())), None);
        assert_eq!(parse_amount(&Cell::Number(f64::NAN)), None);
        assert_eq!(parse_amount(&Cell::Empty), None);
    }

    #[test]
    fn json_scalars_map_to_cells() {
        assert_eq!(Cell::from_json(&serde_json::json!(12.5)), Cell::Number(12.5));
        assert_eq!(Cell::from_json(&serde_json::json!("Leeds")), Cell::Text("Leeds".into()));
        assert_eq!(Cell::from_json(&serde_json::Value::Null), Cell::Empty);
    }

    #[test]
    fn missing_column_reads_as_empty() {
        let row: Row = HashMap::from([("a".to_string(), Cell::Text("x".into()))]);
        assert_eq!(cell(&row, Some("b")), &Cell::Empty);
        assert_eq!(cell(&row, None), &Cell::Empty);
        assert_eq!(cell(&row, Some("a")).as_text(), "x");
    }
}
