use reqwest::Client;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use url::Url;

use crate::diagnostics::Resolution;
use crate::errors::LoadError;
use crate::geometry::FeatureCollection;
use crate::models::{Cell, Row, Table};

/// Where story inputs are read from: a local directory or an HTTP base URL.
#[derive(Debug, Clone)]
pub enum DataSource {
    Dir(PathBuf),
    Http { client: Client, base: Url },
}

impl DataSource {
    /// `http(s)://` locations become an HTTP source, anything else a directory.
    pub fn parse(location: &str) -> anyhow::Result<Self> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let mut base = Url::parse(location)?;
            if !base.path().ends_with('/') {
                let p = format!("{}/", base.path());
                base.set_path(&p);
            }
            Ok(DataSource::Http { client: Client::builder().build()?, base })
        } else {
            Ok(DataSource::Dir(PathBuf::from(location)))
        }
    }

    pub async fn fetch_text(&self, rel: &str) -> Result<String, LoadError> {
        let start = std::time::Instant::now();
        let text = match self {
            DataSource::Dir(root) => {
                let path = root.join(rel);
                match tokio::fs::read_to_string(&path).await {
                    Ok(t) => t,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        return Err(LoadError::NotFound { path: path.display().to_string() })
                    }
                    Err(source) => return Err(LoadError::Io { path: path.display().to_string(), source }),
                }
            }
            DataSource::Http { client, base } => {
                let url = base
                    .join(rel)
                    .map_err(|e| LoadError::Decode { path: rel.to_string(), reason: e.to_string() })?;
                let resp = client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|source| LoadError::Http { url: url.to_string(), source })?;
                if resp.status() == reqwest::StatusCode::NOT_FOUND {
                    warn!("Input not found (404) - {}", url);
                    return Err(LoadError::NotFound { path: url.to_string() });
                }
                let resp = resp
                    .error_for_status()
                    .map_err(|source| LoadError::Http { url: url.to_string(), source })?;
                resp.text().await.map_err(|source| LoadError::Http { url: url.to_string(), source })?
            }
        };
        info!(
            "Input fetch completed - path={}, duration={:.2}s, bytes={}",
            rel,
            start.elapsed().as_secs_f32(),
            text.len()
        );
        Ok(text)
    }
}

/* -------------------------------------------------------------------------- */
/* Parsers                                                                    */
/* -------------------------------------------------------------------------- */

/// Header-row delimited text into a table. Every cell stays text; short rows
/// read as empty cells.
pub fn parse_csv(path: &str, text: &str) -> Result<Table, LoadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(text.as_bytes());

    let decode = |e: csv::Error| LoadError::Decode { path: path.to_string(), reason: e.to_string() };
    let columns: Vec<String> = rdr.headers().map_err(decode)?.iter().map(|h| h.to_string()).collect();

    let mut rows = Vec::new();
    for rec in rdr.records() {
        let rec = rec.map_err(decode)?;
        let mut row = Row::with_capacity(columns.len());
        for (i, c) in columns.iter().enumerate() {
            let v = rec.get(i).map(|s| Cell::Text(s.to_string())).unwrap_or(Cell::Empty);
            row.insert(c.clone(), v);
        }
        rows.push(row);
    }
    debug!("CSV parsed - path={}, columns={}, rows={}", path, columns.len(), rows.len());
    Ok(Table { columns, rows })
}

/// JSON array of objects into a table. Columns come from the first object in
/// key order; non-object entries are skipped.
pub fn parse_json_table(path: &str, text: &str) -> Result<Table, LoadError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| LoadError::Decode { path: path.to_string(), reason: e.to_string() })?;
    let serde_json::Value::Array(items) = value else {
        return Err(LoadError::Decode { path: path.to_string(), reason: "expected a JSON array".into() });
    };

    let mut columns: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(items.len());
    for item in &items {
        let Some(obj) = item.as_object() else { continue };
        if columns.is_empty() && rows.is_empty() {
            columns = obj.keys().cloned().collect();
        }
        rows.push(obj.iter().map(|(k, v)| (k.clone(), Cell::from_json(v))).collect::<Row>());
    }
    debug!("JSON table parsed - path={}, columns={}, rows={}", path, columns.len(), rows.len());
    Ok(Table { columns, rows })
}

pub fn parse_geojson(path: &str, text: &str) -> Result<FeatureCollection, LoadError> {
    serde_json::from_str(text).map_err(|e| LoadError::Decode { path: path.to_string(), reason: e.to_string() })
}

fn non_empty(path: &str, t: Table) -> Result<Table, LoadError> {
    if t.is_empty() {
        Err(LoadError::Empty { path: path.to_string() })
    } else {
        Ok(t)
    }
}

/* -------------------------------------------------------------------------- */
/* Loaders                                                                    */
/* -------------------------------------------------------------------------- */

pub async fn load_geometry(src: &DataSource, rel: &str) -> Result<FeatureCollection, LoadError> {
    let text = src.fetch_text(rel).await?;
    parse_geojson(rel, &text)
}

pub async fn load_csv_table(src: &DataSource, rel: &str) -> Result<Table, LoadError> {
    let text = src.fetch_text(rel).await?;
    non_empty(rel, parse_csv(rel, &text)?)
}

pub async fn load_json_table(src: &DataSource, rel: &str) -> Result<Table, LoadError> {
    let text = src.fetch_text(rel).await?;
    non_empty(rel, parse_json_table(rel, &text)?)
}

/// Ranking table from JSON, falling back to the entity value CSV when the
/// JSON cannot be fetched or decoded. An empty array is kept as is.
pub async fn load_ranking_table(src: &DataSource, primary: &str, fallback: &str) -> Resolution<Table> {
    let loaded = src.fetch_text(primary).await.and_then(|text| parse_json_table(primary, &text));
    match loaded {
        Ok(t) => Resolution::Found(t),
        Err(primary_err) => {
            warn!("Ranking source failed, trying fallback - primary={}, error={}", primary, primary_err);
            match load_csv_table(src, fallback).await {
                Ok(t) => Resolution::Fallback { value: t, reason: primary_err.to_string() },
                Err(e) => Resolution::Missing { reason: format!("{primary_err}; {e}") },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_keeps_header_order_and_text_cells() {
        let t = parse_csv("x.csv", "Local Authority,Total value (mGBP)\nLeeds,\"1,234.5\"\nYork\n").unwrap();
        assert_eq!(t.columns, vec!["Local Authority", "Total value (mGBP)"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows[0]["Total value (mGBP)"], Cell::Text("1,234.5".into()));
        assert_eq!(t.rows[1]["Total value (mGBP)"], Cell::Empty);
    }

    #[test]
    fn json_table_takes_columns_from_first_object() {
        let t = parse_json_table(
            "p.json",
            r#"[{"pathway":"amenity","co_benefit_type":"noise","value_mgbp":1.5}, 3, {"pathway":"time_saved"}]"#,
        )
        .unwrap();
        assert_eq!(t.columns, vec!["pathway", "co_benefit_type", "value_mgbp"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.rows[0]["value_mgbp"], Cell::Number(1.5));
    }

    #[test]
    fn non_array_json_is_a_decode_error() {
        assert!(matches!(parse_json_table("p.json", "{}"), Err(LoadError::Decode { .. })));
        assert!(matches!(parse_geojson("g.json", "nope"), Err(LoadError::Decode { .. })));
    }

    #[test]
    fn http_locations_get_a_trailing_slash() {
        match DataSource::parse("https://example.org/story").unwrap() {
            DataSource::Http { base, .. } => {
                assert_eq!(base.join("data/a.csv").unwrap().as_str(), "https://example.org/story/data/a.csv")
            }
            DataSource::Dir(_) => panic!("expected http source"),
        }
        assert!(matches!(DataSource::parse("./site").unwrap(), DataSource::Dir(_)));
    }

    #[tokio::test]
    async fn ranking_falls_back_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("values.csv"), "name,value\nLeeds,12\n").unwrap();
        let src = DataSource::Dir(dir.path().to_path_buf());
        let r = load_ranking_table(&src, "missing.json", "values.csv").await;
        assert!(r.is_fallback());
        assert_eq!(r.value().map(|t| t.len()), Some(1));

        let none = load_ranking_table(&src, "missing.json", "also_missing.csv").await;
        assert!(none.is_missing());
    }

    #[tokio::test]
    async fn empty_ranking_json_does_not_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ranking.json"), "[]").unwrap();
        std::fs::write(dir.path().join("values.csv"), "name,value\nLeeds,12\n").unwrap();
        let src = DataSource::Dir(dir.path().to_path_buf());

        let r = load_ranking_table(&src, "ranking.json", "values.csv").await;
        assert!(!r.is_fallback());
        assert_eq!(r.value().map(|t| t.len()), Some(0));

        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        assert!(load_ranking_table(&src, "broken.json", "values.csv").await.is_fallback());
    }
}
