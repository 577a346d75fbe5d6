use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

/* -------------------------------------------------------------------------- */
/* GeoJSON                                                                    */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoFeature {
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
    #[serde(default)]
    pub geometry: Option<Value>,
}

impl GeoFeature {
    pub fn property_keys(&self) -> Vec<String> {
        self.properties
            .as_ref()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Property rendered as text; absent or null reads as empty.
    pub fn property_text(&self, key: Option<&str>) -> String {
        let v = key.and_then(|k| self.properties.as_ref()?.get(k));
        match v {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<GeoFeature>,
}

/* -------------------------------------------------------------------------- */
/* Bounds                                                                     */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    fn point(x: f64, y: f64) -> Self {
        Self { min_x: x, min_y: y, max_x: x, max_y: y }
    }

    fn union(self, o: BBox) -> BBox {
        BBox {
            min_x: self.min_x.min(o.min_x),
            min_y: self.min_y.min(o.min_y),
            max_x: self.max_x.max(o.max_x),
            max_y: self.max_y.max(o.max_y),
        }
    }

    pub fn width(&self) -> f64 {
        (self.max_x - self.min_x).abs()
    }

    pub fn height(&self) -> f64 {
        (self.max_y - self.min_y).abs()
    }

    pub fn max_abs(&self) -> f64 {
        self.min_x.abs().max(self.min_y.abs()).max(self.max_x.abs()).max(self.max_y.abs())
    }
}

/// Planar bounds of every `[x, y, ..]` position under `coordinates`
/// (or `geometries` for a GeometryCollection). Non-finite positions are skipped.
pub fn geometry_bounds(geometry: &Value) -> Option<BBox> {
    fn walk(v: &Value, acc: &mut Option<BBox>) {
        let Value::Array(items) = v else { return };
        let is_position = items.len() >= 2 && items.iter().take(2).all(Value::is_number);
        if is_position {
            let x = items[0].as_f64().unwrap_or(f64::NAN);
            let y = items[1].as_f64().unwrap_or(f64::NAN);
            if x.is_finite() && y.is_finite() {
                let p = BBox::point(x, y);
                *acc = Some(acc.map_or(p, |b| b.union(p)));
            }
            return;
        }
        for item in items {
            walk(item, acc);
        }
    }

    let mut acc = None;
    if let Some(coords) = geometry.get("coordinates") {
        walk(coords, &mut acc);
    }
    if let Some(Value::Array(parts)) = geometry.get("geometries") {
        for g in parts {
            if let Some(b) = geometry_bounds(g) {
                acc = Some(acc.map_or(b, |a: BBox| a.union(b)));
            }
        }
    }
    acc
}

pub fn feature_bounds(f: &GeoFeature) -> Option<BBox> {
    f.geometry.as_ref().and_then(geometry_bounds)
}

pub fn collection_bounds(features: &[GeoFeature]) -> Option<BBox> {
    features.iter().filter_map(feature_bounds).reduce(BBox::union)
}

/// Which projection family the browser should fit the map with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionHint {
    /// Coordinates are already a planar grid (e.g. British National Grid metres).
    Identity,
    /// Longitude/latitude degrees.
    Mercator,
}

pub fn projection_hint(bounds: Option<BBox>) -> ProjectionHint {
    match bounds {
        Some(b) if b.max_abs() > 180.0 => ProjectionHint::Identity,
        _ => ProjectionHint::Mercator,
    }
}

/* -------------------------------------------------------------------------- */
/* Outlier filter                                                             */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierStrategy {
    /// Drop features whose box spans most of the whole collection's box.
    GlobalRatio,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierPolicy {
    pub strategy: OutlierStrategy,
    /// Width AND height must both exceed this share of the collection's.
    pub coverage_ratio: f64,
    /// Collections smaller than this are never filtered.
    pub min_features: usize,
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        Self { strategy: OutlierStrategy::GlobalRatio, coverage_ratio: 0.8, min_features: 3 }
    }
}

/// Indices (into `features`) of the features that survive outlier removal,
/// in input order.
///
/// Passes repeat until nothing more is removed, so filtering the output again
/// removes nothing. A pass that would leave no features is discarded.
pub fn retain_indices(features: &[GeoFeature], policy: &OutlierPolicy) -> Vec<usize> {
    let boxes: Vec<Option<BBox>> = features.par_iter().map(feature_bounds).collect();
    let mut kept: Vec<usize> = (0..features.len()).collect();

    loop {
        if kept.len() < policy.min_features {
            debug!("Outlier filter skipped - features={}, min_features={}", kept.len(), policy.min_features);
            break;
        }
        let next = match policy.strategy {
            OutlierStrategy::GlobalRatio => global_ratio_pass(&kept, &boxes, policy.coverage_ratio),
        };
        if next.len() == kept.len() || next.is_empty() {
            break;
        }
        kept = next;
    }
    kept
}

fn global_ratio_pass(kept: &[usize], boxes: &[Option<BBox>], ratio: f64) -> Vec<usize> {
    let overall = kept.iter().filter_map(|&i| boxes[i]).reduce(BBox::union);
    let Some(overall) = overall else {
        return kept.to_vec();
    };
    let (ow, oh) = (overall.width(), overall.height());

    kept.iter()
        .copied()
        .filter(|&i| match boxes[i] {
            Some(b) => !(b.width() > ow * ratio && b.height() > oh * ratio),
            None => true,
        })
        .collect()
}

pub fn filter_outliers(fc: &FeatureCollection, policy: &OutlierPolicy) -> FeatureCollection {
    let kept = retain_indices(&fc.features, policy);
    let removed = fc.features.len() - kept.len();
    info!(
        "Outlier filter completed - strategy={:?}, kept={}, removed={}",
        policy.strategy,
        kept.len(),
        removed
    );
    FeatureCollection { features: kept.into_iter().map(|i| fc.features[i].clone()).collect() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn square(name: &str, x: f64, y: f64, size: f64) -> GeoFeature {
        serde_json::from_value(json!({
            "type": "Feature",
            "properties": { "name": name },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[x, y], [x + size, y], [x + size, y + size], [x, y + size], [x, y]]]
            }
        }))
        .unwrap()
    }

    fn grid() -> FeatureCollection {
        let mut features = Vec::new();
        for i in 0..4 {
            for j in 0..4 {
                features.push(square(&format!("c{i}{j}"), i as f64 * 10.0, j as f64 * 10.0, 10.0));
            }
        }
        FeatureCollection { features }
    }

    fn names(fc: &FeatureCollection) -> Vec<String> {
        fc.features.iter().map(|f| f.property_text(Some("name"))).collect()
    }

    #[test]
    fn bounds_cover_multipolygons_and_collections() {
        let g = json!({
            "type": "GeometryCollection",
            "geometries": [
                { "type": "Point", "coordinates": [1.0, 2.0] },
                { "type": "MultiPolygon", "coordinates": [[[[-3.0, 5.0], [4.0, 9.0], [0.0, 0.0]]]] }
            ]
        });
        let b = geometry_bounds(&g).unwrap();
        assert_eq!((b.min_x, b.min_y, b.max_x, b.max_y), (-3.0, 0.0, 4.0, 9.0));
        assert_eq!(geometry_bounds(&json!({ "type": "Polygon", "coordinates": [] })), None);
    }

    #[test]
    fn removes_feature_spanning_whole_collection() {
        let mut fc = grid();
        fc.features.push(square("union", -1.0, -1.0, 42.0));
        let out = filter_outliers(&fc, &OutlierPolicy::default());
        assert_eq!(out.features.len(), 16);
        assert!(!names(&out).contains(&"union".to_string()));
    }

    #[test]
    fn output_is_ordered_subset_and_idempotent() {
        let mut fc = grid();
        fc.features.insert(5, square("union", 0.0, 0.0, 40.0));
        fc.features.push(GeoFeature { properties: None, geometry: None });
        let policy = OutlierPolicy::default();
        let once = filter_outliers(&fc, &policy);
        let twice = filter_outliers(&once, &policy);
        assert_eq!(names(&once), names(&twice));

        let all = names(&fc);
        let mut cursor = 0;
        for n in names(&once) {
            let pos = all[cursor..].iter().position(|x| *x == n).expect("subset in order");
            cursor += pos + 1;
        }
    }

    #[test]
    fn small_collections_are_left_alone() {
        let fc = FeatureCollection { features: vec![square("a", 0.0, 0.0, 1.0), square("b", 0.0, 0.0, 1.0)] };
        assert_eq!(filter_outliers(&fc, &OutlierPolicy::default()).features.len(), 2);
    }

    #[test]
    fn never_removes_everything() {
        let fc = FeatureCollection {
            features: (0..4).map(|i| square(&format!("s{i}"), 0.0, 0.0, 5.0)).collect(),
        };
        assert_eq!(filter_outliers(&fc, &OutlierPolicy::default()).features.len(), 4);
    }

    #[test]
    fn projection_hint_from_coordinate_magnitude() {
        let grid_metres = BBox { min_x: 100_000.0, min_y: 10_000.0, max_x: 600_000.0, max_y: 1_200_000.0 };
        assert_eq!(projection_hint(Some(grid_metres)), ProjectionHint::Identity);
        let degrees = BBox { min_x: -8.6, min_y: 49.8, max_x: 1.8, max_y: 60.9 };
        assert_eq!(projection_hint(Some(degrees)), ProjectionHint::Mercator);
        assert_eq!(projection_hint(None), ProjectionHint::Mercator);
    }
}
