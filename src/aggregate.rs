use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;

use crate::normalize::normalize_name;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotal<K> {
    pub key: K,
    /// Signed sum; negative totals are net costs.
    pub value: f64,
    pub count: usize,
}

/// Sum `amount` per `key`, groups in first-seen order. Signs are kept.
pub fn group_sum<T, K, FK, FA>(records: &[T], key: FK, amount: FA) -> Vec<GroupTotal<K>>
where
    K: Eq + Hash + Clone,
    FK: Fn(&T) -> K,
    FA: Fn(&T) -> f64,
{
    let mut slot: HashMap<K, usize> = HashMap::new();
    let mut out: Vec<GroupTotal<K>> = Vec::new();
    for r in records {
        let k = key(r);
        let i = *slot.entry(k.clone()).or_insert_with(|| {
            out.push(GroupTotal { key: k, value: 0.0, count: 0 });
            out.len() - 1
        });
        out[i].value += amount(r);
        out[i].count += 1;
    }
    out
}

pub fn top_k<K: Clone>(groups: &[GroupTotal<K>], k: usize) -> Vec<GroupTotal<K>> {
    sorted_desc(groups).into_iter().take(k).collect()
}

/// Smallest `k` groups by signed value, smallest first.
pub fn bottom_k<K: Clone>(groups: &[GroupTotal<K>], k: usize) -> Vec<GroupTotal<K>> {
    let sorted = sorted_desc(groups);
    let skip = sorted.len().saturating_sub(k);
    sorted.into_iter().skip(skip).rev().collect()
}

pub fn sorted_desc<K: Clone>(groups: &[GroupTotal<K>]) -> Vec<GroupTotal<K>> {
    groups
        .iter()
        .cloned()
        .sorted_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal))
        .collect()
}

pub fn total_abs<K>(groups: &[GroupTotal<K>]) -> f64 {
    groups.iter().map(|g| g.value.abs()).sum()
}

pub fn total_signed<K>(groups: &[GroupTotal<K>]) -> f64 {
    groups.iter().map(|g| g.value).sum()
}

/// `|value| / Σ|all|`, with an empty or zero divisor treated as 1.
pub fn share_of(value: f64, all_abs: f64) -> f64 {
    let divisor = if all_abs == 0.0 { 1.0 } else { all_abs };
    value.abs() / divisor
}

pub fn share_of_total<K>(group: &GroupTotal<K>, all: &[GroupTotal<K>]) -> f64 {
    share_of(group.value, total_abs(all))
}

/// Sum of amounts for records whose normalized serialized text contains any
/// of `keywords`.
pub fn keyword_total<T, FS, FA>(records: &[T], keywords: &[String], serialize: FS, amount: FA) -> f64
where
    FS: Fn(&T) -> String,
    FA: Fn(&T) -> Option<f64>,
{
    let keys: Vec<String> = keywords.iter().map(|k| normalize_name(k)).filter(|k| !k.is_empty()).collect();
    records
        .iter()
        .filter(|r| {
            let text = normalize_name(&serialize(r));
            keys.iter().any(|k| text.contains(k.as_str()))
        })
        .filter_map(|r| amount(r))
        .sum()
}

/// Linear-interpolated quantile of an ascending slice (R-7, as d3.quantile).
pub fn quantile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 || !p.is_finite() {
        return None;
    }
    if n == 1 || p <= 0.0 {
        return Some(sorted[0]);
    }
    if p >= 1.0 {
        return Some(sorted[n - 1]);
    }
    let h = (n - 1) as f64 * p;
    let i = h.floor() as usize;
    let lo = sorted[i];
    let hi = sorted[(i + 1).min(n - 1)];
    Some(lo + (hi - lo) * (h - i as f64))
}

/// Thresholds splitting `values` into `classes` equal-count bins, the way a
/// quantile colour scale does. Non-finite values are ignored.
pub fn quantile_breaks(values: &[f64], classes: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.is_empty() || classes < 2 {
        return Vec::new();
    }
    (1..classes)
        .filter_map(|i| quantile_sorted(&sorted, i as f64 / classes as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_breaks_interpolate() {
        let v = [4.0, 1.0, 3.0, 2.0, f64::NAN];
        assert_eq!(quantile_breaks(&v, 2), vec![2.5]);
        assert_eq!(quantile_breaks(&v, 4), vec![1.75, 2.5, 3.25]);
        assert!(quantile_breaks(&[], 9).is_empty());
        assert_eq!(quantile_breaks(&[7.0], 3), vec![7.0, 7.0]);
    }

    fn recs() -> Vec<(&'static str, f64)> {
        vec![("a", 10.0), ("b", -4.0), ("a", 5.0), ("c", 1.5), ("b", -1.0), ("d", 0.0)]
    }

    #[test]
    fn groups_in_first_seen_order_with_signs_kept() {
        let g = group_sum(&recs(), |r| r.0, |r| r.1);
        assert_eq!(g.iter().map(|x| x.key).collect::<Vec<_>>(), vec!["a", "b", "c", "d"]);
        assert_eq!(g[0].value, 15.0);
        assert_eq!(g[1].value, -5.0);
        assert_eq!(g[1].count, 2);
    }

    #[test]
    fn partition_sums_match_record_sum() {
        let r = recs();
        let direct: f64 = r.iter().map(|x| x.1).sum();
        let by_key = group_sum(&r, |x| x.0, |x| x.1);
        assert!((total_signed(&by_key) - direct).abs() < 1e-9);
        let by_sign = group_sum(&r, |x| x.1 >= 0.0, |x| x.1);
        assert!((total_signed(&by_sign) - direct).abs() < 1e-9);
    }

    #[test]
    fn top_and_bottom_by_signed_value() {
        let g = group_sum(&recs(), |r| r.0, |r| r.1);
        let top: Vec<_> = top_k(&g, 2).into_iter().map(|x| x.key).collect();
        assert_eq!(top, vec!["a", "c"]);
        let bottom: Vec<_> = bottom_k(&g, 2).into_iter().map(|x| x.key).collect();
        assert_eq!(bottom, vec!["b", "d"]);
        assert_eq!(top_k(&g, 10).len(), 4);
        assert_eq!(bottom_k(&g, 10).len(), 4);
    }

    #[test]
    fn shares_use_absolute_values_and_guard_zero() {
        let g = group_sum(&recs(), |r| r.0, |r| r.1);
        // |15| / (15 + 5 + 1.5 + 0)
        assert!((share_of_total(&g[0], &g) - 15.0 / 21.5).abs() < 1e-9);
        assert!((share_of_total(&g[1], &g) - 5.0 / 21.5).abs() < 1e-9);
        assert_eq!(share_of(0.0, 0.0), 0.0);
        assert_eq!(share_of(3.0, 0.0), 3.0);
    }

    #[test]
    fn keyword_total_matches_serialized_text() {
        let rows = vec![("Air quality", "Mortality", Some(10.0)), ("Noise", "Sleep Disturbance", Some(2.0)), ("Congestion", "time", Some(7.0)), ("x", "health", None)];
        let keys = vec!["mortality".to_string(), "health".to_string(), "sleep".to_string()];
        let t = keyword_total(&rows, &keys, |r| format!("{} {}", r.0, r.1), |r| r.2);
        assert_eq!(t, 12.0);
    }
}
