// src/render.rs

// Fixed-point text; an exact decimal tie rounds away from zero (12.25 -> 12.3).
fn to_fixed(x: f64, digits: usize) -> String {
    const EXTRA: usize = 25;
    let sign = if x < 0.0 { "-" } else { "" };
    let mut a = x.abs();
    let exact = format!("{:.*}", digits + EXTRA, a);
    let tail = &exact[exact.len() - EXTRA..];
    if tail.starts_with('5') && tail[1..].bytes().all(|b| b == b'0') {
        a += 0.5 * 10f64.powi(-(digits as i32));
    }
    format!("{}{:.*}", sign, digits, a)
}

/// Amounts are millions of pounds: `£12.3m`, `£1.23bn`, or `No data`.
pub fn format_money(m_gbp: f64) -> String {
    if !m_gbp.is_finite() {
        return "No data".to_string();
    }
    if m_gbp.abs() >= 1000.0 {
        format!("£{}bn", to_fixed(m_gbp / 1000.0, 2))
    } else {
        format!("£{}m", to_fixed(m_gbp, 1))
    }
}

pub fn format_signed_money(m_gbp: f64) -> String {
    if !m_gbp.is_finite() {
        return format_money(m_gbp);
    }
    let sign = if m_gbp < 0.0 { "−" } else { "" };
    format!("{}{}", sign, format_money(m_gbp.abs()))
}

pub fn percent(share: f64) -> i64 {
    if share.is_finite() {
        (share * 100.0).round() as i64
    } else {
        0
    }
}

pub fn format_percent(share: f64) -> String {
    format!("{}%", percent(share))
}

pub fn composition_note(shown: usize, share: f64) -> String {
    format!("Top {} pathways shown. Together: {} of national total.", shown, format_percent(share))
}

pub fn ranking_note(top_n: usize, bottom_n: usize) -> String {
    format!(
        "Top {} and bottom {} Local Authorities shown. The gap between them highlights unequal benefits.",
        top_n, bottom_n
    )
}

pub fn kpi_label(pathway_label: &str, share: f64, fallback: bool) -> String {
    if fallback {
        format!(
            "Pathway used: {} (fallback). Share of national impact: {}",
            pathway_label,
            format_percent(share)
        )
    } else {
        format!("Pathway: {}. Share of national impact: {}", pathway_label, format_percent(share))
    }
}
