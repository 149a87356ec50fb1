#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::HashMap;

use bt_frame::RespondentTable;
use bt_types::{parse_number, round_to, try_numeric};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Frequency distribution over one banner column's base.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoricalStats {
    pub base: usize,
    /// Ordered by count descending, then by label.
    pub frequencies: IndexMap<String, usize>,
    /// Share of `base`, 0–100, one decimal.
    pub percentages: IndexMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NumericStats {
    /// Count of values that coerced to a number.
    pub base: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    /// Sample standard deviation; needs at least two values.
    pub std: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LikertStats {
    /// Count of values that coerced to a number.
    pub base: usize,
    pub top_count: usize,
    pub bottom_count: usize,
    pub top_box: Option<f64>,
    pub bottom_box: Option<f64>,
    /// Letters of the banner columns whose top box this column beats at
    /// the configured significance level.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub significant_over: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatsRecord {
    Categorical(CategoricalStats),
    Numeric(NumericStats),
    Likert(LikertStats),
}

impl StatsRecord {
    #[must_use]
    pub fn base(&self) -> usize {
        match self {
            Self::Categorical(stats) => stats.base,
            Self::Numeric(stats) => stats.base,
            Self::Likert(stats) => stats.base,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikertCodes {
    pub top: Vec<i64>,
    pub bottom: Vec<i64>,
}

impl Default for LikertCodes {
    fn default() -> Self {
        Self {
            top: vec![1, 2],
            bottom: vec![4, 5],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregation {
    Categorical,
    Numeric,
    Likert(LikertCodes),
}

/// Dispatch to the statistic matching a question's type.
///
/// A question with no column in `base` yields zero-base statistics.
#[must_use]
pub fn aggregate(base: &RespondentTable, question: &str, aggregation: &Aggregation) -> StatsRecord {
    match aggregation {
        Aggregation::Categorical => StatsRecord::Categorical(categorical_stats(base, question)),
        Aggregation::Numeric => StatsRecord::Numeric(numeric_stats(base, question)),
        Aggregation::Likert(codes) => StatsRecord::Likert(likert_stats(base, question, codes)),
    }
}

#[must_use]
pub fn categorical_stats(base: &RespondentTable, question: &str) -> CategoricalStats {
    if !base.has_column(question) || base.is_empty() {
        return CategoricalStats::default();
    }

    let mut ordering = Vec::<String>::new();
    let mut counts = HashMap::<String, usize>::new();
    for label in base.column_values(question).filter_map(|cell| cell.label()) {
        let slot = counts.entry(label).or_insert_with_key(|key| {
            ordering.push(key.clone());
            0
        });
        *slot += 1;
    }

    let mut ranked = ordering
        .into_iter()
        .map(|label| {
            let count = counts.get(&label).copied().unwrap_or_default();
            (label, count)
        })
        .collect::<Vec<_>>();
    ranked.sort_by(|(la, ca), (lb, cb)| cb.cmp(ca).then_with(|| compare_labels(la, lb)));

    let respondents = base.len();
    let percentages = ranked
        .iter()
        .map(|(label, count)| (label.clone(), percentage(*count, respondents)))
        .collect();

    CategoricalStats {
        base: respondents,
        frequencies: ranked.into_iter().collect(),
        percentages,
    }
}

#[must_use]
pub fn numeric_stats(base: &RespondentTable, question: &str) -> NumericStats {
    let mut values = numeric_values(base, question);
    if values.is_empty() {
        return NumericStats::default();
    }
    values.sort_by(f64::total_cmp);

    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    };
    let std = (n > 1).then(|| {
        let sum_sq = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
        (sum_sq / (n - 1) as f64).sqrt()
    });

    NumericStats {
        base: n,
        mean: Some(round_to(mean, 2)),
        median: Some(round_to(median, 2)),
        std: std.map(|s| round_to(s, 2)),
    }
}

#[must_use]
pub fn likert_stats(base: &RespondentTable, question: &str, codes: &LikertCodes) -> LikertStats {
    let values = numeric_values(base, question);
    if values.is_empty() {
        return LikertStats::default();
    }

    let in_codes = |codes: &[i64]| {
        values
            .iter()
            .filter(|v| codes.iter().any(|code| (*code as f64) == **v))
            .count()
    };
    let top_count = in_codes(&codes.top);
    let bottom_count = in_codes(&codes.bottom);
    let n = values.len();

    LikertStats {
        base: n,
        top_count,
        bottom_count,
        top_box: Some(percentage(top_count, n)),
        bottom_box: Some(percentage(bottom_count, n)),
        significant_over: Vec::new(),
    }
}

fn numeric_values(base: &RespondentTable, question: &str) -> Vec<f64> {
    if !base.has_column(question) {
        return Vec::new();
    }
    base.column_values(question).filter_map(try_numeric).collect()
}

fn percentage(count: usize, base: usize) -> f64 {
    if base == 0 {
        return 0.0;
    }
    round_to(100.0 * count as f64 / base as f64, 1)
}

/// Numeric labels sort numerically, everything else lexically after them.
#[must_use]
pub fn compare_labels(left: &str, right: &str) -> Ordering {
    match (parse_number(left), parse_number(right)) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left.cmp(right),
    }
}

// ── Significance ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZTest {
    pub z: f64,
    /// Two-tailed, normal approximation.
    pub p_value: f64,
}

/// Pooled two-proportion z-test of `x1/n1` against `x2/n2`.
///
/// Undefined when either sample is empty.
#[must_use]
pub fn two_proportion_z_test(x1: usize, n1: usize, x2: usize, n2: usize) -> Option<ZTest> {
    if n1 == 0 || n2 == 0 {
        return None;
    }
    let (x1, n1, x2, n2) = (x1 as f64, n1 as f64, x2 as f64, n2 as f64);
    let p1 = x1 / n1;
    let p2 = x2 / n2;
    let pooled = (x1 + x2) / (n1 + n2);
    let se = (pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2)).sqrt();
    if se == 0.0 {
        // pooled is 0 or 1, so both proportions are equal
        return Some(ZTest { z: 0.0, p_value: 1.0 });
    }
    let z = (p1 - p2) / se;
    let p_value = 2.0 * (1.0 - normal_cdf(z.abs()));
    Some(ZTest {
        z,
        p_value: p_value.clamp(0.0, 1.0),
    })
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun 7.1.26; absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}
