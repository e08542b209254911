//! Column type inference.
//!
//! Candidates are tried in a fixed order (float, percentage, number with
//! unit, IPv4 prefix). A candidate wins when the share of non-missing values
//! it can parse exceeds the threshold; values it cannot parse become missing
//! in its output. Columns that no candidate claims stay categorical.

use std::collections::HashMap;

use crate::bits;
use crate::model::{ParsedValue, TypeTag, TypedColumn};

/// Classify a column and keep its raw values alongside the parsed ones.
pub fn typed_column(raw: Vec<Option<String>>, threshold: f64) -> TypedColumn {
    let (tag, parsed) = classify(&raw, threshold);
    TypedColumn { raw, tag, parsed }
}

/// Infer the type of `values` (`None` = missing) and parse them under it.
pub fn classify(values: &[Option<String>], threshold: f64) -> (TypeTag, Vec<ParsedValue>) {
    let total = values.iter().filter(|v| v.is_some()).count();
    if total == 0 {
        return (TypeTag::Categorical, as_text(values));
    }

    if let Some(parsed) = attempt(values, total, threshold, parse_float) {
        return (TypeTag::Float, parsed);
    }
    if let Some(parsed) = attempt(values, total, threshold, parse_percentage) {
        return (TypeTag::Percentage, parsed);
    }
    if let Some((unit, parsed)) = attempt_unit(values, total, threshold) {
        return (TypeTag::UnitFloat(unit), parsed);
    }
    if let Some(parsed) = attempt(values, total, threshold, |s| {
        bits::ipv4_bits(s).map(ParsedValue::Bits)
    }) {
        return (TypeTag::IpPrefixBits, parsed);
    }

    (TypeTag::Categorical, as_text(values))
}

fn as_text(values: &[Option<String>]) -> Vec<ParsedValue> {
    values
        .iter()
        .map(|v| match v {
            Some(s) => ParsedValue::Text(s.clone()),
            None => ParsedValue::Missing,
        })
        .collect()
}

/// Parse every non-missing value with `parse`; `Some` when the success share
/// clears the threshold.
fn attempt<F>(
    values: &[Option<String>],
    total: usize,
    threshold: f64,
    parse: F,
) -> Option<Vec<ParsedValue>>
where
    F: Fn(&str) -> Option<ParsedValue>,
{
    let mut successes = 0usize;
    let parsed: Vec<ParsedValue> = values
        .iter()
        .map(|v| match v.as_deref().and_then(&parse) {
            Some(p) => {
                successes += 1;
                p
            }
            None => ParsedValue::Missing,
        })
        .collect();

    if successes as f64 / total as f64 > threshold {
        Some(parsed)
    } else {
        None
    }
}

fn parse_float(s: &str) -> Option<ParsedValue> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(ParsedValue::Number)
}

fn parse_percentage(s: &str) -> Option<ParsedValue> {
    parse_float(s.trim().strip_suffix('%')?)
}

/// `"<number> <unit>"` split into its two tokens (exactly one space).
fn split_unit(s: &str) -> Option<(&str, &str)> {
    let s = s.trim();
    if s.matches(' ').count() != 1 {
        return None;
    }
    s.split_once(' ')
}

/// Number-with-unit columns. The dominant unit must cover more than the
/// threshold share of all non-missing values; the stripped numbers must then
/// classify as float or percentage.
fn attempt_unit(
    values: &[Option<String>],
    total: usize,
    threshold: f64,
) -> Option<(String, Vec<ParsedValue>)> {
    let mut unit_counts: HashMap<&str, usize> = HashMap::new();
    for (_, unit) in values.iter().flatten().filter_map(|s| split_unit(s)) {
        *unit_counts.entry(unit).or_insert(0) += 1;
    }

    // Highest count wins; ties go to the lexically smallest unit.
    let (unit, count) = unit_counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))?;
    if count as f64 / total as f64 <= threshold {
        return None;
    }

    let stripped: Vec<Option<String>> = values
        .iter()
        .map(|v| match v.as_deref().and_then(split_unit) {
            Some((number, u)) if u == unit => Some(number.to_string()),
            _ => None,
        })
        .collect();

    match classify(&stripped, threshold) {
        (TypeTag::Float | TypeTag::Percentage, parsed) => Some((unit.to_string(), parsed)),
        _ => None,
    }
}
