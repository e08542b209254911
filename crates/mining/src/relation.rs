//! Pairwise relation detection between two row-aligned typed columns.
//!
//! Every pair gets the categorical co-occurrence pass over raw values. On top
//! of that the column types select at most one typed pass: category vs
//! address prefix, address vs address (with a refinement over host bits),
//! or a least-squares fit for two numeric columns.

use std::collections::HashMap;
use std::hash::Hash;

use crate::config::Thresholds;
use crate::error::MiningError;
use crate::model::{Param, ParsedValue, Relation, RelationKind, TypeTag, TypedColumn};

/// Leading bits dropped before mining the host part of two address columns.
const NETWORK_BITS: usize = 8;

/// Depth limit for the host-bit refinement.
const MAX_REFINE_DEPTH: usize = 1;

/// All relations between `left` and `right`. Output order follows first
/// appearance of values, so equal inputs give equal output.
pub fn detect_relations(
    left: &TypedColumn,
    right: &TypedColumn,
    thresholds: &Thresholds,
) -> Result<Vec<Relation>, MiningError> {
    detect_at_depth(left, right, thresholds, 0)
}

fn detect_at_depth(
    left: &TypedColumn,
    right: &TypedColumn,
    thresholds: &Thresholds,
    depth: usize,
) -> Result<Vec<Relation>, MiningError> {
    if left.len() != right.len()
        || left.parsed.len() != left.len()
        || right.parsed.len() != right.len()
    {
        return Err(MiningError::LengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }

    let rows = left.len();
    let mut rels = co_occurrence(&left.raw, &right.raw, rows, thresholds);

    // Category vs address: the address column always goes second.
    let (first, second, swapped) = match (&left.tag, &right.tag) {
        (TypeTag::IpPrefixBits, TypeTag::Categorical) => (right, left, true),
        _ => (left, right, false),
    };

    match (&first.tag, &second.tag) {
        (TypeTag::Categorical, TypeTag::IpPrefixBits) => {
            rels.extend(category_prefixes(first, second, rows, thresholds, swapped));
        }
        (TypeTag::IpPrefixBits, TypeTag::IpPrefixBits) => {
            rels.extend(prefix_overlap(first, second));
            if depth < MAX_REFINE_DEPTH {
                rels.extend(host_bit_relations(first, second, thresholds, depth)?);
            }
        }
        (a, b) if a.is_numeric() && b.is_numeric() => {
            rels.extend(linear_relation(first, second, thresholds));
        }
        _ => {}
    }

    Ok(rels)
}

// ---------------------------------------------------------------------------
// Counting
// ---------------------------------------------------------------------------

/// Frequency table that remembers first-seen order.
struct Counts<K> {
    order: Vec<K>,
    counts: HashMap<K, usize>,
}

impl<K: Copy + Eq + Hash> Counts<K> {
    fn new() -> Self {
        Self { order: Vec::new(), counts: HashMap::new() }
    }

    fn add(&mut self, key: K) {
        let count = self.counts.entry(key).or_insert(0);
        if *count == 0 {
            self.order.push(key);
        }
        *count += 1;
    }

    fn get(&self, key: &K) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    fn iter(&self) -> impl Iterator<Item = (K, usize)> + '_ {
        self.order.iter().map(|k| (*k, self.counts[k]))
    }
}

// ---------------------------------------------------------------------------
// Categorical pass
// ---------------------------------------------------------------------------

fn co_occurrence(
    left: &[Option<String>],
    right: &[Option<String>],
    rows: usize,
    t: &Thresholds,
) -> Vec<Relation> {
    let margin = t.margin_for(rows);

    let mut left_counts: Counts<&str> = Counts::new();
    let mut right_counts: Counts<&str> = Counts::new();
    let mut joint: Counts<(&str, &str)> = Counts::new();
    for (l, r) in left.iter().zip(right) {
        if let Some(l) = l.as_deref() {
            left_counts.add(l);
        }
        if let Some(r) = r.as_deref() {
            right_counts.add(r);
        }
        if let (Some(l), Some(r)) = (l.as_deref(), r.as_deref()) {
            joint.add((l, r));
        }
    }

    let mut rels = Vec::new();
    let score_rel = |kind, a: &str, b: &str, score: f64| {
        Relation::new(
            kind,
            vec![Param::Text(a.to_string()), Param::Text(b.to_string()), Param::Number(score)],
        )
    };

    // Positive co-occurrence and one-way association.
    for ((a, b), j) in joint.iter() {
        let (ca, cb, j) = (left_counts.get(&a) as f64, right_counts.get(&b) as f64, j as f64);
        let together = j / ((ca * cb).sqrt() + margin);
        let given_a = j / (ca + margin);
        let given_b = j / (cb + margin);
        if together > t.min_corr {
            rels.push(score_rel(RelationKind::CcPos, a, b, together));
        } else if given_a > t.min_corr {
            rels.push(score_rel(RelationKind::CcAs0, a, b, given_a));
        } else if given_b > t.min_corr {
            rels.push(score_rel(RelationKind::CcAs1, a, b, given_b));
        }
    }

    // Frequent values that avoid each other.
    let majority = t.cat_thresh * rows as f64;
    let left_major: Vec<(&str, usize)> =
        left_counts.iter().filter(|(_, c)| *c as f64 > majority).collect();
    let right_major: Vec<(&str, usize)> =
        right_counts.iter().filter(|(_, c)| *c as f64 > majority).collect();
    for &(p, cp) in &left_major {
        for &(q, cq) in &right_major {
            let score = joint.get(&(p, q)) as f64 / ((cp * cq) as f64).sqrt();
            if score < 1.0 - t.min_corr {
                rels.push(score_rel(RelationKind::CcNeg, p, q, 1.0 - score));
            }
        }
    }

    rels
}

// ---------------------------------------------------------------------------
// Category vs address prefix
// ---------------------------------------------------------------------------

fn category_prefixes(
    category: &TypedColumn,
    address: &TypedColumn,
    rows: usize,
    t: &Thresholds,
    swapped: bool,
) -> Vec<Relation> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&str>> = HashMap::new();
    for (cat, addr) in category.raw.iter().zip(&address.parsed) {
        let (Some(cat), Some(bits)) = (cat.as_deref(), addr.as_bits()) else {
            continue;
        };
        groups
            .entry(cat)
            .or_insert_with(|| {
                order.push(cat);
                Vec::new()
            })
            .push(bits);
    }

    let kind = if swapped { RelationKind::IcPrf } else { RelationKind::CiPrf };
    let base = t.cat_thresh * rows as f64;
    order
        .into_iter()
        .map(|cat| {
            let members = &groups[cat];
            let prefix = crate::bits::common_prefix(members.iter().copied());
            Relation::new(
                kind,
                vec![
                    Param::Text(cat.to_string()),
                    Param::Text(prefix),
                    Param::Number(members.len() as f64 / base),
                ],
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Address vs address
// ---------------------------------------------------------------------------

fn prefix_overlap(left: &TypedColumn, right: &TypedColumn) -> Option<Relation> {
    let mut shared: Vec<usize> = left
        .parsed
        .iter()
        .zip(&right.parsed)
        .filter_map(|(l, r)| Some(crate::bits::common_prefix_len(l.as_bits()?, r.as_bits()?)))
        .collect();
    if shared.is_empty() {
        return None;
    }
    shared.sort_unstable_by(|a, b| b.cmp(a));

    let n = shared.len();
    let at = |share: f64| shared[((n as f64 * share) as usize).min(n - 1)];
    Some(Relation::new(
        RelationKind::Ii1008060,
        vec![
            Param::Count(shared[n - 1]),
            Param::Count(at(0.8)),
            Param::Count(at(0.6)),
        ],
    ))
}

/// Mine the bits after the first octet of both address columns as plain
/// categories, reporting the results as within-subnet relations.
fn host_bit_relations(
    left: &TypedColumn,
    right: &TypedColumn,
    t: &Thresholds,
    depth: usize,
) -> Result<Vec<Relation>, MiningError> {
    let (host_left, host_right): (Vec<Option<String>>, Vec<Option<String>>) = left
        .parsed
        .iter()
        .zip(&right.parsed)
        .filter_map(|(l, r)| match (l.as_bits(), r.as_bits()) {
            (Some(l), Some(r)) if l.len() > NETWORK_BITS && r.len() > NETWORK_BITS => Some((
                Some(l[NETWORK_BITS..].to_string()),
                Some(r[NETWORK_BITS..].to_string()),
            )),
            _ => None,
        })
        .unzip();
    if host_left.is_empty() {
        return Ok(Vec::new());
    }

    let as_category = |raw: Vec<Option<String>>| {
        let parsed = raw
            .iter()
            .map(|v| v.clone().map_or(ParsedValue::Missing, ParsedValue::Text))
            .collect();
        TypedColumn { raw, tag: TypeTag::Categorical, parsed }
    };

    let inner = detect_at_depth(&as_category(host_left), &as_category(host_right), t, depth + 1)?;
    Ok(inner
        .into_iter()
        .map(|mut rel| {
            rel.kind = rel.kind.within_subnet();
            rel
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Numeric vs numeric
// ---------------------------------------------------------------------------

/// Ordinary least-squares line and Pearson correlation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    pub r: f64,
}

/// Fit `y = slope·x + intercept`. `None` when x is constant or empty.
/// A constant y gives `r = 0`.
pub fn least_squares(xs: &[f64], ys: &[f64]) -> Option<LineFit> {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return None;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

    let (mut ssx, mut ssy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - mean_x, y - mean_y);
        ssx += dx * dx;
        ssy += dy * dy;
        sxy += dx * dy;
    }
    if ssx == 0.0 {
        return None;
    }

    let slope = sxy / ssx;
    let intercept = mean_y - slope * mean_x;
    let r = if ssy == 0.0 {
        0.0
    } else {
        (sxy / (ssx * ssy).sqrt()).clamp(-1.0, 1.0)
    };
    Some(LineFit { slope, intercept, r })
}

fn linear_relation(x: &TypedColumn, y: &TypedColumn, t: &Thresholds) -> Option<Relation> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .parsed
        .iter()
        .zip(&y.parsed)
        .filter_map(|(a, b)| Some((a.as_number()?, b.as_number()?)))
        .unzip();

    let fit = least_squares(&xs, &ys)?;
    if !fit.intercept.is_finite() || fit.r <= t.min_corr.sqrt() {
        return None;
    }
    Some(Relation::new(
        RelationKind::FfLinReg,
        vec![
            Param::Number(fit.slope),
            Param::Number(fit.intercept),
            Param::Number(fit.r * fit.r),
        ],
    ))
}
