use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::classify::typed_column;
use crate::config::{MiningConfig, Thresholds};
use crate::error::MiningError;
use crate::model::{
    ColumnGolden, ColumnKey, GoldenValue, MiningResult, MiningSummary, PivotTable,
    RelationRecord, TypedColumn,
};
use crate::relation::detect_relations;

/// One column prepared for pair mining.
struct Prepared {
    key: ColumnKey,
    column: TypedColumn,
}

/// Run golden-value extraction and all-pairs relation mining over a pivot
/// table.
pub fn mine(pivot: &PivotTable, config: &MiningConfig) -> Result<MiningResult, MiningError> {
    config.validate()?;
    let t = &config.thresholds;

    let mut summary = MiningSummary::default();
    let mut golden = Vec::new();
    let mut retained = Vec::new();

    for (key, column) in columns(pivot, t) {
        summary.columns += 1;
        *summary.type_counts.entry(column.tag.to_string()).or_insert(0) += 1;

        let stats = value_stats(&column.raw);
        let values = golden_values(&stats, t);
        summary.golden_values += values.len();
        debug!(
            column = %key,
            tag = %column.tag,
            non_missing = stats.non_missing,
            golden = values.len(),
            "classified column"
        );

        if is_minable(&stats, t) {
            retained.push(Prepared { key: key.clone(), column });
        } else {
            debug!(column = %key, "column excluded from pair mining");
        }
        golden.push(ColumnGolden { column: key, values });
    }
    summary.retained = retained.len();

    let outcomes = mine_pairs(&retained, t, config.workers)?;
    let mut relations = Vec::new();
    for outcome in outcomes {
        match outcome {
            PairOutcome::Mined(mut records) => {
                summary.pairs_mined += 1;
                relations.append(&mut records);
            }
            PairOutcome::Skipped => summary.pairs_skipped += 1,
        }
    }
    summary.relations = relations.len();

    info!(
        columns = summary.columns,
        retained = summary.retained,
        pairs = summary.pairs_mined,
        skipped = summary.pairs_skipped,
        golden = summary.golden_values,
        relations = summary.relations,
        "mining complete"
    );

    Ok(MiningResult {
        heads: pivot.column_heads(),
        golden,
        relations,
        summary,
    })
}

/// Split the pivot table into typed columns, one per (row, data field).
fn columns<'a>(
    pivot: &'a PivotTable,
    t: &'a Thresholds,
) -> impl Iterator<Item = (ColumnKey, TypedColumn)> + 'a {
    pivot.rows().iter().flat_map(move |row| {
        (0..pivot.data_width()).map(move |data_index| {
            let raw: Vec<Option<String>> =
                row.cells.iter().map(|cell| cell[data_index].clone()).collect();
            let key = ColumnKey { entity: row.key.clone(), data_index };
            (key, typed_column(raw, t.type_thresh))
        })
    })
}

// ---------------------------------------------------------------------------
// Golden values + pruning
// ---------------------------------------------------------------------------

struct ValueStats<'a> {
    non_missing: usize,
    /// Non-missing values with their counts, first-seen order.
    counts: Vec<(&'a str, usize)>,
}

fn value_stats(raw: &[Option<String>]) -> ValueStats<'_> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for v in raw.iter().flatten() {
        match index.get(v.as_str()) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(v.as_str(), counts.len());
                counts.push((v.as_str(), 1));
            }
        }
    }
    ValueStats {
        non_missing: raw.iter().filter(|v| v.is_some()).count(),
        counts,
    }
}

fn golden_values(stats: &ValueStats<'_>, t: &Thresholds) -> Vec<GoldenValue> {
    if stats.non_missing == 0 {
        return Vec::new();
    }
    let n = stats.non_missing as f64;
    stats
        .counts
        .iter()
        .filter(|(_, c)| *c as f64 / n > t.cat_thresh)
        .map(|(v, c)| GoldenValue {
            value: v.to_string(),
            confidence: *c as f64 / n,
        })
        .collect()
}

/// A column is worth pair mining when it has data and no single value
/// dominates beyond `corr_thresh`.
fn is_minable(stats: &ValueStats<'_>, t: &Thresholds) -> bool {
    if stats.non_missing == 0 {
        return false;
    }
    let top = stats.counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
    top as f64 <= t.corr_thresh * stats.non_missing as f64
}

// ---------------------------------------------------------------------------
// Pair mining
// ---------------------------------------------------------------------------

enum PairOutcome {
    Mined(Vec<RelationRecord>),
    Skipped,
}

/// Mine every unordered pair on a bounded pool. Results come back in pair
/// order regardless of scheduling.
fn mine_pairs(
    columns: &[Prepared],
    t: &Thresholds,
    workers: Option<usize>,
) -> Result<Vec<PairOutcome>, MiningError> {
    let pairs: Vec<(usize, usize)> = (0..columns.len())
        .flat_map(|i| (i + 1..columns.len()).map(move |j| (i, j)))
        .collect();
    if pairs.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = workers {
        builder = builder.num_threads(n);
    }
    let pool = builder
        .build()
        .map_err(|e| MiningError::ConfigValidation(format!("cannot start worker pool: {e}")))?;

    debug!(pairs = pairs.len(), threads = pool.current_num_threads(), "mining column pairs");
    Ok(pool.install(|| {
        pairs
            .par_iter()
            .map(|&(i, j)| mine_pair(&columns[i], &columns[j], t))
            .collect()
    }))
}

fn mine_pair(left: &Prepared, right: &Prepared, t: &Thresholds) -> PairOutcome {
    match detect_relations(&left.column, &right.column, t) {
        Ok(relations) => PairOutcome::Mined(
            relations
                .into_iter()
                .map(|relation| RelationRecord {
                    left: left.key.clone(),
                    right: right.key.clone(),
                    relation,
                })
                .collect(),
        ),
        Err(e) => {
            warn!(left = %left.key, right = %right.key, error = %e, "skipping column pair");
            PairOutcome::Skipped
        }
    }
}
