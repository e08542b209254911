// Property-based tests for classification, accumulation and pair mining.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::HashSet;

use proptest::prelude::*;
use pcorr_mining::classify::{classify, typed_column};
use pcorr_mining::model::{Param, ParsedValue, PivotRow, PivotTable, RawBatch, RelationKind};
use pcorr_mining::relation::detect_relations;
use pcorr_mining::{accumulate, mine, EntityKey, MiningConfig, PivotLayout, Thresholds, TypeTag};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn config_64() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(64),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Small categorical vocabulary so that pairs actually co-occur.
fn arb_label() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        4 => prop::sample::select(vec!["up", "down", "idle"]).prop_map(|s| Some(s.to_string())),
        1 => Just(None),
    ]
}

fn arb_int_cell() -> impl Strategy<Value = Option<i32>> {
    prop_oneof![4 => any::<i32>().prop_map(Some), 1 => Just(None)]
}

/// Pivot with `entities` rows of one data slot over `instances` columns.
fn arb_pivot() -> impl Strategy<Value = PivotTable> {
    (2usize..6, 3usize..12).prop_flat_map(|(entities, instances)| {
        prop::collection::vec(prop::collection::vec(arb_label(), instances), entities).prop_map(
            move |grid| {
                let rows = grid
                    .into_iter()
                    .enumerate()
                    .map(|(e, cells)| PivotRow {
                        key: EntityKey::from_fields(&[format!("host-{e}")]),
                        cells: cells.into_iter().map(|c| vec![c]).collect(),
                    })
                    .collect();
                let names = (0..instances).map(|i| format!("run-{i}")).collect();
                PivotTable::from_parts(vec!["host".into()], names, 1, rows).unwrap()
            },
        )
    })
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    /// Integer columns are floats with exact values; missing stays missing.
    #[test]
    fn integer_columns_classify_as_float(cells in prop::collection::vec(arb_int_cell(), 1..40)) {
        prop_assume!(cells.iter().any(|c| c.is_some()));
        let raw: Vec<Option<String>> = cells.iter().map(|c| c.map(|n| n.to_string())).collect();
        let (tag, parsed) = classify(&raw, 0.9);
        prop_assert_eq!(tag, TypeTag::Float);
        for (cell, p) in cells.iter().zip(&parsed) {
            match cell {
                Some(n) => prop_assert_eq!(p, &ParsedValue::Number(*n as f64)),
                None => prop_assert_eq!(p, &ParsedValue::Missing),
            }
        }
    }

    /// Classification never changes the column length.
    #[test]
    fn parsed_is_row_aligned(cells in prop::collection::vec(arb_label(), 0..30)) {
        let column = typed_column(cells.clone(), 0.9);
        prop_assert_eq!(column.parsed.len(), cells.len());
        prop_assert_eq!(column.non_missing(), cells.iter().filter(|c| c.is_some()).count());
    }
}

// ---------------------------------------------------------------------------
// Co-occurrence
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    /// A value pair is reported as at most one of CC_Pos / CC_As_0 / CC_As_1,
    /// and every reported score clears min_corr.
    #[test]
    fn positive_and_association_are_exclusive(
        rows in prop::collection::vec((arb_label(), arb_label()), 1..60),
    ) {
        let (left, right): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
        let t = Thresholds::default();
        let rels = detect_relations(&typed_column(left, 0.9), &typed_column(right, 0.9), &t).unwrap();

        let mut seen: HashSet<(String, String)> = HashSet::new();
        for rel in &rels {
            if !matches!(rel.kind, RelationKind::CcPos | RelationKind::CcAs0 | RelationKind::CcAs1) {
                continue;
            }
            let (Some(Param::Text(a)), Some(Param::Text(b)), Some(Param::Number(score))) =
                (rel.param(0), rel.param(1), rel.param(2))
            else {
                panic!("unexpected params {:?}", rel.params);
            };
            prop_assert!(*score > t.min_corr);
            prop_assert!(seen.insert((a.clone(), b.clone())), "pair {a}/{b} reported twice");
        }
    }
}

// ---------------------------------------------------------------------------
// Accumulation + mining
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_64())]

    /// Folding the same batch twice leaves the table as after the first fold.
    #[test]
    fn accumulation_is_idempotent(
        rows in prop::collection::vec((0usize..4, 0usize..5, arb_label()), 1..30),
    ) {
        let batch = RawBatch {
            header: vec!["host".into(), "run".into(), "state".into()],
            rows: rows
                .iter()
                .map(|(h, r, v)| {
                    vec![format!("h{h}"), format!("r{r}"), v.clone().unwrap_or_else(|| "inf".into())]
                })
                .collect(),
        };
        let layout = PivotLayout::new(vec![0], vec![2], 1);
        let once = accumulate(PivotTable::default(), &batch, &layout).unwrap();
        let twice = accumulate(once.clone(), &batch, &layout).unwrap();
        prop_assert_eq!(once.instances(), twice.instances());
        prop_assert_eq!(once.rows(), twice.rows());
    }

    /// Worker count never changes what is mined or in which order.
    #[test]
    fn mining_is_deterministic(table in arb_pivot()) {
        let with_workers = |n| MiningConfig { workers: Some(n), ..MiningConfig::default() };
        let single = mine(&table, &with_workers(1)).unwrap();
        let pooled = mine(&table, &with_workers(3)).unwrap();
        prop_assert_eq!(single.relations, pooled.relations);
        prop_assert_eq!(single.golden, pooled.golden);
        prop_assert_eq!(single.summary, pooled.summary);
    }
}
