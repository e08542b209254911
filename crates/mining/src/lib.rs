//! `pcorr-mining` — pivot accumulation, column typing and pairwise relation
//! mining over multi-instance configuration data.
//!
//! Pure engine crate: receives parsed batches and pivot tables, returns golden
//! values and relation records. No CLI or file IO.

pub mod bits;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod pivot;
pub mod relation;

pub use config::{MiningConfig, PivotLayout, Thresholds};
pub use engine::mine;
pub use error::MiningError;
pub use model::{
    ColumnGolden, ColumnKey, EntityKey, GoldenValue, MiningResult, MiningSummary, PivotTable,
    RawBatch, Relation, RelationKind, RelationRecord, TypeTag,
};
pub use pivot::accumulate;
