//! `pcorr accumulate | mine | run | split` — batch pipeline commands.

use std::path::{Path, PathBuf};

use clap::Args;
use pcorr_mining::{
    MiningConfig, MiningError, MiningResult, MiningSummary, PivotLayout, PivotTable,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::CliError;

const PIVOT_PREFIX: &str = "corr_data_";

// ============================================================================
// Shared arguments
// ============================================================================

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// TOML file with [layout], [thresholds] and workers; flags override it
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LayoutArgs {
    /// Raw-row positions forming the entity key (comma separated)
    #[arg(long = "key", value_delimiter = ',')]
    pub key_fields: Vec<usize>,

    /// Raw-row positions stored in each pivot cell (comma separated)
    #[arg(long = "data", value_delimiter = ',')]
    pub data_fields: Vec<usize>,

    /// Raw-row position of the instance identifier
    #[arg(long = "instance")]
    pub instance_field: Option<usize>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ThresholdArgs {
    /// Share of values a type must parse to claim a column
    #[arg(long)]
    pub type_thresh: Option<f64>,

    /// Share above which a value is golden
    #[arg(long)]
    pub cat_thresh: Option<f64>,

    /// Co-occurrence smoothing (below 1: fraction of rows)
    #[arg(long)]
    pub cat_margin: Option<f64>,

    /// Minimum confidence for a reported relation
    #[arg(long)]
    pub min_corr: Option<f64>,

    /// Columns whose top value share exceeds this are not pair-mined
    #[arg(long)]
    pub corr_thresh: Option<f64>,

    /// Pair-mining threads (default: one per core)
    #[arg(long)]
    pub workers: Option<usize>,
}

/// Config file (if any) with flag overrides applied, then validated.
fn resolve_config(
    config: &ConfigArgs,
    layout: Option<&LayoutArgs>,
    thresholds: Option<&ThresholdArgs>,
) -> Result<MiningConfig, CliError> {
    let mut resolved = match &config.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                CliError::config(format!("cannot read config {}: {e}", path.display()))
            })?;
            MiningConfig::from_toml(&text).map_err(|e| CliError::config(e.to_string()))?
        }
        None => MiningConfig::default(),
    };

    if let Some(args) = layout {
        apply_layout(&mut resolved, args)?;
    }
    if let Some(args) = thresholds {
        let t = &mut resolved.thresholds;
        if let Some(v) = args.type_thresh {
            t.type_thresh = v;
        }
        if let Some(v) = args.cat_thresh {
            t.cat_thresh = v;
        }
        if let Some(v) = args.cat_margin {
            t.cat_margin = v;
        }
        if let Some(v) = args.min_corr {
            t.min_corr = v;
        }
        if let Some(v) = args.corr_thresh {
            t.corr_thresh = v;
        }
        if args.workers.is_some() {
            resolved.workers = args.workers;
        }
    }

    resolved.validate().map_err(|e| CliError::config(e.to_string()))?;
    debug!(config = ?resolved, "configuration resolved");
    Ok(resolved)
}

fn apply_layout(config: &mut MiningConfig, args: &LayoutArgs) -> Result<(), CliError> {
    let touched =
        !args.key_fields.is_empty() || !args.data_fields.is_empty() || args.instance_field.is_some();
    if !touched {
        return Ok(());
    }

    let mut layout = config
        .layout
        .clone()
        .unwrap_or_else(|| PivotLayout::new(Vec::new(), Vec::new(), 0));
    if !args.key_fields.is_empty() {
        layout.key_fields = args.key_fields.clone();
    }
    if !args.data_fields.is_empty() {
        layout.data_fields = args.data_fields.clone();
    }
    if let Some(i) = args.instance_field {
        layout.instance_field = i;
    }
    layout.validate().map_err(|e| {
        CliError::args(e.to_string()).with_hint("pass --key, --data and --instance together")
    })?;
    config.layout = Some(layout);
    Ok(())
}

fn require_layout(config: &MiningConfig) -> Result<PivotLayout, CliError> {
    config.require_layout().cloned().map_err(|e| {
        CliError::args(e.to_string())
            .with_hint("use --key 1 --data 3 --instance 2, or a [layout] table in --config")
    })
}

pub fn parse_delimiter(delimiter: Option<char>) -> Result<Option<u8>, CliError> {
    match delimiter {
        None => Ok(None),
        Some(c) if c.is_ascii() => Ok(Some(c as u8)),
        Some(c) => Err(CliError::args(format!(
            "delimiter must be a single ASCII character, got '{c}'"
        ))),
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub tag: String,
    pub pivot: Option<String>,
    pub entities: usize,
    pub instances: usize,
    pub golden: Option<String>,
    pub correlations: Option<String>,
    pub archive: Option<String>,
    pub summary: Option<MiningSummary>,
}

impl RunReport {
    fn new(tag: &str, table: &PivotTable) -> Self {
        Self {
            tag: tag.to_string(),
            pivot: None,
            entities: table.rows().len(),
            instances: table.instances().len(),
            golden: None,
            correlations: None,
            archive: None,
            summary: None,
        }
    }

    fn print(&self, json: bool) -> Result<(), CliError> {
        if json {
            let text = serde_json::to_string_pretty(self)
                .map_err(|e| CliError::general(format!("cannot encode report: {e}")))?;
            println!("{text}");
            return Ok(());
        }

        println!("tag:          {}", self.tag);
        println!("entities:     {}", self.entities);
        println!("instances:    {}", self.instances);
        if let Some(s) = &self.summary {
            println!("columns:      {} ({} mined)", s.columns, s.retained);
            println!("pairs:        {} ({} skipped)", s.pairs_mined, s.pairs_skipped);
            println!("golden values: {}", s.golden_values);
            println!("relations:    {}", s.relations);
        }
        for (label, path) in [
            ("pivot:", &self.pivot),
            ("golden:", &self.golden),
            ("correlations:", &self.correlations),
            ("archive:", &self.archive),
        ] {
            if let Some(p) = path {
                println!("{label:<14}{p}");
            }
        }
        Ok(())
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Run tag taken from a pivot file name: `corr_data_<tag>.csv` → `<tag>`,
/// otherwise the file stem.
pub fn tag_from_pivot(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.strip_prefix(PIVOT_PREFIX) {
        Some(tag) if !tag.is_empty() => tag.to_string(),
        _ => stem,
    }
}

/// Default run tag: current Unix timestamp.
fn default_tag() -> String {
    chrono::Utc::now().timestamp().to_string()
}

// ============================================================================
// accumulate
// ============================================================================

pub fn cmd_accumulate(
    input: PathBuf,
    pivot: PathBuf,
    config: ConfigArgs,
    layout: LayoutArgs,
    delimiter: Option<char>,
    json: bool,
) -> Result<(), CliError> {
    let config = resolve_config(&config, Some(&layout), None)?;
    let layout = require_layout(&config)?;
    let table = accumulate_into(&input, &pivot, &layout, parse_delimiter(delimiter)?)?;

    let mut report = RunReport::new(&tag_from_pivot(&pivot), &table);
    report.pivot = Some(display(&pivot));
    report.print(json)
}

fn accumulate_into(
    input: &Path,
    pivot: &Path,
    layout: &PivotLayout,
    delimiter: Option<u8>,
) -> Result<PivotTable, CliError> {
    let batch = pcorr_io::read_batch(input, delimiter).map_err(CliError::input)?;
    let existing = pcorr_io::load_or_empty(pivot).map_err(CliError::input)?;
    let table = pcorr_mining::accumulate(existing, &batch, layout).map_err(CliError::input)?;
    pcorr_io::write_pivot(pivot, &table).map_err(CliError::output)?;
    info!(pivot = %pivot.display(), "pivot table saved");
    Ok(table)
}

// ============================================================================
// mine
// ============================================================================

pub fn cmd_mine(
    pivot: PathBuf,
    out_dir: Option<PathBuf>,
    tag: Option<String>,
    config: ConfigArgs,
    thresholds: ThresholdArgs,
    json: bool,
) -> Result<(), CliError> {
    let config = resolve_config(&config, None, Some(&thresholds))?;
    let table = pcorr_io::read_pivot(&pivot)
        .map_err(CliError::input)
        .map_err(|e| e.with_hint("mine reads a pivot written by `pcorr accumulate` or `pcorr run`"))?;

    let tag = tag.unwrap_or_else(|| tag_from_pivot(&pivot));
    let out_dir = out_dir
        .or_else(|| pivot.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let mut report = RunReport::new(&tag, &table);
    let result = pcorr_mining::mine(&table, &config).map_err(CliError::input)?;
    write_results(&result, &out_dir, &tag, &mut report)?;
    report.summary = Some(result.summary);
    report.print(json)
}

/// Write golden and relation tables into `dir`, recording the paths.
fn write_results(
    result: &MiningResult,
    dir: &Path,
    tag: &str,
    report: &mut RunReport,
) -> Result<Vec<PathBuf>, CliError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| CliError::output_msg(format!("cannot create {}: {e}", dir.display())))?;
    let golden = dir.join(format!("golden_{tag}.csv"));
    let correlations = dir.join(format!("correlations_{tag}.csv"));
    pcorr_io::write_golden(&golden, result).map_err(CliError::output)?;
    pcorr_io::write_relations(&correlations, result).map_err(CliError::output)?;

    report.golden = Some(display(&golden));
    report.correlations = Some(display(&correlations));
    Ok(vec![golden, correlations])
}

// ============================================================================
// run
// ============================================================================

#[allow(clippy::too_many_arguments)]
pub fn cmd_run(
    input: PathBuf,
    dir: PathBuf,
    tag: Option<String>,
    config: ConfigArgs,
    layout: LayoutArgs,
    thresholds: ThresholdArgs,
    delimiter: Option<char>,
    archive: bool,
    json: bool,
) -> Result<(), CliError> {
    let config = resolve_config(&config, Some(&layout), Some(&thresholds))?;
    let layout = require_layout(&config)?;
    let delimiter = parse_delimiter(delimiter)?;
    if let Some(t) = &tag {
        if t.is_empty() || t.contains(['/', '\\']) {
            return Err(CliError::args(format!("invalid tag \"{t}\"")));
        }
    }
    let tag = tag.unwrap_or_else(default_tag);

    std::fs::create_dir_all(&dir)
        .map_err(|e| CliError::output_msg(format!("cannot create {}: {e}", dir.display())))?;
    let pivot = dir.join(format!("{PIVOT_PREFIX}{tag}.csv"));
    let table = accumulate_into(&input, &pivot, &layout, delimiter)?;

    let mut report = RunReport::new(&tag, &table);
    report.pivot = Some(display(&pivot));
    let result = pcorr_mining::mine(&table, &config).map_err(CliError::input)?;
    let mut outputs = write_results(&result, &dir, &tag, &mut report)?;
    report.summary = Some(result.summary);

    if archive {
        outputs.insert(0, pivot);
        let zip_path = dir.join(format!("correlation_data_{tag}.zip"));
        pcorr_io::archive_and_remove(&zip_path, &outputs).map_err(CliError::output)?;
        report.pivot = None;
        report.golden = None;
        report.correlations = None;
        report.archive = Some(display(&zip_path));
    }
    report.print(json)
}

// ============================================================================
// split
// ============================================================================

pub fn cmd_split(
    input: PathBuf,
    key_fields: Vec<usize>,
    out: PathBuf,
    delimiter: Option<char>,
    json: bool,
) -> Result<(), CliError> {
    let batch =
        pcorr_io::read_batch(&input, parse_delimiter(delimiter)?).map_err(CliError::input)?;
    let files = pcorr_io::split_batch(&batch, &out, &key_fields).map_err(|e| match e {
        MiningError::Io(_) => CliError::output(e),
        other => CliError::input(other),
    })?;
    info!(input = %input.display(), files = files.len(), "split export by key");

    if json {
        #[derive(Serialize)]
        struct Part<'a> {
            key: &'a [String],
            path: String,
            rows: usize,
        }
        let parts: Vec<Part<'_>> = files
            .iter()
            .map(|f| Part { key: &f.key, path: display(&f.path), rows: f.rows })
            .collect();
        let text = serde_json::to_string_pretty(&parts)
            .map_err(|e| CliError::general(format!("cannot encode report: {e}")))?;
        println!("{text}");
    } else {
        for f in &files {
            println!("{}\t{} row(s)", f.path.display(), f.rows);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_codes::{EXIT_CONFIG, EXIT_USAGE};

    #[test]
    fn tag_comes_from_pivot_name() {
        assert_eq!(tag_from_pivot(Path::new("/data/corr_data_1700000000.csv")), "1700000000");
        assert_eq!(tag_from_pivot(Path::new("weekly.csv")), "weekly");
        assert_eq!(tag_from_pivot(Path::new("corr_data_.csv")), "corr_data_");
    }

    #[test]
    fn flags_override_config_layout() {
        let layout = LayoutArgs {
            key_fields: vec![0, 1],
            data_fields: vec![],
            instance_field: Some(4),
        };
        let mut config = MiningConfig {
            layout: Some(PivotLayout::new(vec![0], vec![3], 2)),
            ..MiningConfig::default()
        };
        apply_layout(&mut config, &layout).unwrap();
        assert_eq!(config.layout, Some(PivotLayout::new(vec![0, 1], vec![3], 4)));
    }

    #[test]
    fn partial_layout_without_config_is_usage_error() {
        let layout = LayoutArgs { key_fields: vec![1], ..LayoutArgs::default() };
        let mut config = MiningConfig::default();
        let err = apply_layout(&mut config, &layout).unwrap_err();
        assert_eq!(err.code, EXIT_USAGE);
    }

    #[test]
    fn threshold_flags_are_validated() {
        let thresholds = ThresholdArgs { cat_thresh: Some(1.5), ..ThresholdArgs::default() };
        let err = resolve_config(&ConfigArgs::default(), None, Some(&thresholds)).unwrap_err();
        assert_eq!(err.code, EXIT_CONFIG);
    }

    #[test]
    fn non_ascii_delimiter_rejected() {
        assert_eq!(parse_delimiter(Some(';')).unwrap(), Some(b';'));
        assert!(parse_delimiter(Some('§')).is_err());
    }
}
