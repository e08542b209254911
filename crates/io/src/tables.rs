// Golden-value and relation table export

use std::io;
use std::path::Path;

use pcorr_mining::model::MiningResult;
use pcorr_mining::MiningError;

use crate::pivot::csv_io;

/// Relation rows always carry this many parameter columns.
const PARAM_COLUMNS: usize = 3;

/// One row per column: column key, then (value, confidence) pairs. Columns
/// without golden values still get a row.
pub fn write_golden_to<W: io::Write>(result: &MiningResult, out: W) -> Result<(), MiningError> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(out);

    let mut header = result.heads.clone();
    header.push("Golden value".to_string());
    header.push("conf_prob".to_string());
    writer.write_record(&header).map_err(csv_io)?;

    for golden in &result.golden {
        let mut record = golden.column.to_fields();
        for v in &golden.values {
            record.push(v.value.clone());
            record.push(v.confidence.to_string());
        }
        writer.write_record(&record).map_err(csv_io)?;
    }
    writer.flush()?;
    Ok(())
}

/// One row per relation: both column keys, the kind, then up to three
/// parameters (blank when the kind uses fewer).
pub fn write_relations_to<W: io::Write>(result: &MiningResult, out: W) -> Result<(), MiningError> {
    let mut writer = csv::WriterBuilder::new().from_writer(out);

    let header: Vec<String> = result
        .heads
        .iter()
        .map(|h| format!("{h}_1"))
        .chain(result.heads.iter().map(|h| format!("{h}_2")))
        .chain(["Correlation type".to_string()])
        .chain((1..=PARAM_COLUMNS).map(|i| format!("Parameter {i}")))
        .collect();
    writer.write_record(&header).map_err(csv_io)?;

    for rec in &result.relations {
        let mut record = rec.left.to_fields();
        record.extend(rec.right.to_fields());
        record.push(rec.relation.kind.as_str().to_string());
        for i in 0..PARAM_COLUMNS {
            record.push(rec.relation.param(i).map(|p| p.to_string()).unwrap_or_default());
        }
        writer.write_record(&record).map_err(csv_io)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_golden(path: &Path, result: &MiningResult) -> Result<(), MiningError> {
    let file = create(path)?;
    write_golden_to(result, io::BufWriter::new(file))
}

pub fn write_relations(path: &Path, result: &MiningResult) -> Result<(), MiningError> {
    let file = create(path)?;
    write_relations_to(result, io::BufWriter::new(file))
}

fn create(path: &Path) -> Result<std::fs::File, MiningError> {
    std::fs::File::create(path)
        .map_err(|e| MiningError::Io(format!("cannot create {}: {e}", path.display())))
}
