// Pivot table persistence
//
// Header: key names prefixed `K_`, then instance identifiers.
// Rows: key components, then one cell per instance with the data-field slots
// joined by `|||` and missing slots written as `inf`.

use std::io;
use std::path::Path;

use pcorr_mining::model::{Cell, PivotRow, FIELD_SEPARATOR, KEY_MARKER, MISSING_TOKEN};
use pcorr_mining::{EntityKey, MiningError, PivotTable};
use tracing::{debug, warn};

use crate::batch::{read_text, record_reader};

/// Load the persisted pivot table for accumulation.
///
/// An absent file is an empty table. A file that cannot be interpreted is
/// logged and replaced by an empty table. Other IO errors propagate.
pub fn load_or_empty(path: &Path) -> Result<PivotTable, MiningError> {
    match std::fs::metadata(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no pivot table yet, starting empty");
            return Ok(PivotTable::default());
        }
        Err(e) => {
            return Err(MiningError::Io(format!("cannot stat {}: {e}", path.display())));
        }
        Ok(_) => {}
    }

    match read_pivot(path) {
        Ok(table) => Ok(table),
        Err(MiningError::PivotFormat(msg)) => {
            warn!(path = %path.display(), error = %msg, "unreadable pivot table, starting empty");
            Ok(PivotTable::default())
        }
        Err(e) => Err(e),
    }
}

/// Read a pivot table; every structural problem is a `PivotFormat` error.
pub fn read_pivot(path: &Path) -> Result<PivotTable, MiningError> {
    let content = read_text(path)?;
    parse_pivot(&content)
}

pub fn parse_pivot(content: &str) -> Result<PivotTable, MiningError> {
    let mut reader = record_reader(content, b',');
    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record.map_err(|e| MiningError::PivotFormat(e.to_string()))?,
        None => return Ok(PivotTable::default()),
    };
    let key_count = header.iter().take_while(|h| h.starts_with(KEY_MARKER)).count();
    if key_count == 0 {
        return Err(MiningError::PivotFormat(format!(
            "header has no {KEY_MARKER}-prefixed key columns"
        )));
    }
    let key_names: Vec<String> = header
        .iter()
        .take(key_count)
        .map(|h| h[KEY_MARKER.len()..].to_string())
        .collect();
    let instances: Vec<String> = header.iter().skip(key_count).map(str::to_string).collect();

    let mut data_width = None;
    let mut rows = Vec::new();
    for (i, record) in records.enumerate() {
        let record = record.map_err(|e| MiningError::PivotFormat(e.to_string()))?;
        if record.len() != key_count + instances.len() {
            return Err(MiningError::PivotFormat(format!(
                "line {}: {} field(s), header has {}",
                i + 2,
                record.len(),
                key_count + instances.len()
            )));
        }
        let key_fields: Vec<&str> = record.iter().take(key_count).collect();
        let cells: Vec<Cell> = record.iter().skip(key_count).map(parse_cell).collect();
        // The widest cell sets the width; `from_parts` rejects any disagreement.
        if let Some(w) = cells.iter().map(Vec::len).max() {
            data_width = Some(data_width.map_or(w, |d: usize| d.max(w)));
        }
        rows.push(PivotRow { key: EntityKey::from_fields(&key_fields), cells });
    }

    PivotTable::from_parts(key_names, instances, data_width.unwrap_or(0), rows)
}

fn parse_cell(field: &str) -> Cell {
    field
        .split(FIELD_SEPARATOR)
        .map(|slot| if slot == MISSING_TOKEN { None } else { Some(slot.to_string()) })
        .collect()
}

fn format_cell(cell: &Cell) -> String {
    cell.iter()
        .map(|slot| slot.as_deref().unwrap_or(MISSING_TOKEN))
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

/// Serialize a pivot table to CSV text.
pub fn write_pivot_to<W: io::Write>(table: &PivotTable, out: W) -> Result<(), MiningError> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(out);

    let header: Vec<String> = table
        .key_names()
        .iter()
        .map(|k| format!("{KEY_MARKER}{k}"))
        .chain(table.instances().iter().cloned())
        .collect();
    writer.write_record(&header).map_err(csv_io)?;

    for row in table.rows() {
        let record: Vec<String> = row
            .key
            .to_strings()
            .into_iter()
            .chain(row.cells.iter().map(format_cell))
            .collect();
        writer.write_record(&record).map_err(csv_io)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the pivot table, replacing `path` only once the new file is complete.
pub fn write_pivot(path: &Path, table: &PivotTable) -> Result<(), MiningError> {
    let tmp_path = path.with_extension("csv.tmp");
    let file = std::fs::File::create(&tmp_path)
        .map_err(|e| MiningError::Io(format!("cannot create {}: {e}", tmp_path.display())))?;
    write_pivot_to(table, io::BufWriter::new(file))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| MiningError::Io(format!("cannot replace {}: {e}", path.display())))?;
    debug!(path = %path.display(), rows = table.rows().len(), "pivot table written");
    Ok(())
}

pub(crate) fn csv_io(e: csv::Error) -> MiningError {
    MiningError::Io(e.to_string())
}
