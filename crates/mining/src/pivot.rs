use tracing::{debug, info};

use crate::config::PivotLayout;
use crate::error::MiningError;
use crate::model::{
    Cell, EntityKey, PivotTable, RawBatch, FIELD_SEPARATOR, KEY_MARKER, MISSING_TOKEN,
};

/// Fold a raw batch into `existing`, returning the updated table.
///
/// Instance identifiers not yet in the header become new columns (missing for
/// every existing row). Each raw row writes its data fields into the cell at
/// (entity key, instance); a later row for the same cell replaces an earlier
/// one, within the batch and across runs.
pub fn accumulate(
    existing: PivotTable,
    batch: &RawBatch,
    layout: &PivotLayout,
) -> Result<PivotTable, MiningError> {
    layout.validate()?;
    check_widths(batch, layout)?;
    check_tokens(batch, layout)?;

    let mut table = if existing.is_empty() {
        let key_names = layout.key_fields.iter().map(|&i| batch.header[i].clone()).collect();
        PivotTable::new(key_names, layout.data_fields.len())
    } else {
        check_layout(&existing, layout)?;
        existing
    };

    let known_instances = table.instances().len();
    let known_rows = table.rows().len();

    // Register instance columns first so every new row is created full width.
    let mut positions: Vec<usize> = Vec::with_capacity(batch.rows.len());
    for row in &batch.rows {
        positions.push(table.add_instance(&row[layout.instance_field]));
    }

    for (row, &instance) in batch.rows.iter().zip(&positions) {
        let key_fields: Vec<&str> = layout.key_fields.iter().map(|&i| row[i].as_str()).collect();
        let key = EntityKey::from_fields(&key_fields);
        table.set_cell(key, instance, data_cell(row, &layout.data_fields));
    }

    info!(
        rows = batch.rows.len(),
        new_instances = table.instances().len() - known_instances,
        new_entities = table.rows().len() - known_rows,
        entities = table.rows().len(),
        instances = table.instances().len(),
        "accumulated batch into pivot table"
    );
    Ok(table)
}

/// Data fields of one raw row. A field holding the missing token is missing.
fn data_cell(row: &[String], data_fields: &[usize]) -> Cell {
    data_fields
        .iter()
        .map(|&i| {
            let v = &row[i];
            if v == MISSING_TOKEN {
                None
            } else {
                Some(v.clone())
            }
        })
        .collect()
}

/// Header and every row must reach the highest configured position.
fn check_widths(batch: &RawBatch, layout: &PivotLayout) -> Result<(), MiningError> {
    let needed = layout.max_index();
    let key_max = layout.key_fields.iter().copied().max().unwrap_or(0);
    if batch.header.len() <= key_max {
        return Err(MiningError::FieldIndex {
            row: 0,
            index: key_max,
            width: batch.header.len(),
        });
    }
    for (i, row) in batch.rows.iter().enumerate() {
        if row.len() <= needed {
            return Err(MiningError::FieldIndex {
                row: i + 1,
                index: needed,
                width: row.len(),
            });
        }
    }
    debug!(rows = batch.rows.len(), "raw batch widths checked");
    Ok(())
}

/// Pivot cells are split on the field separator and header columns starting
/// with the key marker are read back as keys, so neither may come from a batch.
fn check_tokens(batch: &RawBatch, layout: &PivotLayout) -> Result<(), MiningError> {
    for (i, row) in batch.rows.iter().enumerate() {
        let instance = &row[layout.instance_field];
        if instance.starts_with(KEY_MARKER) {
            return Err(MiningError::ReservedToken {
                row: i + 1,
                value: instance.clone(),
                reason: "is an instance id starting with the key marker \"K_\"",
            });
        }
        if let Some(value) = layout
            .data_fields
            .iter()
            .map(|&f| &row[f])
            .find(|v| v.contains(FIELD_SEPARATOR))
        {
            return Err(MiningError::ReservedToken {
                row: i + 1,
                value: value.clone(),
                reason: "contains the cell separator \"|||\"",
            });
        }
    }
    Ok(())
}

fn check_layout(table: &PivotTable, layout: &PivotLayout) -> Result<(), MiningError> {
    if table.key_names().len() != layout.key_fields.len() {
        return Err(MiningError::LayoutMismatch {
            what: "key",
            pivot: table.key_names().len(),
            layout: layout.key_fields.len(),
        });
    }
    if table.data_width() != layout.data_fields.len() {
        return Err(MiningError::LayoutMismatch {
            what: "data",
            pivot: table.data_width(),
            layout: layout.data_fields.len(),
        });
    }
    Ok(())
}
