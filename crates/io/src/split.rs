// Split a flat export into one CSV per entity

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use pcorr_mining::{MiningError, RawBatch};
use tracing::info;

use crate::batch::read_batch;
use crate::pivot::csv_io;

/// One written partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitFile {
    pub key: Vec<String>,
    pub path: PathBuf,
    pub rows: usize,
}

/// Read `input` and partition it with [`split_batch`].
pub fn split_file(
    input: &Path,
    dest: &Path,
    key_fields: &[usize],
    delimiter: Option<u8>,
) -> Result<Vec<SplitFile>, MiningError> {
    let batch = read_batch(input, delimiter)?;
    let written = split_batch(&batch, dest, key_fields)?;
    info!(input = %input.display(), files = written.len(), "split export by key");
    Ok(written)
}

/// Partition a batch by the values at `key_fields`. Each distinct key tuple
/// gets `<dest>/<key parts joined by '_'>.csv` with the batch header first.
/// A tuple whose name is already taken (compared case-insensitively) gets a
/// `~2`, `~3`, ... suffix. Files are listed in first-seen key order.
pub fn split_batch(
    batch: &RawBatch,
    dest: &Path,
    key_fields: &[usize],
) -> Result<Vec<SplitFile>, MiningError> {
    if key_fields.is_empty() {
        return Err(MiningError::ConfigValidation(
            "at least one key field is required".into(),
        ));
    }
    let groups = group_rows(batch, key_fields)?;

    std::fs::create_dir_all(dest)
        .map_err(|e| MiningError::Io(format!("cannot create {}: {e}", dest.display())))?;

    let mut taken: HashSet<String> = HashSet::with_capacity(groups.len());
    let mut written = Vec::with_capacity(groups.len());
    for (key, rows) in groups {
        let stem = unique_stem(file_stem(&key), &mut taken);
        let path = dest.join(format!("{stem}.csv"));
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(&path)
            .map_err(csv_io)?;
        writer.write_record(&batch.header).map_err(csv_io)?;
        for row in &rows {
            writer.write_record(*row).map_err(csv_io)?;
        }
        writer.flush()?;
        written.push(SplitFile { key, path, rows: rows.len() });
    }
    Ok(written)
}

type Group<'a> = (Vec<String>, Vec<&'a Vec<String>>);

fn group_rows<'a>(batch: &'a RawBatch, key_fields: &[usize]) -> Result<Vec<Group<'a>>, MiningError> {
    let needed = key_fields.iter().copied().max().unwrap_or(0);
    let mut index: HashMap<Vec<String>, usize> = HashMap::new();
    let mut groups: Vec<Group<'a>> = Vec::new();

    for (i, row) in batch.rows.iter().enumerate() {
        if row.len() <= needed {
            return Err(MiningError::FieldIndex { row: i + 1, index: needed, width: row.len() });
        }
        let key: Vec<String> = key_fields.iter().map(|&k| row[k].clone()).collect();
        match index.get(&key) {
            Some(&g) => groups[g].1.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![row]));
            }
        }
    }
    Ok(groups)
}

/// Key parts joined by `_`, with characters unsafe in file names replaced.
fn file_stem(key: &[String]) -> String {
    let joined = key.join("_");
    let stem: String = joined
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        format!("_{stem}")
    } else {
        stem
    }
}

fn unique_stem(stem: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(stem.to_lowercase()) {
        return stem;
    }
    let mut n = 2usize;
    loop {
        let candidate = format!("{stem}~{n}");
        if taken.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}
