// Raw batch import (CSV/TSV with a header row)

use std::path::Path;

use pcorr_mining::{MiningError, RawBatch};
use tracing::debug;

/// Delimiters tried when none is given, in tie-break order.
const CANDIDATES: [u8; 4] = [b'\t', b';', b',', b'|'];

/// Records inspected when guessing the delimiter.
const SAMPLE_RECORDS: usize = 10;

/// Read a raw batch. With no explicit delimiter the most consistent one among
/// tab, semicolon, comma and pipe is used.
pub fn read_batch(path: &Path, delimiter: Option<u8>) -> Result<RawBatch, MiningError> {
    let content = read_text(path)?;
    let delimiter = delimiter.unwrap_or_else(|| sniff_delimiter(&content));
    debug!(path = %path.display(), delimiter = %(delimiter as char), "reading raw batch");
    parse_batch(&content, delimiter)
        .map_err(|e| MiningError::Io(format!("{}: {e}", path.display())))
}

/// Headerless, ragged-tolerant reader shared by batch and pivot parsing.
pub(crate) fn record_reader(content: &str, delimiter: u8) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes())
}

/// Parse batch text: first record is the header, every other record a row.
/// Blank lines are skipped; rows may be ragged (width is checked by the
/// accumulator against the layout).
pub fn parse_batch(content: &str, delimiter: u8) -> Result<RawBatch, String> {
    let mut reader = record_reader(content, delimiter);
    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record.map_err(|e| e.to_string())?,
        None => return Ok(RawBatch::default()),
    };

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|e| e.to_string())?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawBatch {
        header: header.iter().map(str::to_string).collect(),
        rows,
    })
}

/// Guess the field delimiter from the leading records.
///
/// A candidate scores the number of sampled records as wide as the first one,
/// times that width. A candidate that leaves the first record whole is out.
/// Comma is the fallback.
pub fn sniff_delimiter(content: &str) -> u8 {
    let mut best: Option<(usize, u8)> = None;
    for delimiter in CANDIDATES {
        let Some(score) = delimiter_score(content, delimiter) else {
            continue;
        };
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, delimiter));
        }
    }
    best.map_or(b',', |(_, delimiter)| delimiter)
}

fn delimiter_score(content: &str, delimiter: u8) -> Option<usize> {
    let widths: Vec<usize> = record_reader(content, delimiter)
        .records()
        .take(SAMPLE_RECORDS)
        .map(|r| r.map_or(0, |r| r.len()))
        .collect();
    let first = *widths.first()?;
    if first < 2 {
        return None;
    }
    Some(widths.iter().filter(|&&w| w == first).count() * first)
}

/// Whole file as text: UTF-8 with any BOM removed, or Windows-1252 when the
/// bytes are not valid UTF-8 (spreadsheet exports).
pub fn read_text(path: &Path) -> Result<String, MiningError> {
    let bytes = std::fs::read(path)
        .map_err(|e| MiningError::Io(format!("cannot read {}: {e}", path.display())))?;
    let (text, malformed) = encoding_rs::UTF_8.decode_with_bom_removal(&bytes);
    if !malformed {
        return Ok(text.into_owned());
    }
    debug!(path = %path.display(), "not UTF-8, decoding as Windows-1252");
    let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(&bytes);
    Ok(text.into_owned())
}
