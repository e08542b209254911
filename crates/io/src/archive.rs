// Zip packaging of run outputs

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use pcorr_mining::MiningError;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Pack `files` (stored under their file names) into `zip_path`, then remove
/// the originals. Nothing is removed unless the archive was completed.
pub fn archive_and_remove(zip_path: &Path, files: &[PathBuf]) -> Result<(), MiningError> {
    let file = File::create(zip_path)
        .map_err(|e| MiningError::Io(format!("cannot create {}: {e}", zip_path.display())))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for path in files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MiningError::Io(format!("no file name in {}", path.display())))?;
        let mut source = File::open(path)
            .map_err(|e| MiningError::Io(format!("cannot open {}: {e}", path.display())))?;
        zip.start_file(name, options).map_err(zip_io)?;
        io::copy(&mut source, &mut zip)?;
    }
    zip.finish().map_err(zip_io)?;

    for path in files {
        std::fs::remove_file(path)
            .map_err(|e| MiningError::Io(format!("cannot remove {}: {e}", path.display())))?;
    }
    info!(archive = %zip_path.display(), files = files.len(), "outputs archived");
    Ok(())
}

fn zip_io(e: zip::result::ZipError) -> MiningError {
    MiningError::Io(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn archive_holds_files_and_originals_are_gone() {
        let dir = tempfile::tempdir().unwrap();
        let golden = dir.path().join("golden_42.csv");
        let rels = dir.path().join("correlations_42.csv");
        std::fs::write(&golden, "K_host,Data Index,Golden value,conf_prob\n").unwrap();
        std::fs::write(&rels, "x\n").unwrap();

        let zip_path = dir.path().join("correlation_data_42.zip");
        archive_and_remove(&zip_path, &[golden.clone(), rels.clone()]).unwrap();
        assert!(!golden.exists());
        assert!(!rels.exists());

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        let mut body = String::new();
        archive
            .by_name("golden_42.csv")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert!(body.starts_with("K_host,"));
    }

    #[test]
    fn missing_input_keeps_nothing_removed() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("golden_1.csv");
        std::fs::write(&present, "a\n").unwrap();
        let absent = dir.path().join("correlations_1.csv");

        let err = archive_and_remove(&dir.path().join("out.zip"), &[present.clone(), absent]);
        assert!(matches!(err, Err(MiningError::Io(_))));
        assert!(present.exists());
    }
}
