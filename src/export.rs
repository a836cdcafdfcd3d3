use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Name of the single entry inside an exported archive.
pub const ENTRY_NAME: &str = "index.html";

/// Short random id naming a session and its exported archive.
pub fn new_session_id() -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(8)
        .collect::<String>()
        .to_lowercase()
}

pub fn archive_name(session_id: &str) -> String {
    format!("techcode-{}.zip", session_id)
}

/// Write `code` as `index.html` into `<dir>/techcode-<session_id>.zip`.
pub fn export_zip(code: &str, dir: &Path, session_id: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating export directory {}", dir.display()))?;
    let path = dir.join(archive_name(session_id));
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;

    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file(ENTRY_NAME, options)?;
    zip.write_all(code.as_bytes())?;
    zip.finish()?;

    tracing::info!(path = %path.display(), bytes = code.len(), "exported site");
    Ok(path)
}

/// Read the `index.html` entry back out of an exported archive.
pub fn read_exported(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut archive = ZipArchive::new(file)?;
    let mut entry = archive
        .by_name(ENTRY_NAME)
        .with_context(|| format!("{} has no {}", path.display(), ENTRY_NAME))?;
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn exported_archive_holds_exact_code() {
        let dir = tempdir().unwrap();
        let code = "<!DOCTYPE html>\n<html><body>caf\u{e9} \u{1f600}</body></html>";

        let path = export_zip(code, dir.path(), "abc123").unwrap();
        assert_eq!(path.file_name().unwrap(), "techcode-abc123.zip");
        assert_eq!(read_exported(&path).unwrap(), code);
    }

    #[test]
    fn archive_has_a_single_entry() {
        let dir = tempdir().unwrap();
        let path = export_zip("<p>x</p>", &dir.path().join("out"), "s").unwrap();

        let archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.file_names().collect::<Vec<_>>(), vec![ENTRY_NAME]);
    }

    #[test]
    fn session_ids_are_short_and_lowercase() {
        let id = new_session_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
