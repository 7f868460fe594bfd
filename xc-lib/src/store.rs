use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{Result, XcError};
use crate::types::RecordingRecord;

/// xeno-canto only serves mp3s.
pub const AUDIO_EXTENSION: &str = "mp3";
pub const METADATA_FILENAME: &str = "metadata.csv";

/// Sanitize a string for use in filenames.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect()
}

/// Create `dir` and any missing parents. Succeeds if it already exists.
pub fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    if dir.is_dir() {
        return Ok(dir.to_path_buf());
    }
    if dir.exists() {
        return Err(XcError::fs(
            dir,
            io::Error::new(io::ErrorKind::AlreadyExists, "path exists and is not a directory"),
        ));
    }
    fs::create_dir_all(dir).map_err(|e| XcError::fs(dir, e))?;
    tracing::debug!("Created new directory at {}", dir.display());
    Ok(dir.to_path_buf())
}

/// Path of the audio file for a recording id, e.g. `sounds/228435.mp3`.
pub fn audio_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.{AUDIO_EXTENSION}", sanitize_filename(id)))
}

/// Metadata columns: the union of all record keys in first-seen order.
///
/// Returns the header and whether every record had the same key set.
pub fn metadata_header(records: &[RecordingRecord]) -> (Vec<String>, bool) {
    let mut header: Vec<String> = Vec::new();
    let mut uniform = true;
    for (i, rec) in records.iter().enumerate() {
        if i > 0 && (rec.len() != header.len() || rec.keys().any(|k| !header.iter().any(|h| h == k))) {
            uniform = false;
        }
        for key in rec.keys() {
            if !header.iter().any(|h| h == key) {
                header.push(key.to_string());
            }
        }
    }
    (header, uniform)
}

/// Render a JSON value as a single CSV cell.
fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Write all records to `<dir>/metadata.csv`, one row per record.
pub fn write_metadata(dir: &Path, records: &[RecordingRecord]) -> Result<PathBuf> {
    if records.is_empty() {
        return Err(XcError::DataShape(
            "cannot derive metadata columns from an empty record set".into(),
        ));
    }

    let (header, uniform) = metadata_header(records);
    if !uniform {
        tracing::warn!(
            "Recordings have differing fields; metadata uses {} combined columns",
            header.len()
        );
    }

    let path = dir.join(METADATA_FILENAME);
    let mut writer = csv::Writer::from_path(&path).map_err(|e| XcError::fs(&path, e.into()))?;
    writer
        .write_record(&header)
        .map_err(|e| XcError::fs(&path, e.into()))?;
    for rec in records {
        let row = header.iter().map(|key| cell(rec.get(key)));
        writer
            .write_record(row)
            .map_err(|e| XcError::fs(&path, e.into()))?;
    }
    writer.flush().map_err(|e| XcError::fs(&path, e))?;

    tracing::info!("Wrote metadata for {} recordings to {}", records.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> RecordingRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("228435"), "228435");
        assert_eq!(sanitize_filename("../a/b:c"), ".._a_b_c");
    }

    #[test]
    fn test_audio_path_uses_id_and_mp3() {
        let p = audio_path(Path::new("sounds"), "228435");
        assert_eq!(p, Path::new("sounds").join("228435.mp3"));
    }

    #[test]
    fn test_ensure_dir_creates_nested_and_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b").join("c");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_ensure_dir_rejects_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("taken");
        fs::write(&file, b"x").unwrap();
        let err = ensure_dir(&file).unwrap_err();
        assert!(matches!(err, XcError::Filesystem { .. }));
    }

    #[test]
    fn test_header_is_first_record_keys_when_uniform() {
        let records = vec![
            record(r#"{"id":"1","gen":"Gallinago","sp":"gallinago"}"#),
            record(r#"{"id":"2","gen":"Gallinago","sp":"delicata"}"#),
        ];
        let (header, uniform) = metadata_header(&records);
        assert_eq!(header, vec!["id", "gen", "sp"]);
        assert!(uniform);
    }

    #[test]
    fn test_header_is_union_when_heterogeneous() {
        let records = vec![
            record(r#"{"id":"1","gen":"Gallinago"}"#),
            record(r#"{"id":"2","ssp":"faeroeensis","gen":"Gallinago"}"#),
        ];
        let (header, uniform) = metadata_header(&records);
        assert_eq!(header, vec!["id", "gen", "ssp"]);
        assert!(!uniform);
    }

    #[test]
    fn test_write_metadata_quotes_and_fills_gaps() {
        let tmp = tempfile::tempdir().unwrap();
        let records = vec![
            record(r#"{"id":"1","loc":"Lake, North shore","also":["Anas crecca"]}"#),
            record(r#"{"id":2,"loc":null}"#),
        ];
        let path = write_metadata(tmp.path(), &records).unwrap();
        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "id,loc,also");
        assert_eq!(lines[1], r#"1,"Lake, North shore","[""Anas crecca""]""#);
        assert_eq!(lines[2], "2,,");
    }

    #[test]
    fn test_write_metadata_rejects_empty_before_creating_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = write_metadata(tmp.path(), &[]).unwrap_err();
        assert!(matches!(err, XcError::DataShape(_)));
        assert!(!tmp.path().join(METADATA_FILENAME).exists());
    }
}
