// ============================================================
// Layer 4 — Note Loader
// ============================================================
// Reads one data split from a JSON Lines file.
//
// The preprocessing step writes every admission as one line:
//
//   {"id": "100001",
//    "sentences": [["chest", "pain"], ["history", "of", "chf"]],
//    "labels": "428.0 584.9"}
//
// Blank lines are ignored. Anything else that fails to parse
// stops the run: a half-loaded training set silently changes
// the vocabulary and the label map, so bad input is an error
// naming the file and the line.

use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use crate::domain::note::ClinicalNote;
use crate::domain::traits::NoteSource;

/// Loads all notes from a single .jsonl file.
pub struct JsonlNoteLoader {
    path: PathBuf,
}

impl JsonlNoteLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl NoteSource for JsonlNoteLoader {
    fn load_all(&self) -> Result<Vec<ClinicalNote>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Cannot open note file '{}'", self.path.display()))?;

        let mut notes = Vec::new();

        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| {
                format!("Cannot read '{}' at line {}", self.path.display(), line_no + 1)
            })?;

            if line.trim().is_empty() {
                continue;
            }

            let note: ClinicalNote = serde_json::from_str(&line).with_context(|| {
                format!("Malformed note in '{}' at line {}", self.path.display(), line_no + 1)
            })?;
            notes.push(note);
        }

        tracing::info!("Loaded {} notes from '{}'", notes.len(), self.path.display());
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_lines(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
        f
    }

    #[test]
    fn test_loads_notes_and_skips_blank_lines() {
        let f = write_lines(&[
            r#"{"id":"1","sentences":[["a","b"],["c"]],"labels":"401.9"}"#,
            "",
            r#"{"id":"2","sentences":[["d"]],"labels":"428.0 401.9"}"#,
        ]);
        let notes = JsonlNoteLoader::new(f.path()).load_all().unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].sentences[0], vec!["a", "b"]);
        assert_eq!(notes[1].primary_code(), Some("428.0"));
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let f = write_lines(&[
            r#"{"id":"1","sentences":[["a"]],"labels":"401.9"}"#,
            r#"{"id":"2","sentences":"#,
        ]);
        let err = JsonlNoteLoader::new(f.path()).load_all().unwrap_err();
        assert!(format!("{err}").contains("line 2"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = JsonlNoteLoader::new(dir.path().join("nope.jsonl"));
        assert!(loader.load_all().is_err());
    }
}
