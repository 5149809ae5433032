// ============================================================
// Layer 2 — StarspaceUseCase
// ============================================================
// Prepares StarSpace input without training a classifier:
// writes the training notes in StarSpace format and, when an
// executable is given, runs it. The resulting .tsv is what
// `train --use-starspace --embed-path …` reads.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::data::{loader::JsonlNoteLoader, starspace};
use crate::domain::traits::NoteSource;

pub struct StarspaceUseCase {
    train_path: String,
    output:     PathBuf,
    exec:       Option<PathBuf>,
    exec_args:  Vec<String>,
}

impl StarspaceUseCase {
    pub fn new(train_path: String, output: PathBuf, exec: Option<PathBuf>, exec_args: Vec<String>) -> Self {
        Self { train_path, output, exec, exec_args }
    }

    /// Returns the number of notes written.
    pub fn execute(&self) -> Result<usize> {
        let notes = JsonlNoteLoader::new(&self.train_path).load_all()?;
        if notes.is_empty() {
            bail!("No notes in '{}'", self.train_path);
        }
        starspace::write_training_file(&notes, &self.output)?;

        if let Some(exec) = &self.exec {
            starspace::run_starspace(exec, &self.exec_args)?;
        }
        Ok(notes.len())
    }
}
