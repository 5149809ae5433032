// ============================================================
// Layer 4 — StarSpace Embeddings
// ============================================================
// StarSpace is an external tool that learns word vectors
// jointly with label vectors. The trainer talks to it in
// three ways:
//
//   1. write_training_file  — notes → StarSpace input format
//        "<token> <token> ... __label__428.0 __label__401.9"
//   2. run_starspace        — invoke the external executable
//   3. load_embeddings      — read the TSV it produces
//        "<token>\t<v1>\t<v2>\t..."
//
// embedding_matrix() then lays the vectors out in vocabulary
// order so they can seed the model's embedding table.

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
    process::Command,
};

use crate::data::vocab::{Vocabulary, PAD_ID};
use crate::domain::note::ClinicalNote;

pub const LABEL_PREFIX: &str = "__label__";

/// Range for vectors of tokens StarSpace never saw.
const MISSING_INIT_RANGE: f32 = 0.1;

/// Write one StarSpace training line per note.
pub fn write_training_file(notes: &[ClinicalNote], path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Cannot create StarSpace file '{}'", path.display()))?;
    let mut out = BufWriter::new(file);

    for note in notes {
        let text: Vec<&str> = note.tokens().collect();
        write!(out, "{}", text.join(" "))?;
        for code in note.codes() {
            write!(out, " {LABEL_PREFIX}{code}")?;
        }
        writeln!(out)?;
    }
    out.flush()?;

    tracing::info!("Wrote {} StarSpace examples to '{}'", notes.len(), path.display());
    Ok(())
}

/// Run the StarSpace executable and wait for it to finish.
pub fn run_starspace(exec: &Path, args: &[String]) -> Result<()> {
    tracing::info!("Building StarSpace embeddings with '{}'. This will take a few minutes...", exec.display());

    let status = Command::new(exec)
        .args(args)
        .status()
        .with_context(|| format!("Cannot launch StarSpace '{}'", exec.display()))?;

    if !status.success() {
        bail!("StarSpace '{}' exited with {}", exec.display(), status);
    }
    Ok(())
}

/// Read a StarSpace TSV model. Label rows are skipped.
pub fn load_embeddings(path: &Path, dim: usize) -> Result<HashMap<String, Vec<f32>>> {
    let file = File::open(path)
        .with_context(|| format!("Cannot open embeddings '{}'", path.display()))?;

    let mut embeds = HashMap::new();

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let mut fields = line.split('\t');
        let Some(token) = fields.next().filter(|t| !t.is_empty()) else {
            continue;
        };
        if token.starts_with(LABEL_PREFIX) {
            continue;
        }

        let vector = fields
            .map(|v| v.trim().parse::<f32>())
            .collect::<Result<Vec<f32>, _>>()
            .with_context(|| {
                format!("Bad number in '{}' at line {}", path.display(), line_no + 1)
            })?;

        if vector.len() != dim {
            bail!(
                "Embedding for '{}' in '{}' has {} values, expected {}",
                token, path.display(), vector.len(), dim
            );
        }
        embeds.insert(token.to_string(), vector);
    }

    tracing::info!("Loaded {} StarSpace vectors", embeds.len());
    Ok(embeds)
}

/// Flat [vocab_len, dim] matrix in vocabulary order.
///
/// PAD stays zero; tokens without a StarSpace vector are drawn
/// uniformly from [-0.1, 0.1].
pub fn embedding_matrix(
    embeds: &HashMap<String, Vec<f32>>,
    vocab:  &Vocabulary,
    dim:    usize,
    seed:   u64,
) -> Vec<f32> {
    let mut rng    = StdRng::seed_from_u64(seed);
    let mut matrix = vec![0.0f32; vocab.len() * dim];
    let mut found  = 0usize;

    for (i, token) in vocab.tokens().iter().enumerate() {
        if i as u32 == PAD_ID {
            continue;
        }
        let row = &mut matrix[i * dim..(i + 1) * dim];
        match embeds.get(token) {
            Some(v) => {
                row.copy_from_slice(v);
                found += 1;
            }
            None => {
                for x in row.iter_mut() {
                    *x = rng.gen_range(-MISSING_INIT_RANGE..=MISSING_INIT_RANGE);
                }
            }
        }
    }

    tracing::info!(
        "StarSpace covers {}/{} vocabulary entries",
        found,
        vocab.len().saturating_sub(1),
    );
    matrix
}
