//! End-to-end file diff pipeline.
//!
//! Ties the stages together: read and parse both documents, run the
//! matching engine, and render the edit script. When the documents turn
//! out to be identical no output file is created at all, so callers can
//! rely on the file's existence as a difference signal.

use std::fs;
use std::io::BufWriter;
use std::path::Path;
use std::time::Instant;

use tracing::info;

use crate::diff::{DiffConfig, DiffEngine};
use crate::error::{Result, XmlDiffError};
use crate::parser::TreeParser;
use crate::writer::DiffWriter;

/// Outcome of a full pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOutcome {
    /// The documents are structurally identical. No output was written.
    Identical,
    /// Differences were found and the edit script was written.
    Different,
}

impl DiffOutcome {
    pub fn is_different(self) -> bool {
        matches!(self, DiffOutcome::Different)
    }
}

/// Diff two XML files and write the edit script to `output`.
pub fn diff_paths(
    input1: impl AsRef<Path>,
    input2: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: DiffConfig,
) -> Result<DiffOutcome> {
    let (input1, input2, output) = (input1.as_ref(), input2.as_ref(), output.as_ref());
    let engine = DiffEngine::with_config(config)?;
    let parser = TreeParser::with_max_depth(engine.config().max_depth);

    let started = Instant::now();
    let mut left = parser.parse_file(input1)?;
    let mut right = parser.parse_file(input2)?;
    let parsed = Instant::now();
    info!(
        elapsed_ms = parsed.duration_since(started).as_millis() as u64,
        left_nodes = left.node_count(),
        right_nodes = right.node_count(),
        "documents parsed"
    );

    let changed = engine.diff(&mut left, &mut right)?;
    let matched = Instant::now();
    info!(
        elapsed_ms = matched.duration_since(parsed).as_millis() as u64,
        changed,
        "trees matched"
    );
    if !changed {
        return Ok(DiffOutcome::Identical);
    }

    // The preamble before the root tag is copied verbatim from the
    // left document.
    let raw1 = fs::read_to_string(input1).map_err(|e| XmlDiffError::io(input1, e))?;
    let file = fs::File::create(output).map_err(|e| XmlDiffError::io(output, e))?;
    DiffWriter::new(&left, &right, BufWriter::new(file)).write_script(&raw1)?;
    info!(
        elapsed_ms = matched.elapsed().as_millis() as u64,
        output = %output.display(),
        "edit script written"
    );
    Ok(DiffOutcome::Different)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_doc(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_identical_documents_write_no_output() {
        let dir = TempDir::new().unwrap();
        let a = write_doc(&dir, "a.xml", "<r><x>1</x><y>2</y></r>");
        let b = write_doc(&dir, "b.xml", "<r><y>2</y><x>1</x></r>");
        let out = dir.path().join("out.xml");

        let outcome = diff_paths(&a, &b, &out, DiffConfig::default()).unwrap();
        assert_eq!(outcome, DiffOutcome::Identical);
        assert!(!out.exists());
    }

    #[test]
    fn test_different_documents_write_script() {
        let dir = TempDir::new().unwrap();
        let a = write_doc(&dir, "a.xml", "<r><x>1</x></r>");
        let b = write_doc(&dir, "b.xml", "<r><x>2</x></r>");
        let out = dir.path().join("out.xml");

        let outcome = diff_paths(&a, &b, &out, DiffConfig::default()).unwrap();
        assert!(outcome.is_different());
        let script = fs::read_to_string(&out).unwrap();
        assert!(script.contains("<?UPDATE FROM \"1\"?>"), "got: {script}");
    }

    #[test]
    fn test_missing_input_is_io_error() {
        let dir = TempDir::new().unwrap();
        let b = write_doc(&dir, "b.xml", "<r/>");
        let out = dir.path().join("out.xml");

        let err = diff_paths(dir.path().join("absent.xml"), &b, &out, DiffConfig::default())
            .unwrap_err();
        assert!(matches!(err, XmlDiffError::Io { .. }), "got: {err:?}");
    }

    #[test]
    fn test_malformed_input_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let a = write_doc(&dir, "a.xml", "<r><x></r>");
        let b = write_doc(&dir, "b.xml", "<r/>");
        let out = dir.path().join("out.xml");

        let err = diff_paths(&a, &b, &out, DiffConfig::default()).unwrap_err();
        assert!(matches!(err, XmlDiffError::Parse { .. }), "got: {err:?}");
    }
}
