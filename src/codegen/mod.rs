//! Code generation
//!
//! This module provides the emitter backend contract and the output writer.
//! A backend turns one enriched table into a record artifact and a
//! data-access artifact; the writer puts them in the output directory.
//!
//! The output directory belongs to the generator. Files are overwritten on
//! every run and never merged, so manual edits to generated files are lost
//! at the next regeneration.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

use crate::config::FeatureToggles;
use crate::keyshape::TablePlan;
use crate::prelude::{DaoforgeError, TableModel};

pub mod python;

pub use python::PythonGenerator;

/// Configuration for code generation
#[derive(Debug, Clone)]
pub struct CodeGenConfig {
    /// Output directory
    pub output_path: PathBuf,
}

impl CodeGenConfig {
    pub fn new(output_path: PathBuf) -> Self {
        Self { output_path }
    }
}

/// One rendered file, named relative to the output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub contents: String,
}

/// The two artifacts emitted for a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableArtifacts {
    pub record: Artifact,
    pub dao: Artifact,
}

/// Names a backend derives for a table, used to build package-level files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub table: String,
    pub record_module: String,
    pub record_class: String,
    pub dao_module: String,
    pub dao_class: String,
}

/// Trait for language-specific emitter backends
///
/// Rendering must be deterministic: the same model and plan always produce
/// byte-identical text.
pub trait CodeGenerator {
    /// Target language, for logging
    fn language(&self) -> &'static str;

    /// Derived names for a table
    fn summarize(&self, table: &TableModel) -> TableSummary;

    /// Render the record and data-access artifacts of one table
    fn render_table(
        &self,
        table: &TableModel,
        plan: &TablePlan,
        features: &FeatureToggles,
    ) -> Result<TableArtifacts, DaoforgeError>;

    /// Render files shared by every table (runtime support, package index)
    fn render_support(&self, tables: &[TableSummary]) -> Result<Vec<Artifact>, DaoforgeError>;
}

/// Writes artifacts into the output directory
#[derive(Debug)]
pub struct OutputWriter {
    dir: PathBuf,
    written: usize,
}

impl OutputWriter {
    /// Create the output directory if needed
    pub fn create(dir: &Path) -> Result<Self, DaoforgeError> {
        fs::create_dir_all(dir).map_err(|e| DaoforgeError::output(dir, e))?;
        debug!(path = ?dir, "Prepared output directory");
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    /// Number of artifacts written so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn write(&mut self, artifact: &Artifact) -> Result<PathBuf, DaoforgeError> {
        let staged = self.stage(artifact)?;
        let path = self.commit(staged)?;
        self.written += 1;
        Ok(path)
    }

    /// Write both artifacts of a table, or neither
    ///
    /// Both files are staged next to their targets and only persisted once
    /// both are fully written. If the data-access file cannot be put in
    /// place, the record file is returned to its previous state.
    pub fn write_pair(&mut self, artifacts: &TableArtifacts) -> Result<(), DaoforgeError> {
        let record = self.stage(&artifacts.record)?;
        let dao = self.stage(&artifacts.dao)?;

        let record_path = record.target.clone();
        let previous = match fs::read(&record_path) {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(DaoforgeError::output(&record_path, e)),
        };

        self.commit(record)?;
        if let Err(e) = self.commit(dao) {
            restore(&record_path, previous);
            return Err(e);
        }
        self.written += 2;
        Ok(())
    }

    fn stage(&self, artifact: &Artifact) -> Result<Staged, DaoforgeError> {
        let target = self.dir.join(&artifact.file_name);
        let parent = target.parent().unwrap_or(&self.dir);
        let mut temp = NamedTempFile::new_in(parent).map_err(|e| DaoforgeError::output(parent, e))?;
        temp.write_all(artifact.contents.as_bytes())
            .map_err(|e| DaoforgeError::output(&target, e))?;
        trace!(path = ?temp.path(), bytes = artifact.contents.len(), "Staged artifact");
        Ok(Staged { temp, target })
    }

    fn commit(&self, staged: Staged) -> Result<PathBuf, DaoforgeError> {
        staged
            .temp
            .persist(&staged.target)
            .map_err(|e| DaoforgeError::output(&staged.target, e.error))?;
        debug!(path = ?staged.target, "Wrote artifact");
        Ok(staged.target)
    }
}

/// A fully written temp file awaiting its target; dropped means deleted
struct Staged {
    temp: NamedTempFile,
    target: PathBuf,
}

fn restore(path: &Path, previous: Option<Vec<u8>>) {
    let result = match previous {
        Some(contents) => fs::write(path, contents),
        None => fs::remove_file(path),
    };
    match result {
        Ok(()) => debug!(path = ?path, "Restored record after failed pair write"),
        Err(e) => warn!(path = ?path, error = %e, "Could not restore record after failed pair write"),
    }
}
