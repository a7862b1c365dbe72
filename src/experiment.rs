//! The experiment root, its global banks and the compile/emit entry points.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::{check_child_references, Block};
use crate::codegen::lower_experiment;
use crate::document::ExperimentDocument;
use crate::finalize::{render_json, write_document, EmitOptions};
use crate::run_if::BlockRef;
use crate::scope::ReferenceIndex;
use crate::session::Session;
use crate::transform::desugar_experiment;
use crate::validate::{validate_bank, warn_shared_permutation, ExperimentError, EXPERIMENT_NODE};

// ═══════════════════════════════════════════════════════════════════════════════
// BANKS
// ═══════════════════════════════════════════════════════════════════════════════

/// One value in a bank: a plain string or a record of named strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BankEntry {
    Text(String),
    Record(IndexMap<String, String>),
}

impl From<&str> for BankEntry {
    fn from(value: &str) -> Self {
        BankEntry::Text(value.to_string())
    }
}

impl From<String> for BankEntry {
    fn from(value: String) -> Self {
        BankEntry::Text(value)
    }
}

impl From<IndexMap<String, String>> for BankEntry {
    fn from(record: IndexMap<String, String>) -> Self {
        BankEntry::Record(record)
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for BankEntry {
    fn from(fields: [(K, V); N]) -> Self {
        BankEntry::Record(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

pub type Bank = Vec<BankEntry>;

/// Banks by name, in declaration order.
pub type Banks = IndexMap<String, Bank>;

/// Builds a bank from anything convertible to entries.
///
/// ```
/// use speriment_compiler::{bank, BankEntry};
///
/// let animals = bank(["cat", "dog"]);
/// assert_eq!(animals[1], BankEntry::Text("dog".into()));
/// ```
pub fn bank<I, T>(values: I) -> Bank
where
    I: IntoIterator<Item = T>,
    T: Into<BankEntry>,
{
    values.into_iter().map(Into::into).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPERIMENT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    pub blocks: Vec<Block>,
    pub exchangeable: Vec<BlockRef>,
    pub counterbalance: Vec<BlockRef>,
    pub treatments: Vec<Vec<BlockRef>>,
    pub banks: Banks,
}

impl Experiment {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            exchangeable: Vec::new(),
            counterbalance: Vec::new(),
            treatments: Vec::new(),
            banks: Banks::new(),
        }
    }

    pub fn exchangeable(mut self, blocks: Vec<BlockRef>) -> Self {
        self.exchangeable = blocks;
        self
    }

    pub fn counterbalance(mut self, blocks: Vec<BlockRef>) -> Self {
        self.counterbalance = blocks;
        self
    }

    pub fn treatments(mut self, treatments: Vec<Vec<BlockRef>>) -> Self {
        self.treatments = treatments;
        self
    }

    pub fn bank(mut self, name: impl Into<String>, bank: Bank) -> Self {
        self.banks.insert(name.into(), bank);
        self
    }

    /// Root-level rules: references name top-level blocks and banks are well formed.
    pub fn validate(&self) -> Result<(), ExperimentError> {
        check_child_references(
            EXPERIMENT_NODE,
            &self.blocks,
            &self.exchangeable,
            &self.counterbalance,
            &self.treatments,
        )?;
        if !self.counterbalance.is_empty() && !self.treatments.is_empty() {
            warn_shared_permutation(EXPERIMENT_NODE);
        }
        for (name, bank) in &self.banks {
            validate_bank(EXPERIMENT_NODE, name, bank)?;
        }
        Ok(())
    }

    /// Lowers a deep copy of the tree; `self` is left untouched and can be
    /// compiled again.
    ///
    /// `session` must be the one the tree was built with: it supplies ids for
    /// synthesized pages and options and the slots of sampling variables.
    pub fn compile(&self, session: &Session) -> Result<ExperimentDocument, ExperimentError> {
        let mut tree = self.clone();
        debug!(blocks = tree.blocks.len(), "desugaring experiment");
        desugar_experiment(&mut tree, session)?;

        debug!("indexing references");
        let index = ReferenceIndex::build(&tree, self)?;

        debug!("lowering to document");
        lower_experiment(&tree, &index, session)
    }

    pub fn to_json(&self, session: &Session) -> Result<String, ExperimentError> {
        self.to_json_with(session, &EmitOptions::default())
    }

    /// Compiles and renders the schema-checked JSON text.
    pub fn to_json_with(
        &self,
        session: &Session,
        options: &EmitOptions,
    ) -> Result<String, ExperimentError> {
        let document = self.compile(session)?;
        render_json(&document, options)
    }

    /// Writes `var <var_name> = <json>` to `path`.
    pub fn to_file(
        &self,
        session: &Session,
        path: impl AsRef<Path>,
        var_name: &str,
    ) -> Result<(), ExperimentError> {
        self.to_file_with(session, path, var_name, &EmitOptions::default())
    }

    pub fn to_file_with(
        &self,
        session: &Session,
        path: impl AsRef<Path>,
        var_name: &str,
        options: &EmitOptions,
    ) -> Result<(), ExperimentError> {
        let document = self.compile(session)?;
        write_document(&document, path.as_ref(), var_name, options)
    }
}
