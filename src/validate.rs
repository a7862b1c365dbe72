//! Structural rules for experiment trees and the error taxonomy they report.
//!
//! Every rule is fatal: the first violation aborts compilation and names the
//! offending node by identifier (`experiment` for the root). The only
//! non-fatal check is the counterbalance/treatments co-occurrence, which logs
//! a warning.

use std::collections::BTreeSet;

use regex::Regex;
use thiserror::Error;
use tracing::warn;

use crate::experiment::{Bank, BankEntry};
use crate::scope::BankUsage;

/// Node name used in errors raised against the experiment root.
pub const EXPERIMENT_NODE: &str = "experiment";

// ═══════════════════════════════════════════════════════════════════════════════
// INVARIANT CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const INV_STRUCTURE: &str = "SPR-STRUCTURE";
pub const INV_MISSING_ATTRIBUTE: &str = "SPR-MISSING-ATTRIBUTE";
pub const INV_IMBALANCE: &str = "SPR-IMBALANCE";
pub const INV_BANK_SIZE: &str = "SPR-BANK-SIZE";
pub const INV_REPLACEMENT_POLICY: &str = "SPR-REPLACEMENT-POLICY";
pub const INV_SCHEMA_MISMATCH: &str = "SPR-BANK-SCHEMA";
pub const INV_UNKNOWN_FIELD: &str = "SPR-UNKNOWN-FIELD";
pub const INV_TYPE: &str = "SPR-TYPE";
pub const INV_LENGTH_MISMATCH: &str = "SPR-LENGTH-MISMATCH";
pub const INV_UNSUPPORTED_ARITY: &str = "SPR-UNSUPPORTED-ARITY";
pub const INV_AMBIGUOUS_REFERENCE: &str = "SPR-AMBIGUOUS-REFERENCE";
pub const INV_POLICY: &str = "SPR-POLICY";
pub const INV_INVALID_COMBINATION: &str = "SPR-INVALID-COMBINATION";
pub const INV_SCHEMA_VALIDATION: &str = "SPR-SCHEMA";

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        INV_STRUCTURE => "Mutually exclusive fields are set exactly as often as the node kind allows.",
        INV_MISSING_ATTRIBUTE => "Every attribute a policy depends on is present, and every reference names a node in the tree.",
        INV_IMBALANCE => "Balanced designs present every condition equally often.",
        INV_BANK_SIZE => "A bank holds enough values for every distinct sample drawn without replacement.",
        INV_REPLACEMENT_POLICY => "All samples from one bank follow the same replacement policy.",
        INV_SCHEMA_MISMATCH => "A bank is non-empty and holds only strings or only records with one shared field set.",
        INV_UNKNOWN_FIELD => "Samples from record banks name a field every record carries.",
        INV_TYPE => "Answer checks are booleans for choices and regular expressions for text boxes.",
        INV_LENGTH_MISMATCH => "Every option has exactly one key binding.",
        INV_UNSUPPORTED_ARITY => "Default key bindings apply to two-option pages only.",
        INV_AMBIGUOUS_REFERENCE => "A conditional guard keyed on an item observes exactly one page.",
        INV_POLICY => "Ordering policies are only combined in ways the runner can honor.",
        INV_INVALID_COMBINATION => "A sample placeholder carries at most one of variable, not_variable and with_replacement.",
        INV_SCHEMA_VALIDATION => "The emitted document conforms to the runner's schema.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPERIMENT ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("[SPR-STRUCTURE] {node}: {message}")]
    Structure { node: String, message: String },

    #[error("[SPR-MISSING-ATTRIBUTE] {node}: {message}")]
    MissingAttribute { node: String, message: String },

    #[error("[SPR-IMBALANCE] {node}: {message}")]
    Imbalance { node: String, message: String },

    #[error("[SPR-BANK-SIZE] {node}: {message}")]
    InsufficientBankSize { node: String, message: String },

    #[error("[SPR-REPLACEMENT-POLICY] {node}: {message}")]
    InconsistentReplacementPolicy { node: String, message: String },

    #[error("[SPR-BANK-SCHEMA] {node}: {message}")]
    SchemaMismatch { node: String, message: String },

    #[error("[SPR-UNKNOWN-FIELD] {node}: {message}")]
    UnknownField { node: String, message: String },

    #[error("[SPR-TYPE] {node}: {message}")]
    Type { node: String, message: String },

    #[error("[SPR-LENGTH-MISMATCH] {node}: {message}")]
    LengthMismatch { node: String, message: String },

    #[error("[SPR-UNSUPPORTED-ARITY] {node}: {message}")]
    UnsupportedArity { node: String, message: String },

    #[error("[SPR-AMBIGUOUS-REFERENCE] {node}: {message}")]
    AmbiguousReference { node: String, message: String },

    #[error("[SPR-POLICY] {node}: {message}")]
    Policy { node: String, message: String },

    #[error("[SPR-INVALID-COMBINATION] {node}: {message}")]
    InvalidCombination { node: String, message: String },

    #[error("[SPR-SCHEMA] document does not match the runner schema: {diagnostics}")]
    SchemaValidation { diagnostics: String },

    #[error("invalid variable name `{0}`: expected a JavaScript identifier")]
    InvalidVarName(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExperimentError {
    pub fn structure(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structure { node: node.into(), message: message.into() }
    }

    pub fn missing_attribute(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MissingAttribute { node: node.into(), message: message.into() }
    }

    pub fn imbalance(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Imbalance { node: node.into(), message: message.into() }
    }

    pub fn insufficient_bank_size(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InsufficientBankSize { node: node.into(), message: message.into() }
    }

    pub fn inconsistent_replacement(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InconsistentReplacementPolicy { node: node.into(), message: message.into() }
    }

    pub fn schema_mismatch(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaMismatch { node: node.into(), message: message.into() }
    }

    pub fn unknown_field(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnknownField { node: node.into(), message: message.into() }
    }

    pub fn type_error(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Type { node: node.into(), message: message.into() }
    }

    pub fn length_mismatch(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LengthMismatch { node: node.into(), message: message.into() }
    }

    pub fn unsupported_arity(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedArity { node: node.into(), message: message.into() }
    }

    pub fn ambiguous_reference(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AmbiguousReference { node: node.into(), message: message.into() }
    }

    pub fn policy(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Policy { node: node.into(), message: message.into() }
    }

    pub fn invalid_combination(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCombination { node: node.into(), message: message.into() }
    }

    /// Stable invariant code, `None` for I/O and encoding failures.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Structure { .. } => Some(INV_STRUCTURE),
            Self::MissingAttribute { .. } => Some(INV_MISSING_ATTRIBUTE),
            Self::Imbalance { .. } => Some(INV_IMBALANCE),
            Self::InsufficientBankSize { .. } => Some(INV_BANK_SIZE),
            Self::InconsistentReplacementPolicy { .. } => Some(INV_REPLACEMENT_POLICY),
            Self::SchemaMismatch { .. } => Some(INV_SCHEMA_MISMATCH),
            Self::UnknownField { .. } => Some(INV_UNKNOWN_FIELD),
            Self::Type { .. } => Some(INV_TYPE),
            Self::LengthMismatch { .. } => Some(INV_LENGTH_MISMATCH),
            Self::UnsupportedArity { .. } => Some(INV_UNSUPPORTED_ARITY),
            Self::AmbiguousReference { .. } => Some(INV_AMBIGUOUS_REFERENCE),
            Self::Policy { .. } => Some(INV_POLICY),
            Self::InvalidCombination { .. } => Some(INV_INVALID_COMBINATION),
            Self::SchemaValidation { .. } => Some(INV_SCHEMA_VALIDATION),
            Self::InvalidVarName(_) | Self::Json(_) | Self::Io { .. } => None,
        }
    }

    /// What the violated invariant promises when it holds.
    pub fn guarantee(&self) -> &'static str {
        self.code().map(get_guarantee).unwrap_or("")
    }

    /// Identifier of the node the error was raised against.
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::Structure { node, .. }
            | Self::MissingAttribute { node, .. }
            | Self::Imbalance { node, .. }
            | Self::InsufficientBankSize { node, .. }
            | Self::InconsistentReplacementPolicy { node, .. }
            | Self::SchemaMismatch { node, .. }
            | Self::UnknownField { node, .. }
            | Self::Type { node, .. }
            | Self::LengthMismatch { node, .. }
            | Self::UnsupportedArity { node, .. }
            | Self::AmbiguousReference { node, .. }
            | Self::Policy { node, .. }
            | Self::InvalidCombination { node, .. } => Some(node),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED RULES
// ═══════════════════════════════════════════════════════════════════════════════

/// Logs the one non-fatal rule: counterbalance and treatments read the same
/// per-participant permutation, so block choice and block order correlate.
pub(crate) fn warn_shared_permutation(node: &str) {
    warn!(
        node,
        "counterbalance and treatments share the permutation variable; \
         use exchangeable instead of counterbalance to order blocks independently"
    );
}

/// A freetext answer check must be a usable regular expression.
pub(crate) fn check_pattern(node: &str, pattern: &str) -> Result<(), ExperimentError> {
    Regex::new(pattern).map(|_| ()).map_err(|e| {
        ExperimentError::type_error(node, format!("`{}` is not a valid regular expression: {}", pattern, e))
    })
}

/// Shape rules for a declared bank: non-empty, homogeneous, shared record fields.
pub(crate) fn validate_bank(owner: &str, name: &str, bank: &Bank) -> Result<(), ExperimentError> {
    let Some(first) = bank.first() else {
        return Err(ExperimentError::schema_mismatch(owner, format!("bank `{}` is empty", name)));
    };

    match first {
        BankEntry::Text(_) => {
            if bank.iter().any(|entry| matches!(entry, BankEntry::Record(_))) {
                return Err(ExperimentError::schema_mismatch(
                    owner,
                    format!("bank `{}` mixes strings and records", name),
                ));
            }
        }
        BankEntry::Record(first_record) => {
            let fields: BTreeSet<&str> = first_record.keys().map(String::as_str).collect();
            for entry in bank {
                match entry {
                    BankEntry::Text(_) => {
                        return Err(ExperimentError::schema_mismatch(
                            owner,
                            format!("bank `{}` mixes strings and records", name),
                        ));
                    }
                    BankEntry::Record(record) => {
                        let keys: BTreeSet<&str> = record.keys().map(String::as_str).collect();
                        if keys != fields {
                            return Err(ExperimentError::schema_mismatch(
                                owner,
                                format!("all records in bank `{}` must have the same fields", name),
                            ));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Rules that depend on every placeholder bound to a declared bank.
pub(crate) fn check_bank_usage(
    owner: &str,
    name: &str,
    bank: &Bank,
    usage: &BankUsage,
) -> Result<(), ExperimentError> {
    if usage.placeholders == 0 {
        return Ok(());
    }

    let record_fields: Option<BTreeSet<&str>> = match bank.first() {
        Some(BankEntry::Record(record)) => Some(record.keys().map(String::as_str).collect()),
        _ => None,
    };
    for (node, field) in &usage.fields {
        match (&record_fields, field) {
            (Some(fields), Some(field)) if !fields.contains(field.as_str()) => {
                return Err(ExperimentError::unknown_field(
                    node.as_str(),
                    format!("bank `{}` has no field `{}`", name, field),
                ));
            }
            (Some(_), None) => {
                return Err(ExperimentError::unknown_field(
                    node.as_str(),
                    format!("samples from record bank `{}` must name a field", name),
                ));
            }
            (None, Some(field)) => {
                return Err(ExperimentError::unknown_field(
                    node.as_str(),
                    format!("bank `{}` holds strings, it has no field `{}`", name, field),
                ));
            }
            _ => {}
        }
    }

    if usage.with_replacement > 0 && usage.with_replacement < usage.placeholders {
        return Err(ExperimentError::inconsistent_replacement(
            owner,
            format!(
                "bank `{}` is sampled both with and without replacement; all samples must agree",
                name
            ),
        ));
    }

    let required = usage.required_distinct();
    if usage.with_replacement == 0 && required > bank.len() {
        return Err(ExperimentError::insufficient_bank_size(
            owner,
            format!(
                "bank `{}` has {} values but {} distinct samples are drawn without replacement",
                name,
                bank.len(),
                required
            ),
        ));
    }

    // Slots are numbered per bank name across the whole session, so a bank
    // redeclared on another block or a variable never placed in the tree can
    // push an index past this bank's end.
    if let Some(max_slot) = usage.max_slot() {
        if max_slot >= bank.len() {
            return Err(ExperimentError::insufficient_bank_size(
                owner,
                format!(
                    "bank `{}` has {} values but a sample reads slot {}; \
                     declare the bank once or drop variables that are never placed",
                    name,
                    bank.len(),
                    max_slot
                ),
            ));
        }
    }
    Ok(())
}
