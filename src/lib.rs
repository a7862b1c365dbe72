//! # Speriment Compiler
//!
//! Builds declarative experiment trees and compiles them into the JSON
//! document the browser runner executes.
//!
//! ## Pipeline
//!
//! 1. **Authoring**: components are built against one [`Session`], which
//!    issues identifiers and reserves sample slots for named variables.
//! 2. **Desugaring**: a deep copy of the tree is rewritten: items become page
//!    lists, feedback is spliced after its trigger, treatments become
//!    permutation guards, freetext pages get their text box option.
//! 3. **Lowering**: every node is validated, guards resolve to `pageID` /
//!    `optionID`, placeholders resolve to slots, bare resource filenames get
//!    full records, and fields take their wire names.
//! 4. **Emission**: the document is checked against the runner schema and
//!    written as `var <name> = <json>`.
//!
//! Every failure is fatal and names the offending node; there is no partial
//! output.
//!
//! ## Wire Vocabulary
//!
//! `id`, `runIf`, `latinSquare`, `pageID`, `optionID`, `sampleFrom`,
//! `notVariable`, `mediaType`. These names are fixed by the runner.

mod block;
mod codegen;
mod component;
mod document;
mod experiment;
mod finalize;
mod item;
mod page;
mod run_if;
mod sampling;
mod scope;
mod session;
mod transform;
mod validate;

#[cfg(test)]
mod sampling_tests;
#[cfg(test)]
mod warning_tests;

pub use block::{Block, Criterion};
pub use component::{
    Component, Correct, Feedback, Keyboard, PageText, Resource, ResourceSpec, Tags, Text,
};
pub use document::*;
pub use experiment::{bank, Bank, BankEntry, Banks, Experiment};
pub use finalize::{
    fingerprint, render_json, schema, validate_against_schema, wrap_as_script, EmitOptions,
    SCHEMA_SOURCE,
};
pub use item::{Item, ItemContents};
pub use page::{AnswerOption, Page};
pub use run_if::{BlockRef, ItemRef, OptionRef, PageRef, RunIf};
pub use sampling::{SampleFrom, SampleSpec, Sampling, SamplingRegistry};
pub use session::{make_experiment, IdGenerator, Session};
pub use validate::*;
