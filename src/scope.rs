//! Lookup structures built over the desugared tree: the identifier index that
//! resolves conditional guards, and the nested bank scopes that sample
//! placeholders bind to.

use std::collections::{BTreeSet, HashMap, HashSet};

use indexmap::IndexMap;

use crate::block::Block;
use crate::component::{Component, Feedback};
use crate::document::RunIfDocument;
use crate::experiment::{Banks, Experiment};
use crate::item::Item;
use crate::page::Page;
use crate::run_if::RunIf;
use crate::sampling::{ResolvedSlot, SampleFrom};
use crate::validate::{check_bank_usage, ExperimentError};

// ═══════════════════════════════════════════════════════════════════════════════
// REFERENCE INDEX
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifiers per category, plus each item's first page and authored page
/// count.
#[derive(Debug, Default)]
pub(crate) struct ReferenceIndex {
    blocks: HashSet<String>,
    items: HashMap<String, String>,
    authored_pages: HashMap<String, usize>,
    pages: HashSet<String>,
    options: HashSet<String>,
}

impl ReferenceIndex {
    /// Indexes the desugared `experiment`; fails on the first identifier seen
    /// twice within its category. Item page counts come from `authored`,
    /// since splicing adds feedback pages to items.
    pub(crate) fn build(experiment: &Experiment, authored: &Experiment) -> Result<Self, ExperimentError> {
        let mut index = Self::default();
        for block in &experiment.blocks {
            index.visit_block(block)?;
        }
        for block in &authored.blocks {
            index.count_authored_pages(block);
        }
        Ok(index)
    }

    fn count_authored_pages(&mut self, block: &Block) {
        let items = block
            .items
            .iter()
            .flatten()
            .chain(block.groups.iter().flatten().flatten());
        for item in items {
            self.authored_pages
                .insert(item.id().to_string(), item.page_count());
        }
        for child in block.blocks.iter().flatten() {
            self.count_authored_pages(child);
        }
    }

    fn visit_block(&mut self, block: &Block) -> Result<(), ExperimentError> {
        claim(&mut self.blocks, "block", block.id())?;
        if let Some(pages) = &block.pages {
            for page in pages {
                self.visit_page(page)?;
            }
        }
        if let Some(items) = &block.items {
            for item in items {
                self.visit_item(item)?;
            }
        }
        if let Some(groups) = &block.groups {
            for item in groups.iter().flatten() {
                self.visit_item(item)?;
            }
        }
        if let Some(children) = &block.blocks {
            for child in children {
                self.visit_block(child)?;
            }
        }
        Ok(())
    }

    fn visit_item(&mut self, item: &Item) -> Result<(), ExperimentError> {
        if self.items.contains_key(item.id()) {
            return Err(duplicate("item", item.id()));
        }
        let first_page = item
            .pages()
            .first()
            .map(|page| page.id().to_string())
            .unwrap_or_default();
        self.items.insert(item.id().to_string(), first_page);
        for page in item.pages() {
            self.visit_page(page)?;
        }
        Ok(())
    }

    fn visit_page(&mut self, page: &Page) -> Result<(), ExperimentError> {
        claim(&mut self.pages, "page", page.id())?;
        if let Some(Feedback::Page(feedback)) = &page.feedback {
            self.visit_page(feedback)?;
        }
        for option in &page.options {
            claim(&mut self.options, "option", option.id())?;
            if let Some(Feedback::Page(feedback)) = &option.feedback {
                self.visit_page(feedback)?;
            }
        }
        Ok(())
    }

    /// Rewrites handles to identifier strings. `owner` is the guarded node.
    pub(crate) fn resolve(&self, owner: &str, run_if: &RunIf) -> Result<RunIfDocument, ExperimentError> {
        let missing = |kind: &str, id: &str| {
            ExperimentError::missing_attribute(
                owner,
                format!("run_if watches {} {} which is not in the experiment", kind, id),
            )
        };

        let page_id = match (&run_if.page, &run_if.item) {
            (Some(page), _) => {
                if !self.pages.contains(page.id()) {
                    return Err(missing("page", page.id()));
                }
                Some(page.id().to_string())
            }
            (None, Some(item)) => {
                let first_page = self
                    .items
                    .get(item.id())
                    .ok_or_else(|| missing("item", item.id()))?;
                let pages = self.authored_pages.get(item.id()).copied().unwrap_or(1);
                if pages != 1 {
                    return Err(ExperimentError::ambiguous_reference(
                        owner,
                        format!(
                            "run_if watches item {} which has {} pages; an item guard needs exactly one",
                            item.id(),
                            pages
                        ),
                    ));
                }
                Some(first_page.clone())
            }
            (None, None) => None,
        };

        let option_id = match &run_if.option {
            Some(option) if !self.options.contains(option.id()) => {
                return Err(missing("option", option.id()));
            }
            Some(option) => Some(option.id().to_string()),
            None => None,
        };

        Ok(RunIfDocument {
            page_id,
            option_id,
            regex: run_if.regex.clone(),
            permutation: run_if.permutation,
        })
    }
}

fn claim(seen: &mut HashSet<String>, kind: &str, id: &str) -> Result<(), ExperimentError> {
    if seen.insert(id.to_string()) {
        Ok(())
    } else {
        Err(duplicate(kind, id))
    }
}

fn duplicate(kind: &str, id: &str) -> ExperimentError {
    ExperimentError::structure(
        id,
        format!("{} identifier `{}` is used more than once", kind, id),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// BANK SCOPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Every placeholder bound to one declared bank.
#[derive(Debug, Clone, Default)]
pub(crate) struct BankUsage {
    pub placeholders: usize,
    pub with_replacement: usize,
    /// Holding node and requested field, per placeholder.
    pub fields: Vec<(String, Option<String>)>,
    slots: BTreeSet<usize>,
    not_variable: usize,
}

impl BankUsage {
    fn record(&mut self, node: &str, sample: &SampleFrom, slot: ResolvedSlot) {
        self.placeholders += 1;
        self.fields
            .push((node.to_string(), sample.field().map(str::to_string)));
        match slot {
            ResolvedSlot::Variable(slot) => {
                self.slots.insert(slot);
            }
            ResolvedSlot::NotVariable(slot) => {
                self.slots.insert(slot);
                self.not_variable += 1;
            }
            ResolvedSlot::Unconstrained => self.with_replacement += 1,
        }
    }

    /// Distinct bank values a participant needs: one per slot, and one more
    /// for the value that must differ from an excluded slot.
    pub fn required_distinct(&self) -> usize {
        self.slots.len() + usize::from(self.not_variable > 0)
    }

    /// Highest slot index emitted against the bank. The runner indexes the
    /// bank with it directly.
    pub fn max_slot(&self) -> Option<usize> {
        self.slots.last().copied()
    }
}

struct Frame<'a> {
    owner: String,
    banks: &'a Banks,
    usage: IndexMap<String, BankUsage>,
}

/// Stack of bank declarations from the experiment root down to the block
/// being lowered.
#[derive(Default)]
pub(crate) struct BankScopes<'a> {
    frames: Vec<Frame<'a>>,
}

impl<'a> BankScopes<'a> {
    pub(crate) fn push(&mut self, owner: &str, banks: &'a Banks) {
        self.frames.push(Frame {
            owner: owner.to_string(),
            banks,
            usage: IndexMap::new(),
        });
    }

    /// Binds the placeholder to the nearest scope declaring its bank.
    pub(crate) fn record(
        &mut self,
        node: &str,
        sample: &SampleFrom,
        slot: ResolvedSlot,
    ) -> Result<(), ExperimentError> {
        let frame = self
            .frames
            .iter_mut()
            .rev()
            .find(|frame| frame.banks.contains_key(sample.bank()))
            .ok_or_else(|| {
                ExperimentError::missing_attribute(
                    node,
                    format!(
                        "bank `{}` is not declared on any enclosing block or on the experiment",
                        sample.bank()
                    ),
                )
            })?;
        frame
            .usage
            .entry(sample.bank().to_string())
            .or_default()
            .record(node, sample, slot);
        Ok(())
    }

    /// Closes the innermost scope and checks each of its banks against the
    /// placeholders bound to it.
    pub(crate) fn pop(&mut self) -> Result<(), ExperimentError> {
        let Some(frame) = self.frames.pop() else {
            return Ok(());
        };
        for (name, bank) in frame.banks {
            if let Some(usage) = frame.usage.get(name) {
                check_bank_usage(&frame.owner, name, bank, usage)?;
            }
        }
        Ok(())
    }
}
