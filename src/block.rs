//! Blocks: ordered containers of pages, items, item groups or other blocks,
//! plus the ordering policies the runner applies to them.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::component::{Component, Text};
use crate::experiment::{Bank, Banks};
use crate::item::Item;
use crate::page::Page;
use crate::run_if::{BlockRef, RunIf};
use crate::session::Session;
use crate::validate::{validate_bank, warn_shared_permutation, ExperimentError};

/// How long a block repeats before participants move on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Criterion {
    /// Correct answers in a row at the end of the block.
    Streak(u32),
    /// Share of answerable pages answered correctly, in (0, 1].
    Proportion(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    id: String,
    pub pages: Option<Vec<Page>>,
    pub items: Option<Vec<Item>>,
    /// One item per group is shown to each participant.
    pub groups: Option<Vec<Vec<Item>>>,
    pub blocks: Option<Vec<Block>>,
    /// Children that may swap places, randomly per participant.
    pub exchangeable: Vec<BlockRef>,
    /// Children permuted by the participant's permutation variable.
    pub counterbalance: Vec<BlockRef>,
    /// Sublist `i` runs only when the permutation variable equals `i`.
    pub treatments: Vec<Vec<BlockRef>>,
    pub latin_square: Option<bool>,
    pub pseudorandom: Option<bool>,
    pub criterion: Option<Criterion>,
    /// Maximum number of runs when a criterion is set.
    pub cutoff: Option<u32>,
    pub run_if: Option<RunIf>,
    pub banks: Banks,
}

impl Block {
    /// A block without contents; add exactly one content kind before compiling.
    pub fn new(session: &Session) -> Self {
        Self {
            id: session.next_id(),
            pages: None,
            items: None,
            groups: None,
            blocks: None,
            exchangeable: Vec::new(),
            counterbalance: Vec::new(),
            treatments: Vec::new(),
            latin_square: None,
            pseudorandom: None,
            criterion: None,
            cutoff: None,
            run_if: None,
            banks: Banks::new(),
        }
    }

    pub fn with_pages(session: &Session, pages: Vec<Page>) -> Self {
        Self::new(session).pages(pages)
    }

    pub fn with_items(session: &Session, items: Vec<Item>) -> Self {
        Self::new(session).items(items)
    }

    pub fn with_groups(session: &Session, groups: Vec<Vec<Item>>) -> Self {
        Self::new(session).groups(groups)
    }

    pub fn with_blocks(session: &Session, blocks: Vec<Block>) -> Self {
        Self::new(session).blocks(blocks)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn pages(mut self, pages: Vec<Page>) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn items(mut self, items: Vec<Item>) -> Self {
        self.items = Some(items);
        self
    }

    pub fn groups(mut self, groups: Vec<Vec<Item>>) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn blocks(mut self, blocks: Vec<Block>) -> Self {
        self.blocks = Some(blocks);
        self
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

    pub fn latin_square(mut self, latin_square: bool) -> Self {
        self.latin_square = Some(latin_square);
        self
    }

    pub fn pseudorandom(mut self, pseudorandom: bool) -> Self {
        self.pseudorandom = Some(pseudorandom);
        self
    }

    pub fn criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = Some(criterion);
        self
    }

    pub fn cutoff(mut self, cutoff: u32) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    pub fn run_if(mut self, run_if: RunIf) -> Self {
        self.run_if = Some(run_if);
        self
    }

    pub fn bank(mut self, name: impl Into<String>, bank: Bank) -> Self {
        self.banks.insert(name.into(), bank);
        self
    }

    pub fn handle(&self) -> BlockRef {
        BlockRef {
            id: self.id.clone(),
        }
    }

    fn content_kinds(&self) -> Vec<&'static str> {
        [
            ("pages", self.pages.is_some()),
            ("items", self.items.is_some()),
            ("groups", self.groups.is_some()),
            ("blocks", self.blocks.is_some()),
        ]
        .into_iter()
        .filter_map(|(kind, present)| present.then_some(kind))
        .collect()
    }

    fn validate_contents(&self) -> Result<(), ExperimentError> {
        let kinds = self.content_kinds();
        if kinds.len() != 1 {
            return Err(ExperimentError::structure(
                &self.id,
                format!(
                    "a block must have exactly one content kind of pages, items, groups and blocks, found [{}]",
                    kinds.join(", ")
                ),
            ));
        }
        Ok(())
    }

    fn validate_child_references(&self) -> Result<(), ExperimentError> {
        let has_references = !self.exchangeable.is_empty()
            || !self.counterbalance.is_empty()
            || !self.treatments.is_empty();
        if !has_references {
            return Ok(());
        }
        let Some(children) = &self.blocks else {
            return Err(ExperimentError::structure(
                &self.id,
                "exchangeable, counterbalance and treatments need blocks as contents",
            ));
        };
        check_child_references(
            &self.id,
            children,
            &self.exchangeable,
            &self.counterbalance,
            &self.treatments,
        )?;
        if !self.counterbalance.is_empty() && !self.treatments.is_empty() {
            warn_shared_permutation(&self.id);
        }
        Ok(())
    }

    fn validate_latin_square(&self) -> Result<(), ExperimentError> {
        if self.latin_square != Some(true) {
            return Ok(());
        }
        let Some(groups) = &self.groups else {
            return Err(ExperimentError::policy(
                &self.id,
                "latin_square chooses from groups; give the block groups as contents",
            ));
        };
        if let Some(first) = groups.first() {
            if groups.iter().any(|group| group.len() != first.len()) {
                return Err(ExperimentError::imbalance(
                    &self.id,
                    "a latin square needs every group to have the same length",
                ));
            }
        }
        Ok(())
    }

    fn validate_pseudorandom(&self) -> Result<(), ExperimentError> {
        if self.pseudorandom != Some(true) {
            return Ok(());
        }

        if let Some(groups) = &self.groups {
            if self.latin_square != Some(true) {
                return Err(ExperimentError::policy(
                    &self.id,
                    "pages chosen randomly from groups cannot be pseudorandomized; \
                     supply pages, set latin_square, or drop pseudorandom",
                ));
            }
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for item in groups.iter().flatten() {
                let condition = self.literal_condition(item.id(), item.effective_condition())?;
                *counts.entry(condition).or_default() += 1;
            }
            let distinct: HashSet<usize> = counts.values().copied().collect();
            if distinct.len() > 1 {
                return Err(ExperimentError::imbalance(
                    &self.id,
                    "pseudorandom needs every condition to occur the same number of times",
                ));
            }
        } else if let Some(pages) = &self.pages {
            for page in pages {
                self.literal_condition(page.id(), page.condition.as_ref())?;
            }
        } else if let Some(items) = &self.items {
            for item in items {
                self.literal_condition(item.id(), item.effective_condition())?;
            }
        } else {
            return Err(ExperimentError::policy(
                &self.id,
                "pseudorandom orders pages or items, not blocks",
            ));
        }
        Ok(())
    }

    /// Pseudorandom ordering compares conditions at compile time, so a
    /// member's condition must be present and literal.
    fn literal_condition<'t>(
        &self,
        member: &str,
        condition: Option<&'t Text>,
    ) -> Result<&'t str, ExperimentError> {
        match condition {
            Some(Text::Literal(condition)) => Ok(condition.as_str()),
            Some(Text::Sample(_)) => Err(ExperimentError::policy(
                member,
                format!("block {} is pseudorandom, so conditions cannot be sampled", self.id),
            )),
            None => Err(ExperimentError::missing_attribute(
                member,
                format!("block {} is pseudorandom, so every member needs a condition", self.id),
            )),
        }
    }

    fn validate_repetition(&self) -> Result<(), ExperimentError> {
        match self.criterion {
            Some(Criterion::Streak(0)) => {
                return Err(ExperimentError::policy(&self.id, "a criterion streak must be at least 1"));
            }
            Some(Criterion::Proportion(share)) if !(share > 0.0 && share <= 1.0) => {
                return Err(ExperimentError::policy(
                    &self.id,
                    format!("a criterion proportion must be in (0, 1], got {}", share),
                ));
            }
            _ => {}
        }
        if self.cutoff == Some(0) {
            return Err(ExperimentError::policy(&self.id, "cutoff counts runs from 1"));
        }
        Ok(())
    }
}

impl Component for Block {
    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ExperimentError> {
        self.validate_contents()?;
        self.validate_child_references()?;
        self.validate_latin_square()?;
        self.validate_pseudorandom()?;
        self.validate_repetition()?;
        for (name, bank) in &self.banks {
            validate_bank(&self.id, name, bank)?;
        }
        if let Some(run_if) = &self.run_if {
            run_if.validate(&self.id)?;
        }
        Ok(())
    }

    /// Child references (exchangeable, counterbalance, treatments) are
    /// rewritten to the copies of the children they named.
    fn duplicate(&self, session: &Session) -> Self {
        let id = session.next_id();
        let mut renamed: HashMap<String, String> = HashMap::new();
        let blocks = self.blocks.as_ref().map(|children| {
            children
                .iter()
                .map(|child| {
                    let copy = child.duplicate(session);
                    renamed.insert(child.id.clone(), copy.id.clone());
                    copy
                })
                .collect::<Vec<_>>()
        });
        let remap = |refs: &[BlockRef]| -> Vec<BlockRef> {
            refs.iter()
                .map(|r| BlockRef {
                    id: renamed.get(&r.id).cloned().unwrap_or_else(|| r.id.clone()),
                })
                .collect()
        };

        Self {
            id,
            pages: self
                .pages
                .as_ref()
                .map(|pages| pages.iter().map(|p| p.duplicate(session)).collect()),
            items: self
                .items
                .as_ref()
                .map(|items| items.iter().map(|i| i.duplicate(session)).collect()),
            groups: self.groups.as_ref().map(|groups| {
                groups
                    .iter()
                    .map(|group| group.iter().map(|i| i.duplicate(session)).collect())
                    .collect()
            }),
            exchangeable: remap(&self.exchangeable),
            counterbalance: remap(&self.counterbalance),
            treatments: self.treatments.iter().map(|t| remap(t)).collect(),
            blocks,
            ..self.clone()
        }
    }
}

/// Every referenced block must be one of `children`.
pub(crate) fn check_child_references(
    owner: &str,
    children: &[Block],
    exchangeable: &[BlockRef],
    counterbalance: &[BlockRef],
    treatments: &[Vec<BlockRef>],
) -> Result<(), ExperimentError> {
    let known: HashSet<&str> = children.iter().map(|child| child.id.as_str()).collect();
    let referenced = exchangeable
        .iter()
        .map(|r| ("exchangeable", r))
        .chain(counterbalance.iter().map(|r| ("counterbalance", r)))
        .chain(treatments.iter().flatten().map(|r| ("treatments", r)));
    for (list, reference) in referenced {
        if !known.contains(reference.id.as_str()) {
            return Err(ExperimentError::missing_attribute(
                owner,
                format!("{} names block {} which is not a direct child", list, reference.id),
            ));
        }
    }
    Ok(())
}
