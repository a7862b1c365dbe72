//! Conditional-display guards.
//!
//! A [`RunIf`] does not own what it watches. It holds lightweight handles
//! that carry only the target's identifier; the compiler turns them into
//! `pageID`/`optionID` strings after checking the targets exist in the tree.

use crate::block::Block;
use crate::item::Item;
use crate::page::{AnswerOption, Page};
use crate::validate::{check_pattern, ExperimentError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageRef {
    pub(crate) id: String,
}

impl PageRef {
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionRef {
    pub(crate) id: String,
}

impl OptionRef {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Handle to an Item, remembering how many pages it was authored with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemRef {
    pub(crate) id: String,
    pub(crate) pages: usize,
}

impl ItemRef {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Handle to a Block, used by exchangeable, counterbalance and treatments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockRef {
    pub(crate) id: String,
}

impl BlockRef {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl From<&Block> for BlockRef {
    fn from(block: &Block) -> Self {
        block.handle()
    }
}

/// Runs the guarded node only if a watched page was last answered a certain
/// way, or only for one value of the participant's permutation variable.
///
/// Exactly one of `item`, `page` and `permutation` is set; an `item` or
/// `page` guard may add one of `option` and `regex`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunIf {
    pub item: Option<ItemRef>,
    pub page: Option<PageRef>,
    pub option: Option<OptionRef>,
    pub regex: Option<String>,
    pub permutation: Option<u32>,
}

impl RunIf {
    pub fn on_page(page: &Page) -> Self {
        Self {
            page: Some(page.handle()),
            ..Self::default()
        }
    }

    /// Watches the single page of a one-page Item.
    pub fn on_item(item: &Item) -> Self {
        Self {
            item: Some(item.handle()),
            ..Self::default()
        }
    }

    pub fn on_permutation(permutation: u32) -> Self {
        Self {
            permutation: Some(permutation),
            ..Self::default()
        }
    }

    /// Requires that `option` was chosen.
    pub fn with_option(mut self, option: &AnswerOption) -> Self {
        self.option = Some(option.handle());
        self
    }

    /// Requires a response matching `regex`.
    pub fn with_regex(mut self, regex: impl Into<String>) -> Self {
        self.regex = Some(regex.into());
        self
    }

    /// `owner` is the node carrying this guard.
    pub fn validate(&self, owner: &str) -> Result<(), ExperimentError> {
        let targets = [
            self.item.is_some(),
            self.page.is_some(),
            self.permutation.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if targets != 1 {
            return Err(ExperimentError::structure(
                owner,
                format!(
                    "run_if must have exactly one of item, page and permutation, found {}",
                    targets
                ),
            ));
        }

        if self.option.is_some() && self.regex.is_some() {
            return Err(ExperimentError::structure(
                owner,
                "run_if takes an option or a regex, not both",
            ));
        }
        if self.permutation.is_some() && (self.option.is_some() || self.regex.is_some()) {
            return Err(ExperimentError::structure(
                owner,
                "a permutation run_if cannot also test an option or a regex",
            ));
        }

        if let Some(item) = &self.item {
            if item.pages != 1 {
                return Err(ExperimentError::ambiguous_reference(
                    owner,
                    format!(
                        "run_if watches item {} which has {} pages; an item guard needs exactly one",
                        item.id, item.pages
                    ),
                ));
            }
        }

        if let Some(regex) = &self.regex {
            check_pattern(owner, regex)?;
        }
        Ok(())
    }
}
