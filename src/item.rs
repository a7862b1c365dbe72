//! Items: the unit a Block shuffles. An Item's pages always show together,
//! in order.

use crate::component::{Component, Tags, Text};
use crate::page::Page;
use crate::run_if::{ItemRef, RunIf};
use crate::sampling::SampleFrom;
use crate::session::Session;
use crate::validate::ExperimentError;

/// What an Item was authored with. Lowering always rewrites this to `Pages`.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemContents {
    /// Shorthand for a single page showing this text.
    Text(Text),
    Page(Box<Page>),
    Pages(Vec<Page>),
}

impl From<&str> for ItemContents {
    fn from(value: &str) -> Self {
        ItemContents::Text(value.into())
    }
}

impl From<String> for ItemContents {
    fn from(value: String) -> Self {
        ItemContents::Text(value.into())
    }
}

impl From<SampleFrom> for ItemContents {
    fn from(value: SampleFrom) -> Self {
        ItemContents::Text(value.into())
    }
}

impl From<Page> for ItemContents {
    fn from(page: Page) -> Self {
        ItemContents::Page(Box::new(page))
    }
}

impl From<Vec<Page>> for ItemContents {
    fn from(pages: Vec<Page>) -> Self {
        ItemContents::Pages(pages)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    id: String,
    pub contents: ItemContents,
    pub condition: Option<Text>,
    pub tags: Tags,
    pub run_if: Option<RunIf>,
}

impl Item {
    pub fn new(session: &Session, contents: impl Into<ItemContents>) -> Self {
        Self {
            id: session.next_id(),
            contents: contents.into(),
            condition: None,
            tags: Tags::new(),
            run_if: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn condition(mut self, condition: impl Into<Text>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn run_if(mut self, run_if: RunIf) -> Self {
        self.run_if = Some(run_if);
        self
    }

    pub fn handle(&self) -> ItemRef {
        ItemRef {
            id: self.id.clone(),
            pages: self.page_count(),
        }
    }

    pub fn page_count(&self) -> usize {
        match &self.contents {
            ItemContents::Text(_) | ItemContents::Page(_) => 1,
            ItemContents::Pages(pages) => pages.len(),
        }
    }

    /// Pages already materialized; empty for text shorthand.
    pub fn pages(&self) -> &[Page] {
        match &self.contents {
            ItemContents::Text(_) => &[],
            ItemContents::Page(page) => std::slice::from_ref(&**page),
            ItemContents::Pages(pages) => pages,
        }
    }

    /// The item's own condition, or else its first page's.
    pub fn effective_condition(&self) -> Option<&Text> {
        self.condition
            .as_ref()
            .or_else(|| self.pages().first().and_then(|page| page.condition.as_ref()))
    }
}

impl Component for Item {
    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ExperimentError> {
        if self.page_count() == 0 {
            return Err(ExperimentError::structure(
                &self.id,
                "an item must contain at least one page",
            ));
        }
        if let Some(run_if) = &self.run_if {
            run_if.validate(&self.id)?;
        }
        Ok(())
    }

    fn duplicate(&self, session: &Session) -> Self {
        let id = session.next_id();
        let contents = match &self.contents {
            ItemContents::Text(text) => ItemContents::Text(text.clone()),
            ItemContents::Page(page) => ItemContents::Page(Box::new(page.duplicate(session))),
            ItemContents::Pages(pages) => {
                ItemContents::Pages(pages.iter().map(|p| p.duplicate(session)).collect())
            }
        };
        Self {
            id,
            contents,
            ..self.clone()
        }
    }
}
