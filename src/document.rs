//! Wire types of the emitted document.
//!
//! Field names here are the contract with the browser runner (`id`, `runIf`,
//! `latinSquare`, `pageID`, `optionID`, `sampleFrom`, `notVariable`,
//! `mediaType`). Authoring types never serialize directly; lowering builds
//! these instead.

use serde::{Deserialize, Serialize};

use crate::block::Criterion;
use crate::component::{Correct, Keyboard, Tags};
use crate::experiment::Banks;

// ═══════════════════════════════════════════════════════════════════════════════
// VALUES
// ═══════════════════════════════════════════════════════════════════════════════

/// A resolved sample placeholder. `variable` and `notVariable` are slot
/// indices; neither is set for samples drawn with replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleDocument {
    pub sample_from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_variable: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub with_replacement: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextDocument {
    Literal(String),
    Sample(SampleDocument),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageTextDocument {
    Single(TextDocument),
    Lines(Vec<TextDocument>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectDocument {
    Flag(bool),
    Pattern(String),
}

impl From<&Correct> for CorrectDocument {
    fn from(correct: &Correct) -> Self {
        match correct {
            Correct::Flag(flag) => CorrectDocument::Flag(*flag),
            Correct::Pattern(pattern) => CorrectDocument::Pattern(pattern.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyboardDocument {
    Default(bool),
    Keys(Vec<String>),
}

impl From<&Keyboard> for KeyboardDocument {
    fn from(keyboard: &Keyboard) -> Self {
        match keyboard {
            Keyboard::Default(flag) => KeyboardDocument::Default(*flag),
            Keyboard::Keys(keys) => KeyboardDocument::Keys(keys.clone()),
        }
    }
}

/// A full resource record. `mediaType` is always written, `null` when unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub source: TextDocument,
    pub media_type: Option<String>,
    pub autoplay: bool,
    pub controls: bool,
    pub required: bool,
}

/// A resource entry: a sampled filename stays a bare sample object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceDocument {
    Sample(SampleDocument),
    Record(ResourceRecord),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunIfDocument {
    #[serde(rename = "pageID", skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    #[serde(rename = "optionID", skip_serializing_if = "Option::is_none")]
    pub option_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permutation: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedbackDocument {
    Text(TextDocument),
    Page(Box<PageDocument>),
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionDocument {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct: Option<CorrectDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceDocument>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDocument {
    pub id: String,
    pub text: PageTextDocument,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct: Option<CorrectDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<TextDocument>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclusive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freetext: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<KeyboardDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_if: Option<RunIfDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDocument {
    pub id: String,
    pub pages: Vec<PageDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<TextDocument>,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_if: Option<RunIfDocument>,
}

/// Exactly one of `pages`, `items`, `groups` and `blocks` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDocument {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<PageDocument>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ItemDocument>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<Vec<ItemDocument>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<BlockDocument>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exchangeable: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub counterbalance: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latin_square: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pseudorandom: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criterion: Option<Criterion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cutoff: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_if: Option<RunIfDocument>,
    #[serde(default, skip_serializing_if = "Banks::is_empty")]
    pub banks: Banks,
}

/// The lowered experiment, ready for schema validation and emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentDocument {
    pub blocks: Vec<BlockDocument>,
    pub exchangeable: Vec<String>,
    pub counterbalance: Vec<String>,
    pub banks: Banks,
}

impl ExperimentDocument {
    /// Every page in document order, including pages inside items and
    /// nested blocks, but not feedback pages.
    pub fn pages(&self) -> Vec<&PageDocument> {
        fn collect<'a>(block: &'a BlockDocument, out: &mut Vec<&'a PageDocument>) {
            if let Some(pages) = &block.pages {
                out.extend(pages.iter());
            }
            if let Some(items) = &block.items {
                out.extend(items.iter().flat_map(|item| item.pages.iter()));
            }
            if let Some(groups) = &block.groups {
                out.extend(groups.iter().flatten().flat_map(|item| item.pages.iter()));
            }
            if let Some(children) = &block.blocks {
                for child in children {
                    collect(child, out);
                }
            }
        }

        let mut out = Vec::new();
        for block in &self.blocks {
            collect(block, &mut out);
        }
        out
    }
}
