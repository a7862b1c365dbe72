//! The capability set shared by every owned node, and the value types nodes
//! carry.

use indexmap::IndexMap;

use crate::page::Page;
use crate::sampling::SampleFrom;
use crate::session::Session;
use crate::validate::ExperimentError;

/// Free-form metadata passed through to the results file.
pub type Tags = IndexMap<String, String>;

/// Identity, validation and re-identifying deep copies.
pub trait Component: Clone {
    fn id(&self) -> &str;

    /// Checks the node's own structural rules. Children are validated when
    /// they are lowered.
    fn validate(&self) -> Result<(), ExperimentError>;

    /// Deep copy with a fresh identifier on this node and every owned
    /// Block, Item, Page and Option below it.
    ///
    /// Conditional guards inside the copy keep pointing at the nodes they
    /// referenced in the original.
    fn duplicate(&self, session: &Session) -> Self;
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// A literal string or a value sampled per participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Text {
    Literal(String),
    Sample(SampleFrom),
}

impl From<&str> for Text {
    fn from(value: &str) -> Self {
        Text::Literal(value.to_string())
    }
}

impl From<String> for Text {
    fn from(value: String) -> Self {
        Text::Literal(value)
    }
}

impl From<SampleFrom> for Text {
    fn from(value: SampleFrom) -> Self {
        Text::Sample(value)
    }
}

/// Page text: one piece of text or several shown in sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum PageText {
    Single(Text),
    Lines(Vec<Text>),
}

impl From<Text> for PageText {
    fn from(value: Text) -> Self {
        PageText::Single(value)
    }
}

impl From<&str> for PageText {
    fn from(value: &str) -> Self {
        PageText::Single(value.into())
    }
}

impl From<String> for PageText {
    fn from(value: String) -> Self {
        PageText::Single(value.into())
    }
}

impl From<SampleFrom> for PageText {
    fn from(value: SampleFrom) -> Self {
        PageText::Single(value.into())
    }
}

impl From<Vec<Text>> for PageText {
    fn from(lines: Vec<Text>) -> Self {
        PageText::Lines(lines)
    }
}

impl From<Vec<&str>> for PageText {
    fn from(lines: Vec<&str>) -> Self {
        PageText::Lines(lines.into_iter().map(Text::from).collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANSWERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Whether an answer counts as correct: a flag for choices, a regular
/// expression for text boxes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correct {
    Flag(bool),
    Pattern(String),
}

impl From<bool> for Correct {
    fn from(value: bool) -> Self {
        Correct::Flag(value)
    }
}

impl From<&str> for Correct {
    fn from(value: &str) -> Self {
        Correct::Pattern(value.to_string())
    }
}

impl From<String> for Correct {
    fn from(value: String) -> Self {
        Correct::Pattern(value)
    }
}

/// Keyboard selection: `Default(true)` binds f/j to a two-option page,
/// `Keys` binds one key per option from left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    Default(bool),
    Keys(Vec<String>),
}

impl From<bool> for Keyboard {
    fn from(value: bool) -> Self {
        Keyboard::Default(value)
    }
}

impl From<Vec<&str>> for Keyboard {
    fn from(keys: Vec<&str>) -> Self {
        Keyboard::Keys(keys.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for Keyboard {
    fn from(keys: Vec<String>) -> Self {
        Keyboard::Keys(keys)
    }
}

/// Shown after a page is answered, or after one option is chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    Text(Text),
    Page(Box<Page>),
}

impl Feedback {
    pub(crate) fn duplicate(&self, session: &Session) -> Self {
        match self {
            Feedback::Text(text) => Feedback::Text(text.clone()),
            Feedback::Page(page) => Feedback::Page(Box::new(page.duplicate(session))),
        }
    }

    /// Feedback pages are for display only.
    pub(crate) fn validate(&self, node: &str) -> Result<(), ExperimentError> {
        if let Feedback::Page(page) = self {
            if !page.options.is_empty() {
                return Err(ExperimentError::structure(
                    node,
                    format!("feedback page {} must not have options", page.id()),
                ));
            }
        }
        Ok(())
    }
}

impl From<&str> for Feedback {
    fn from(value: &str) -> Self {
        Feedback::Text(value.into())
    }
}

impl From<String> for Feedback {
    fn from(value: String) -> Self {
        Feedback::Text(value.into())
    }
}

impl From<SampleFrom> for Feedback {
    fn from(value: SampleFrom) -> Self {
        Feedback::Text(value.into())
    }
}

impl From<Page> for Feedback {
    fn from(page: Page) -> Self {
        Feedback::Page(Box::new(page))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOURCES
// ═══════════════════════════════════════════════════════════════════════════════

/// An image, audio or video file shown with a page or option.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub source: Text,
    pub media_type: Option<String>,
    pub autoplay: bool,
    pub controls: bool,
    pub required: bool,
}

impl Resource {
    pub fn new(source: impl Into<Text>) -> Self {
        Self {
            source: source.into(),
            media_type: None,
            autoplay: false,
            controls: true,
            required: false,
        }
    }

    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    pub fn controls(mut self, controls: bool) -> Self {
        self.controls = controls;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

/// A resource entry as authored: a bare filename, a full record, or a sampled
/// filename.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSpec {
    File(String),
    Full(Resource),
    Sample(SampleFrom),
}

impl From<&str> for ResourceSpec {
    fn from(value: &str) -> Self {
        ResourceSpec::File(value.to_string())
    }
}

impl From<String> for ResourceSpec {
    fn from(value: String) -> Self {
        ResourceSpec::File(value)
    }
}

impl From<Resource> for ResourceSpec {
    fn from(value: Resource) -> Self {
        ResourceSpec::Full(value)
    }
}

impl From<SampleFrom> for ResourceSpec {
    fn from(value: SampleFrom) -> Self {
        ResourceSpec::Sample(value)
    }
}
