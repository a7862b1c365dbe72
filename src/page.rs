//! Pages (one screen each) and the answer options they offer.

use crate::component::{Component, Correct, Feedback, Keyboard, PageText, ResourceSpec, Tags, Text};
use crate::run_if::{OptionRef, PageRef, RunIf};
use crate::session::Session;
use crate::validate::{check_pattern, ExperimentError};

// ═══════════════════════════════════════════════════════════════════════════════
// ANSWER OPTION
// ═══════════════════════════════════════════════════════════════════════════════

/// One answer choice on a page. Whether it renders as a radio button, check
/// box, dropdown entry or text box is decided by the containing page.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOption {
    id: String,
    pub text: Option<Text>,
    pub correct: Option<Correct>,
    pub feedback: Option<Feedback>,
    pub resources: Vec<ResourceSpec>,
    pub tags: Tags,
}

impl AnswerOption {
    pub fn new(session: &Session, text: impl Into<Text>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::blank(session)
        }
    }

    /// An option without a label, as used for text boxes.
    pub fn blank(session: &Session) -> Self {
        Self {
            id: session.next_id(),
            text: None,
            correct: None,
            feedback: None,
            resources: Vec::new(),
            tags: Tags::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn correct(mut self, correct: impl Into<Correct>) -> Self {
        self.correct = Some(correct.into());
        self
    }

    pub fn feedback(mut self, feedback: impl Into<Feedback>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    pub fn resource(mut self, resource: impl Into<ResourceSpec>) -> Self {
        self.resources.push(resource.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn handle(&self) -> OptionRef {
        OptionRef {
            id: self.id.clone(),
        }
    }
}

impl Component for AnswerOption {
    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ExperimentError> {
        match &self.feedback {
            Some(feedback) => feedback.validate(&self.id),
            None => Ok(()),
        }
    }

    fn duplicate(&self, session: &Session) -> Self {
        Self {
            id: session.next_id(),
            feedback: self.feedback.as_ref().map(|f| f.duplicate(session)),
            ..self.clone()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAGE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    id: String,
    pub text: PageText,
    pub options: Vec<AnswerOption>,
    pub feedback: Option<Feedback>,
    pub correct: Option<Correct>,
    pub resources: Vec<ResourceSpec>,
    pub condition: Option<Text>,
    pub tags: Tags,
    /// Options may be reversed but never shuffled.
    pub ordered: Option<bool>,
    /// Only one option may be chosen.
    pub exclusive: Option<bool>,
    /// The single option is a text box.
    pub freetext: Option<bool>,
    pub keyboard: Option<Keyboard>,
    pub run_if: Option<RunIf>,
}

impl Page {
    pub fn new(session: &Session, text: impl Into<PageText>) -> Self {
        Self {
            id: session.next_id(),
            text: text.into(),
            options: Vec::new(),
            feedback: None,
            correct: None,
            resources: Vec::new(),
            condition: None,
            tags: Tags::new(),
            ordered: None,
            exclusive: None,
            freetext: None,
            keyboard: None,
            run_if: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn options(mut self, options: Vec<AnswerOption>) -> Self {
        self.options = options;
        self
    }

    pub fn feedback(mut self, feedback: impl Into<Feedback>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    pub fn correct(mut self, correct: impl Into<Correct>) -> Self {
        self.correct = Some(correct.into());
        self
    }

    pub fn resources<R: Into<ResourceSpec>>(mut self, resources: Vec<R>) -> Self {
        self.resources = resources.into_iter().map(Into::into).collect();
        self
    }

    pub fn resource(mut self, resource: impl Into<ResourceSpec>) -> Self {
        self.resources.push(resource.into());
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

    pub fn ordered(mut self, ordered: bool) -> Self {
        self.ordered = Some(ordered);
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = Some(exclusive);
        self
    }

    pub fn freetext(mut self, freetext: bool) -> Self {
        self.freetext = Some(freetext);
        self
    }

    pub fn keyboard(mut self, keyboard: impl Into<Keyboard>) -> Self {
        self.keyboard = Some(keyboard.into());
        self
    }

    pub fn run_if(mut self, run_if: RunIf) -> Self {
        self.run_if = Some(run_if);
        self
    }

    pub fn handle(&self) -> PageRef {
        PageRef {
            id: self.id.clone(),
        }
    }

    pub fn is_freetext(&self) -> bool {
        self.freetext == Some(true)
    }

    fn validate_freetext(&self) -> Result<(), ExperimentError> {
        if self.is_freetext() {
            if self.options.len() > 1 {
                return Err(ExperimentError::structure(
                    &self.id,
                    format!(
                        "a freetext page has a single text box option, found {} options",
                        self.options.len()
                    ),
                ));
            }
            let checks = self
                .options
                .iter()
                .map(|option| (option.id.as_str(), &option.correct))
                .chain(std::iter::once((self.id.as_str(), &self.correct)));
            for (node, correct) in checks {
                match correct {
                    Some(Correct::Flag(_)) => {
                        return Err(ExperimentError::type_error(
                            node,
                            "a text box is checked with a regular expression, not a boolean",
                        ));
                    }
                    Some(Correct::Pattern(pattern)) => check_pattern(node, pattern)?,
                    None => {}
                }
            }
        } else {
            let checks = self
                .options
                .iter()
                .map(|option| (option.id.as_str(), &option.correct))
                .chain(std::iter::once((self.id.as_str(), &self.correct)));
            for (node, correct) in checks {
                if let Some(Correct::Pattern(pattern)) = correct {
                    return Err(ExperimentError::type_error(
                        node,
                        format!(
                            "`{}` is a pattern, but choices are marked correct with a boolean",
                            pattern
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    fn validate_keyboard(&self) -> Result<(), ExperimentError> {
        match &self.keyboard {
            Some(Keyboard::Keys(keys)) if keys.len() != self.options.len() => {
                Err(ExperimentError::length_mismatch(
                    &self.id,
                    format!(
                        "{} key bindings given for {} options",
                        keys.len(),
                        self.options.len()
                    ),
                ))
            }
            Some(Keyboard::Default(true)) if self.options.len() != 2 => {
                Err(ExperimentError::unsupported_arity(
                    &self.id,
                    format!(
                        "default key bindings need exactly two options, found {}",
                        self.options.len()
                    ),
                ))
            }
            _ => Ok(()),
        }
    }
}

impl Component for Page {
    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), ExperimentError> {
        self.validate_freetext()?;
        self.validate_keyboard()?;
        if let Some(feedback) = &self.feedback {
            feedback.validate(&self.id)?;
        }
        if let Some(run_if) = &self.run_if {
            run_if.validate(&self.id)?;
        }
        Ok(())
    }

    fn duplicate(&self, session: &Session) -> Self {
        Self {
            id: session.next_id(),
            options: self.options.iter().map(|o| o.duplicate(session)).collect(),
            feedback: self.feedback.as_ref().map(|f| f.duplicate(session)),
            ..self.clone()
        }
    }
}
