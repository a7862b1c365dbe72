//! Desugaring pass.
//!
//! Rewrites a private copy of the authoring tree in place so that lowering
//! only ever sees canonical shapes: items hold page lists, feedback is spliced
//! into those lists, treatments have become permutation guards, and freetext
//! pages own their text box option.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::block::Block;
use crate::component::{Component, Feedback};
use crate::experiment::Experiment;
use crate::item::{Item, ItemContents};
use crate::page::{AnswerOption, Page};
use crate::run_if::{BlockRef, RunIf};
use crate::session::Session;
use crate::validate::{ExperimentError, EXPERIMENT_NODE};

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Block and experiment rules are checked here, before their treatments are
/// consumed; every other node is checked when it is lowered.
pub(crate) fn desugar_experiment(
    experiment: &mut Experiment,
    session: &Session,
) -> Result<(), ExperimentError> {
    experiment.validate()?;

    let treatments = std::mem::take(&mut experiment.treatments);
    apply_treatments(EXPERIMENT_NODE, &mut experiment.blocks, &treatments);

    for block in &mut experiment.blocks {
        desugar_block(block, session)?;
    }
    Ok(())
}

fn desugar_block(block: &mut Block, session: &Session) -> Result<(), ExperimentError> {
    block.validate()?;

    let owner = block.id().to_string();
    let treatments = std::mem::take(&mut block.treatments);
    if let Some(children) = &mut block.blocks {
        apply_treatments(&owner, children, &treatments);
    }

    if let Some(pages) = &mut block.pages {
        for page in pages.iter_mut() {
            add_freetext_option(page, session);
        }
    }
    if let Some(items) = &mut block.items {
        for item in items.iter_mut() {
            desugar_item(item, session);
        }
    }
    if let Some(groups) = &mut block.groups {
        for item in groups.iter_mut().flatten() {
            desugar_item(item, session);
        }
    }
    if let Some(children) = &mut block.blocks {
        for child in children.iter_mut() {
            desugar_block(child, session)?;
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREATMENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Gives every block named in sublist `i` a `permutation = i` guard. A block
/// named in several sublists keeps the last index.
fn apply_treatments(owner: &str, children: &mut [Block], treatments: &[Vec<BlockRef>]) {
    if treatments.is_empty() {
        return;
    }

    let mut assigned: HashMap<&str, usize> = HashMap::new();
    for (permutation, sublist) in treatments.iter().enumerate() {
        for reference in sublist {
            if let Some(previous) = assigned.insert(reference.id(), permutation) {
                if previous != permutation {
                    warn!(
                        node = owner,
                        block = reference.id(),
                        previous,
                        permutation,
                        "block appears in more than one treatment; the last one wins"
                    );
                }
            }
        }
    }

    for child in children.iter_mut() {
        let Some(&permutation) = assigned.get(child.id()) else {
            continue;
        };
        if let Some(existing) = &child.run_if {
            if existing.permutation.is_none() {
                warn!(
                    node = child.id(),
                    permutation,
                    "treatment replaces the block's own run_if"
                );
            }
        }
        child.run_if = Some(RunIf::on_permutation(permutation as u32));
    }
    debug!(node = owner, treatments = treatments.len(), "treatments expanded");
}

// ═══════════════════════════════════════════════════════════════════════════════
// ITEMS AND FEEDBACK
// ═══════════════════════════════════════════════════════════════════════════════

fn desugar_item(item: &mut Item, session: &Session) {
    let placeholder = ItemContents::Pages(Vec::new());
    let pages = match std::mem::replace(&mut item.contents, placeholder) {
        ItemContents::Text(text) => vec![Page::new(session, text)],
        ItemContents::Page(page) => vec![*page],
        ItemContents::Pages(pages) => pages,
    };

    let mut spliced = Vec::with_capacity(pages.len());
    for page in pages {
        splice_feedback(page, session, &mut spliced);
    }
    for page in spliced.iter_mut() {
        add_freetext_option(page, session);
    }
    item.contents = ItemContents::Pages(spliced);
}

/// Pushes `page`, then its unconditional feedback page, then one guarded
/// feedback page per option carrying feedback, in option order.
fn splice_feedback(mut page: Page, session: &Session, out: &mut Vec<Page>) {
    let mut feedback_pages = Vec::new();

    if let Some(feedback) = page.feedback.take() {
        feedback_pages.push(feedback_page(feedback, session));
    }

    let trigger = page.handle();
    for option in page.options.iter_mut() {
        let Some(feedback) = option.feedback.take() else {
            continue;
        };
        let guard = RunIf {
            page: Some(trigger.clone()),
            option: Some(option.handle()),
            ..RunIf::default()
        };
        feedback_pages.push(feedback_page(feedback, session).run_if(guard));
    }

    out.push(page);
    out.append(&mut feedback_pages);
}

fn feedback_page(feedback: Feedback, session: &Session) -> Page {
    match feedback {
        Feedback::Text(text) => Page::new(session, text),
        Feedback::Page(page) => *page,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FREETEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// A freetext page without options gets the text box option it renders.
fn add_freetext_option(page: &mut Page, session: &Session) {
    if page.is_freetext() && page.options.is_empty() {
        page.options.push(AnswerOption::blank(session));
    }
}
