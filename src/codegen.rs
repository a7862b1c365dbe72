//! Lowering of the desugared tree into the wire document.
//!
//! One recursive pass that, per node: runs the node's validation, resolves
//! guards through the [`ReferenceIndex`], assigns sample slots, normalizes
//! resources and copies the remaining fields into their wire names. Bank
//! usage is checked as each bank scope closes.

use tracing::debug;

use crate::block::Block;
use crate::component::{Component, Feedback, PageText, ResourceSpec, Text};
use crate::document::{
    BlockDocument, CorrectDocument, ExperimentDocument, FeedbackDocument, ItemDocument,
    KeyboardDocument, OptionDocument, PageDocument, PageTextDocument, ResourceDocument,
    ResourceRecord, RunIfDocument, SampleDocument, TextDocument,
};
use crate::experiment::Experiment;
use crate::item::Item;
use crate::page::{AnswerOption, Page};
use crate::run_if::{BlockRef, RunIf};
use crate::sampling::{ResolvedSlot, SampleFrom, SamplingRegistry, SlotAllocator};
use crate::scope::{BankScopes, ReferenceIndex};
use crate::session::Session;
use crate::validate::{ExperimentError, EXPERIMENT_NODE};

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) fn lower_experiment(
    experiment: &Experiment,
    index: &ReferenceIndex,
    session: &Session,
) -> Result<ExperimentDocument, ExperimentError> {
    let registry = session.registry();
    let mut lowering = Lowering {
        index,
        registry: &registry,
        slots: SlotAllocator::new(&registry),
        scopes: BankScopes::default(),
    };

    lowering.scopes.push(EXPERIMENT_NODE, &experiment.banks);
    let blocks = experiment
        .blocks
        .iter()
        .map(|block| lowering.lower_block(block))
        .collect::<Result<Vec<_>, _>>()?;
    lowering.scopes.pop()?;

    debug!(blocks = blocks.len(), "experiment lowered");
    Ok(ExperimentDocument {
        blocks,
        exchangeable: ids(&experiment.exchangeable),
        counterbalance: ids(&experiment.counterbalance),
        banks: experiment.banks.clone(),
    })
}

fn ids(refs: &[BlockRef]) -> Vec<String> {
    refs.iter().map(|r| r.id().to_string()).collect()
}

struct Lowering<'a> {
    index: &'a ReferenceIndex,
    registry: &'a SamplingRegistry,
    slots: SlotAllocator,
    scopes: BankScopes<'a>,
}

impl<'a> Lowering<'a> {
    // ───────────────────────────────────────────────────────────────────────────
    // Containers
    // ───────────────────────────────────────────────────────────────────────────

    fn lower_block(&mut self, block: &'a Block) -> Result<BlockDocument, ExperimentError> {
        block.validate()?;
        self.scopes.push(block.id(), &block.banks);

        let pages = match &block.pages {
            Some(pages) => Some(self.lower_pages(pages)?),
            None => None,
        };
        let items = match &block.items {
            Some(items) => Some(self.lower_items(items)?),
            None => None,
        };
        let groups = match &block.groups {
            Some(groups) => Some(
                groups
                    .iter()
                    .map(|group| self.lower_items(group))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };
        let blocks = match &block.blocks {
            Some(children) => Some(
                children
                    .iter()
                    .map(|child| self.lower_block(child))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };
        let run_if = self.lower_run_if(block.id(), block.run_if.as_ref())?;

        self.scopes.pop()?;
        debug!(node = block.id(), "block lowered");

        Ok(BlockDocument {
            id: block.id().to_string(),
            pages,
            items,
            groups,
            blocks,
            exchangeable: ids(&block.exchangeable),
            counterbalance: ids(&block.counterbalance),
            latin_square: block.latin_square,
            pseudorandom: block.pseudorandom,
            criterion: block.criterion,
            cutoff: block.cutoff,
            run_if,
            banks: block.banks.clone(),
        })
    }

    fn lower_items(&mut self, items: &[Item]) -> Result<Vec<ItemDocument>, ExperimentError> {
        items.iter().map(|item| self.lower_item(item)).collect()
    }

    fn lower_item(&mut self, item: &Item) -> Result<ItemDocument, ExperimentError> {
        item.validate()?;
        let pages = self.lower_pages(item.pages())?;
        let condition = self.lower_optional_text(item.id(), item.condition.as_ref())?;
        let run_if = self.lower_run_if(item.id(), item.run_if.as_ref())?;

        Ok(ItemDocument {
            id: item.id().to_string(),
            pages,
            condition,
            tags: item.tags.clone(),
            run_if,
        })
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Pages and options
    // ───────────────────────────────────────────────────────────────────────────

    fn lower_pages(&mut self, pages: &[Page]) -> Result<Vec<PageDocument>, ExperimentError> {
        pages.iter().map(|page| self.lower_page(page)).collect()
    }

    fn lower_page(&mut self, page: &Page) -> Result<PageDocument, ExperimentError> {
        page.validate()?;
        let node = page.id();

        let text = match &page.text {
            PageText::Single(text) => PageTextDocument::Single(self.lower_text(node, text)?),
            PageText::Lines(lines) => PageTextDocument::Lines(
                lines
                    .iter()
                    .map(|line| self.lower_text(node, line))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };
        let options = page
            .options
            .iter()
            .map(|option| self.lower_option(option))
            .collect::<Result<Vec<_>, _>>()?;
        let feedback = self.lower_feedback(node, page.feedback.as_ref())?;
        let resources = self.lower_resources(node, &page.resources)?;
        let condition = self.lower_optional_text(node, page.condition.as_ref())?;
        let run_if = self.lower_run_if(node, page.run_if.as_ref())?;

        Ok(PageDocument {
            id: node.to_string(),
            text,
            options,
            feedback,
            correct: page.correct.as_ref().map(CorrectDocument::from),
            resources,
            condition,
            tags: page.tags.clone(),
            ordered: page.ordered,
            exclusive: page.exclusive,
            freetext: page.freetext,
            keyboard: page.keyboard.as_ref().map(KeyboardDocument::from),
            run_if,
        })
    }

    fn lower_option(&mut self, option: &AnswerOption) -> Result<OptionDocument, ExperimentError> {
        option.validate()?;
        let node = option.id();

        let text = self.lower_optional_text(node, option.text.as_ref())?;
        let feedback = self.lower_feedback(node, option.feedback.as_ref())?;
        let resources = self.lower_resources(node, &option.resources)?;

        Ok(OptionDocument {
            id: node.to_string(),
            text,
            correct: option.correct.as_ref().map(CorrectDocument::from),
            feedback,
            resources,
            tags: option.tags.clone(),
        })
    }

    /// Feedback still attached here sits on a page placed directly in a
    /// block; the runner shows it in place.
    fn lower_feedback(
        &mut self,
        node: &str,
        feedback: Option<&Feedback>,
    ) -> Result<Option<FeedbackDocument>, ExperimentError> {
        Ok(match feedback {
            None => None,
            Some(Feedback::Text(text)) => Some(FeedbackDocument::Text(self.lower_text(node, text)?)),
            Some(Feedback::Page(page)) => Some(FeedbackDocument::Page(Box::new(self.lower_page(page)?))),
        })
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Values
    // ───────────────────────────────────────────────────────────────────────────

    fn lower_resources(
        &mut self,
        node: &str,
        resources: &[ResourceSpec],
    ) -> Result<Vec<ResourceDocument>, ExperimentError> {
        resources
            .iter()
            .map(|resource| self.lower_resource(node, resource))
            .collect()
    }

    /// Bare filenames become full records with the runner's defaults.
    fn lower_resource(
        &mut self,
        node: &str,
        resource: &ResourceSpec,
    ) -> Result<ResourceDocument, ExperimentError> {
        Ok(match resource {
            ResourceSpec::File(source) => ResourceDocument::Record(ResourceRecord {
                source: TextDocument::Literal(source.clone()),
                media_type: None,
                autoplay: false,
                controls: true,
                required: false,
            }),
            ResourceSpec::Full(resource) => ResourceDocument::Record(ResourceRecord {
                source: self.lower_text(node, &resource.source)?,
                media_type: resource.media_type.clone(),
                autoplay: resource.autoplay,
                controls: resource.controls,
                required: resource.required,
            }),
            ResourceSpec::Sample(sample) => ResourceDocument::Sample(self.lower_sample(node, sample)?),
        })
    }

    fn lower_optional_text(
        &mut self,
        node: &str,
        text: Option<&Text>,
    ) -> Result<Option<TextDocument>, ExperimentError> {
        text.map(|text| self.lower_text(node, text)).transpose()
    }

    fn lower_text(&mut self, node: &str, text: &Text) -> Result<TextDocument, ExperimentError> {
        Ok(match text {
            Text::Literal(literal) => TextDocument::Literal(literal.clone()),
            Text::Sample(sample) => TextDocument::Sample(self.lower_sample(node, sample)?),
        })
    }

    fn lower_sample(&mut self, node: &str, sample: &SampleFrom) -> Result<SampleDocument, ExperimentError> {
        let slot = sample.resolve(node, self.registry, &mut self.slots)?;
        self.scopes.record(node, sample, slot)?;
        debug!(node, bank = sample.bank(), ?slot, "sample resolved");

        let (variable, not_variable) = match slot {
            ResolvedSlot::Variable(slot) => (Some(slot), None),
            ResolvedSlot::NotVariable(slot) => (None, Some(slot)),
            ResolvedSlot::Unconstrained => (None, None),
        };
        Ok(SampleDocument {
            sample_from: sample.bank().to_string(),
            variable,
            not_variable,
            field: sample.field().map(str::to_string),
            with_replacement: slot == ResolvedSlot::Unconstrained,
        })
    }

    fn lower_run_if(
        &self,
        node: &str,
        run_if: Option<&RunIf>,
    ) -> Result<Option<RunIfDocument>, ExperimentError> {
        run_if.map(|run_if| self.index.resolve(node, run_if)).transpose()
    }
}
