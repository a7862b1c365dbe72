//! Deferred per-participant sampling from named banks.
//!
//! A [`SampleFrom`] stands in for a piece of text, a resource or a condition.
//! The compiler never picks values; it assigns each placeholder an integer
//! slot so the runner can draw one bank value per slot and keep placeholders
//! that share a slot in agreement.
//!
//! Slots come from two counters per bank:
//! - the session's [`SamplingRegistry`], which reserves a slot the first time
//!   a variable token is seen while the tree is being built;
//! - a compile-scoped [`SlotAllocator`], seeded from the registry, which hands
//!   out a never-used slot to every placeholder without a variable.
//!
//! Named variables therefore always sit below fresh slots, and compiling the
//! same tree twice yields the same assignment.

use indexmap::IndexMap;

use crate::session::Session;
use crate::validate::ExperimentError;

/// How a placeholder relates to other placeholders on the same bank.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sampling {
    /// A value no other slot-holding placeholder on the bank draws.
    Fresh,
    /// The same value as every placeholder with this token.
    Variable(String),
    /// A value different from the one drawn for this token.
    NotVariable(String),
    /// Any value, repeats allowed.
    WithReplacement,
}

/// Loose, author-facing modifiers for [`SampleFrom::new`].
#[derive(Debug, Clone, Default)]
pub struct SampleSpec {
    variable: Option<String>,
    not_variable: Option<String>,
    field: Option<String>,
    with_replacement: bool,
}

impl SampleSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(mut self, token: impl ToString) -> Self {
        self.variable = Some(token.to_string());
        self
    }

    pub fn not_variable(mut self, token: impl ToString) -> Self {
        self.not_variable = Some(token.to_string());
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_replacement(mut self, with_replacement: bool) -> Self {
        self.with_replacement = with_replacement;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleFrom {
    bank: String,
    sampling: Sampling,
    field: Option<String>,
}

impl SampleFrom {
    /// Registers the bank with the session and reserves a slot for the
    /// variable or not_variable token, if any.
    pub fn new(
        session: &Session,
        bank: impl Into<String>,
        spec: SampleSpec,
    ) -> Result<Self, ExperimentError> {
        let bank = bank.into();
        let sampling = match (spec.variable, spec.not_variable, spec.with_replacement) {
            (None, None, false) => Sampling::Fresh,
            (Some(token), None, false) => Sampling::Variable(token),
            (None, Some(token), false) => Sampling::NotVariable(token),
            (None, None, true) => Sampling::WithReplacement,
            _ => {
                return Err(ExperimentError::invalid_combination(
                    format!("sample from `{}`", bank),
                    "at most one of variable, not_variable and with_replacement may be given",
                ));
            }
        };

        {
            let mut registry = session.registry_mut();
            match &sampling {
                Sampling::Variable(token) | Sampling::NotVariable(token) => {
                    registry.reserve(&bank, token);
                }
                Sampling::Fresh | Sampling::WithReplacement => registry.register_bank(&bank),
            }
        }

        Ok(Self {
            bank,
            sampling,
            field: spec.field,
        })
    }

    pub(crate) fn fresh(session: &Session, bank: String) -> Self {
        session.registry_mut().register_bank(&bank);
        Self {
            bank,
            sampling: Sampling::Fresh,
            field: None,
        }
    }

    /// Reads one field of a record bank.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn bank(&self) -> &str {
        &self.bank
    }

    pub fn sampling(&self) -> &Sampling {
        &self.sampling
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn is_with_replacement(&self) -> bool {
        self.sampling == Sampling::WithReplacement
    }

    /// Maps this placeholder to its slot. `node` names the component holding
    /// the placeholder for error reporting.
    pub(crate) fn resolve(
        &self,
        node: &str,
        registry: &SamplingRegistry,
        slots: &mut SlotAllocator,
    ) -> Result<ResolvedSlot, ExperimentError> {
        let registered = |token: &str| {
            registry.slot_of(&self.bank, token).ok_or_else(|| {
                ExperimentError::missing_attribute(
                    node,
                    format!(
                        "variable `{}` was never registered for bank `{}`; \
                         compile with the session that built the tree",
                        token, self.bank
                    ),
                )
            })
        };

        Ok(match &self.sampling {
            Sampling::Variable(token) => ResolvedSlot::Variable(registered(token)?),
            Sampling::NotVariable(token) => ResolvedSlot::NotVariable(registered(token)?),
            Sampling::Fresh => ResolvedSlot::Variable(slots.fresh(&self.bank)),
            Sampling::WithReplacement => ResolvedSlot::Unconstrained,
        })
    }
}

/// The slot a placeholder compiled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolvedSlot {
    Variable(usize),
    /// Draw anything except the value in this slot.
    NotVariable(usize),
    Unconstrained,
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
struct BankSlots {
    next: usize,
    variables: IndexMap<String, usize>,
}

/// Construction-time slot reservations, per bank.
#[derive(Debug, Clone, Default)]
pub struct SamplingRegistry {
    banks: IndexMap<String, BankSlots>,
}

impl SamplingRegistry {
    pub(crate) fn register_bank(&mut self, bank: &str) {
        if !self.banks.contains_key(bank) {
            self.banks.insert(bank.to_string(), BankSlots::default());
        }
    }

    /// Idempotent: a token keeps the slot it was first given.
    pub(crate) fn reserve(&mut self, bank: &str, token: &str) -> usize {
        let slots = self.banks.entry(bank.to_string()).or_default();
        if let Some(slot) = slots.variables.get(token) {
            return *slot;
        }
        let slot = slots.next;
        slots.next += 1;
        slots.variables.insert(token.to_string(), slot);
        slot
    }

    pub fn slot_of(&self, bank: &str, token: &str) -> Option<usize> {
        self.banks.get(bank)?.variables.get(token).copied()
    }

    /// Number of slots reserved by variable tokens on `bank`.
    pub fn reserved(&self, bank: &str) -> usize {
        self.banks.get(bank).map(|slots| slots.next).unwrap_or(0)
    }

    pub fn banks(&self) -> impl Iterator<Item = &str> {
        self.banks.keys().map(String::as_str)
    }
}

/// Compile-scoped counters for placeholders without a variable.
#[derive(Debug, Clone, Default)]
pub(crate) struct SlotAllocator {
    next: IndexMap<String, usize>,
}

impl SlotAllocator {
    pub(crate) fn new(registry: &SamplingRegistry) -> Self {
        Self {
            next: registry
                .banks
                .iter()
                .map(|(bank, slots)| (bank.clone(), slots.next))
                .collect(),
        }
    }

    pub(crate) fn fresh(&mut self, bank: &str) -> usize {
        let next = self.next.entry(bank.to_string()).or_insert(0);
        let slot = *next;
        *next += 1;
        slot
    }
}
