//! Authoring session state: identifier issuance and the sampling registry.
//!
//! One [`Session`] backs one experiment. Every constructor takes it by shared
//! reference, so a session stays usable from anywhere in an authoring script
//! without global state. Start a fresh session for each independent
//! experiment, otherwise identifiers and sample slots keep counting from the
//! previous one.

use std::cell::{Cell, Ref, RefCell, RefMut};

use tracing::debug;

use crate::sampling::{SampleFrom, SampleSpec, SamplingRegistry};
use crate::validate::ExperimentError;

/// Issues strictly increasing decimal identifiers.
#[derive(Debug, Default)]
pub struct IdGenerator {
    current: Cell<u64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first identifier issued is `seed + 1`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            current: Cell::new(seed),
        }
    }

    pub fn next_id(&self) -> String {
        let next = self.current.get() + 1;
        self.current.set(next);
        next.to_string()
    }
}

#[derive(Debug, Default)]
pub struct Session {
    ids: IdGenerator,
    registry: RefCell<SamplingRegistry>,
}

impl Session {
    pub fn new(ids: IdGenerator) -> Self {
        Self {
            ids,
            registry: RefCell::new(SamplingRegistry::default()),
        }
    }

    pub fn next_id(&self) -> String {
        self.ids.next_id()
    }

    /// A placeholder that draws a value not drawn by any other placeholder
    /// on the same bank.
    pub fn sample(&self, bank: impl Into<String>) -> SampleFrom {
        SampleFrom::fresh(self, bank.into())
    }

    /// A placeholder with explicit sampling modifiers.
    pub fn sample_from(
        &self,
        bank: impl Into<String>,
        spec: SampleSpec,
    ) -> Result<SampleFrom, ExperimentError> {
        SampleFrom::new(self, bank, spec)
    }

    pub fn registry(&self) -> Ref<'_, SamplingRegistry> {
        self.registry.borrow()
    }

    pub(crate) fn registry_mut(&self) -> RefMut<'_, SamplingRegistry> {
        self.registry.borrow_mut()
    }
}

/// Runs `build` inside a fresh session seeded from `ids`.
///
/// The session lives exactly as long as the closure; whatever the closure
/// returns, success or error, is handed back unchanged.
///
/// ```
/// use speriment_compiler::{make_experiment, Block, ExperimentError, Experiment, IdGenerator, Item};
///
/// let json = make_experiment(IdGenerator::new(), |session| {
///     let welcome = Item::new(session, "Welcome!");
///     let block = Block::with_items(session, vec![welcome]);
///     Experiment::new(vec![block]).to_json(session)
/// })?;
/// assert!(json.contains("Welcome!"));
/// # Ok::<(), ExperimentError>(())
/// ```
pub fn make_experiment<T, E, F>(ids: IdGenerator, build: F) -> Result<T, E>
where
    F: FnOnce(&Session) -> Result<T, E>,
{
    let session = Session::new(ids);
    debug!("authoring session opened");
    let result = build(&session);
    debug!(ok = result.is_ok(), "authoring session closed");
    result
}
