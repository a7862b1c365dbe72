#[cfg(test)]
mod tests {
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::registry::Registry;

    use crate::block::Block;
    use crate::component::Component;
    use crate::experiment::Experiment;
    use crate::page::Page;
    use crate::run_if::RunIf;
    use crate::session::Session;
    use crate::validate::EXPERIMENT_NODE;

    // ───────────────────────────────────────────────────────────────────────
    // Event capture
    // ───────────────────────────────────────────────────────────────────────

    #[derive(Debug, Clone)]
    struct Captured {
        level: Level,
        fields: Vec<(String, String)>,
    }

    impl Captured {
        fn field(&self, name: &str) -> Option<&str> {
            self.fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        }
    }

    #[derive(Default)]
    struct FieldVisitor(Vec<(String, String)>);

    impl Visit for FieldVisitor {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.0.push((field.name().to_string(), value.to_string()));
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.push((field.name().to_string(), format!("{:?}", value)));
        }
    }

    struct Recorder {
        events: Arc<Mutex<Vec<Captured>>>,
    }

    impl<S: Subscriber> Layer<S> for Recorder {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = FieldVisitor::default();
            event.record(&mut visitor);
            self.events.lock().unwrap().push(Captured {
                level: *event.metadata().level(),
                fields: visitor.0,
            });
        }
    }

    /// Runs `run` under a thread-local subscriber and returns its warnings.
    fn warnings_during<T>(run: impl FnOnce() -> T) -> (T, Vec<Captured>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let subscriber = Registry::default().with(Recorder {
            events: Arc::clone(&events),
        });
        let result = tracing::subscriber::with_default(subscriber, run);
        let warnings = events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.level == Level::WARN)
            .cloned()
            .collect();
        (result, warnings)
    }

    fn pages_block(session: &Session, text: &str) -> Block {
        Block::with_pages(session, vec![Page::new(session, text)])
    }

    // ───────────────────────────────────────────────────────────────────────
    // Shared permutation
    // ───────────────────────────────────────────────────────────────────────

    #[test]
    fn test_counterbalance_with_treatments_warns_once() {
        let session = Session::default();
        let a = pages_block(&session, "a");
        let b = pages_block(&session, "b");
        let parent = Block::with_blocks(&session, vec![a.clone(), b.clone()])
            .counterbalance(vec![a.handle(), b.handle()])
            .treatments(vec![vec![a.handle()], vec![b.handle()]]);

        let (result, warnings) = warnings_during(|| parent.validate());
        assert!(result.is_ok());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field("node"), Some(parent.id()));

        let experiment = Experiment::new(vec![parent.clone()]);
        let (result, warnings) = warnings_during(|| experiment.compile(&session));
        assert!(result.is_ok());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field("node"), Some(parent.id()));
    }

    #[test]
    fn test_root_counterbalance_with_treatments_names_experiment() {
        let session = Session::default();
        let a = pages_block(&session, "a");
        let b = pages_block(&session, "b");
        let experiment = Experiment::new(vec![a.clone(), b.clone()])
            .counterbalance(vec![a.handle(), b.handle()])
            .treatments(vec![vec![a.handle()], vec![b.handle()]]);

        let (result, warnings) = warnings_during(|| experiment.compile(&session));
        assert!(result.is_ok());
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field("node"), Some(EXPERIMENT_NODE));
    }

    // ───────────────────────────────────────────────────────────────────────
    // Treatments
    // ───────────────────────────────────────────────────────────────────────

    #[test]
    fn test_treatment_collision_warns_with_both_indices() {
        let session = Session::default();
        let b1 = pages_block(&session, "one");
        let b2 = pages_block(&session, "two");
        let experiment = Experiment::new(vec![b1.clone(), b2.clone()])
            .treatments(vec![vec![b1.handle()], vec![b1.handle(), b2.handle()]]);

        let (result, warnings) = warnings_during(|| experiment.compile(&session));
        assert!(result.is_ok());
        assert_eq!(warnings.len(), 1);
        let warning = &warnings[0];
        assert_eq!(warning.field("node"), Some(EXPERIMENT_NODE));
        assert_eq!(warning.field("block"), Some(b1.id()));
        assert_eq!(warning.field("previous"), Some("0"));
        assert_eq!(warning.field("permutation"), Some("1"));
    }

    #[test]
    fn test_treatment_overwriting_run_if_warns() {
        let session = Session::default();
        let gate = Page::new(&session, "Continue?");
        let guarded = pages_block(&session, "guarded").run_if(RunIf::on_page(&gate));
        let other = pages_block(&session, "other");
        let experiment = Experiment::new(vec![
            Block::with_pages(&session, vec![gate]),
            guarded.clone(),
            other.clone(),
        ])
        .treatments(vec![vec![guarded.handle()], vec![other.handle()]]);

        let (result, warnings) = warnings_during(|| experiment.compile(&session));
        let document = result.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field("node"), Some(guarded.id()));
        assert_eq!(document.blocks[1].run_if.as_ref().unwrap().permutation, Some(0));
    }

    #[test]
    fn test_plain_treatments_are_silent() {
        let session = Session::default();
        let b1 = pages_block(&session, "one");
        let b2 = pages_block(&session, "two");
        let experiment = Experiment::new(vec![b1.clone(), b2.clone()])
            .treatments(vec![vec![b1.handle()], vec![b2.handle()]]);

        let (result, warnings) = warnings_during(|| experiment.compile(&session));
        assert!(result.is_ok());
        assert!(warnings.is_empty());
    }
}
