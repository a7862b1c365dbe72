#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use crate::block::Block;
    use crate::component::Component;
    use crate::experiment::{bank, Bank, BankEntry, Experiment};
    use crate::page::{AnswerOption, Page};
    use crate::sampling::{SampleFrom, SampleSpec, Sampling};
    use crate::session::Session;
    use crate::validate::{ExperimentError, INV_BANK_SIZE, INV_INVALID_COMBINATION};

    fn sample(session: &Session, bank: &str, spec: SampleSpec) -> SampleFrom {
        session.sample_from(bank, spec).unwrap()
    }

    fn pages_of(session: &Session, texts: Vec<SampleFrom>) -> Vec<Page> {
        texts.into_iter().map(|text| Page::new(session, text)).collect()
    }

    fn page_texts(doc: &Value) -> Vec<Value> {
        doc["blocks"][0]["pages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|page| page["text"].clone())
            .collect()
    }

    fn record(pairs: &[(&str, &str)]) -> BankEntry {
        BankEntry::Record(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<IndexMap<_, _>>(),
        )
    }

    fn compile_pages(session: &Session, pages: Vec<Page>, bank_name: &str, values: Bank) -> Result<Value, ExperimentError> {
        let experiment = Experiment::new(vec![Block::with_pages(session, pages)]).bank(bank_name, values);
        let document = experiment.compile(session)?;
        Ok(serde_json::to_value(document).unwrap())
    }

    #[test]
    fn test_variables_share_slots_and_fresh_samples_do_not() {
        let session = Session::default();
        let texts = vec![
            sample(&session, "bank1", SampleSpec::new().variable("x")),
            sample(&session, "bank1", SampleSpec::new().variable("x")),
            sample(&session, "bank1", SampleSpec::new().variable("y")),
            session.sample("bank1"),
        ];
        let pages = pages_of(&session, texts);
        let doc = compile_pages(&session, pages, "bank1", bank(["a", "b", "c", "d"])).unwrap();

        assert_eq!(
            page_texts(&doc),
            vec![
                json!({ "sampleFrom": "bank1", "variable": 0 }),
                json!({ "sampleFrom": "bank1", "variable": 0 }),
                json!({ "sampleFrom": "bank1", "variable": 1 }),
                json!({ "sampleFrom": "bank1", "variable": 2 }),
            ]
        );
    }

    #[test]
    fn test_registry_reservation_is_idempotent() {
        let session = Session::default();
        sample(&session, "colors", SampleSpec::new().variable(7));
        sample(&session, "colors", SampleSpec::new().variable(7));
        sample(&session, "colors", SampleSpec::new().not_variable("other"));
        session.sample("shapes");

        let registry = session.registry();
        assert_eq!(registry.slot_of("colors", "7"), Some(0));
        assert_eq!(registry.slot_of("colors", "other"), Some(1));
        assert_eq!(registry.reserved("colors"), 2);
        assert_eq!(registry.reserved("shapes"), 0);
        assert_eq!(registry.banks().collect::<Vec<_>>(), vec!["colors", "shapes"]);
    }

    #[test]
    fn test_fresh_slots_are_stable_across_compiles() {
        let session = Session::default();
        let texts = vec![session.sample("words"), session.sample("words")];
        let pages = pages_of(&session, texts);
        let experiment = Experiment::new(vec![Block::with_pages(&session, pages)]).bank("words", bank(["a", "b"]));

        let first = experiment.compile(&session).unwrap();
        let second = experiment.compile(&session).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_conflicting_modifiers_rejected_at_construction() {
        let session = Session::default();
        let err = session
            .sample_from("bank1", SampleSpec::new().variable("x").with_replacement(true))
            .unwrap_err();
        assert_eq!(err.code(), Some(INV_INVALID_COMBINATION));

        let err = session
            .sample_from("bank1", SampleSpec::new().variable("x").not_variable("y"))
            .unwrap_err();
        assert!(matches!(err, ExperimentError::InvalidCombination { .. }));
    }

    #[test]
    fn test_not_enough_values_without_replacement() {
        let session = Session::default();
        let texts = vec![session.sample("pair"), session.sample("pair"), session.sample("pair")];
        let pages = pages_of(&session, texts);
        let err = compile_pages(&session, pages, "pair", bank(["left", "right"])).unwrap_err();
        assert_eq!(err.code(), Some(INV_BANK_SIZE));
    }

    #[test]
    fn test_shared_variables_need_fewer_values() {
        let session = Session::default();
        let texts = vec![
            sample(&session, "pair", SampleSpec::new().variable("x")),
            sample(&session, "pair", SampleSpec::new().variable("x")),
            sample(&session, "pair", SampleSpec::new().variable("x")),
            session.sample("pair"),
        ];
        let pages = pages_of(&session, texts);
        assert!(compile_pages(&session, pages, "pair", bank(["left", "right"])).is_ok());
    }

    #[test]
    fn test_not_variable_counts_an_extra_value() {
        let session = Session::default();
        let texts = vec![
            sample(&session, "one", SampleSpec::new().variable("x")),
            sample(&session, "one", SampleSpec::new().not_variable("x")),
        ];
        let pages = pages_of(&session, texts.clone());
        let err = compile_pages(&session, pages, "one", bank(["only"])).unwrap_err();
        assert!(matches!(err, ExperimentError::InsufficientBankSize { .. }));

        let pages = pages_of(&session, texts);
        let doc = compile_pages(&session, pages, "one", bank(["first", "second"])).unwrap();
        assert_eq!(page_texts(&doc)[1], json!({ "sampleFrom": "one", "notVariable": 0 }));
    }

    #[test]
    fn test_with_replacement_allows_small_banks() {
        let session = Session::default();
        let spec = || SampleSpec::new().with_replacement(true);
        let texts = vec![
            sample(&session, "coin", spec()),
            sample(&session, "coin", spec()),
            sample(&session, "coin", spec()),
        ];
        assert_eq!(texts[0].sampling(), &Sampling::WithReplacement);
        let pages = pages_of(&session, texts);
        let doc = compile_pages(&session, pages, "coin", bank(["heads"])).unwrap();
        assert_eq!(
            page_texts(&doc)[0],
            json!({ "sampleFrom": "coin", "withReplacement": true })
        );
    }

    #[test]
    fn test_mixed_replacement_policy_rejected() {
        let session = Session::default();
        let texts = vec![
            sample(&session, "coin", SampleSpec::new().with_replacement(true)),
            session.sample("coin"),
        ];
        let pages = pages_of(&session, texts);
        let err = compile_pages(&session, pages, "coin", bank(["heads", "tails"])).unwrap_err();
        assert!(matches!(err, ExperimentError::InconsistentReplacementPolicy { .. }));
    }

    #[test]
    fn test_record_bank_fields() {
        let session = Session::default();
        let people = vec![
            record(&[("name", "Ann"), ("pronoun", "she")]),
            record(&[("name", "Bo"), ("pronoun", "they")]),
        ];

        let named = sample(&session, "people", SampleSpec::new().variable("p").field("name"));
        let pages = pages_of(&session, vec![named]);
        let doc = compile_pages(&session, pages, "people", people.clone()).unwrap();
        assert_eq!(
            page_texts(&doc)[0],
            json!({ "sampleFrom": "people", "variable": 0, "field": "name" })
        );
        assert_eq!(doc["banks"]["people"][1], json!({ "name": "Bo", "pronoun": "they" }));

        let unknown = session.sample("people").with_field("age");
        let pages = pages_of(&session, vec![unknown]);
        let err = compile_pages(&session, pages, "people", people.clone()).unwrap_err();
        assert!(matches!(err, ExperimentError::UnknownField { .. }));

        let fieldless = session.sample("people");
        let pages = pages_of(&session, vec![fieldless]);
        let err = compile_pages(&session, pages, "people", people).unwrap_err();
        assert!(matches!(err, ExperimentError::UnknownField { .. }));
    }

    #[test]
    fn test_string_bank_has_no_fields() {
        let session = Session::default();
        let text = session.sample("words").with_field("spelling");
        let pages = pages_of(&session, vec![text]);
        let err = compile_pages(&session, pages, "words", bank(["cat"])).unwrap_err();
        assert!(matches!(err, ExperimentError::UnknownField { .. }));
    }

    #[test]
    fn test_bank_shape_rules() {
        let session = Session::default();
        let mixed = vec![BankEntry::from("cat"), record(&[("name", "Ann")])];
        let err = compile_pages(&session, vec![Page::new(&session, "p")], "mixed", mixed).unwrap_err();
        assert!(matches!(err, ExperimentError::SchemaMismatch { .. }));

        let uneven = vec![record(&[("name", "Ann")]), record(&[("label", "Bo")])];
        let err = compile_pages(&session, vec![Page::new(&session, "p")], "uneven", uneven).unwrap_err();
        assert!(matches!(err, ExperimentError::SchemaMismatch { .. }));

        let err = compile_pages(&session, vec![Page::new(&session, "p")], "empty", Vec::new()).unwrap_err();
        assert!(matches!(err, ExperimentError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_nearest_scope_declares_the_bank() {
        let session = Session::default();
        let texts = vec![session.sample("words"), session.sample("words"), session.sample("words")];
        let inner = Block::with_pages(&session, pages_of(&session, texts))
            .bank("words", bank(["a", "b", "c"]));
        let experiment = Experiment::new(vec![inner]).bank("words", bank(["only"]));
        assert!(experiment.compile(&session).is_ok());
    }

    #[test]
    fn test_redeclared_bank_rejects_slots_past_its_end() {
        let session = Session::default();
        let first = vec![
            sample(&session, "words", SampleSpec::new().variable("x")),
            sample(&session, "words", SampleSpec::new().variable("y")),
        ];
        let second = vec![session.sample("words")];
        let block_a = Block::with_pages(&session, pages_of(&session, first)).bank("words", bank(["a1", "a2"]));
        let block_b = Block::with_pages(&session, pages_of(&session, second)).bank("words", bank(["b1", "b2"]));
        let experiment = Experiment::new(vec![block_a, block_b.clone()]);

        let err = experiment.compile(&session).unwrap_err();
        assert_eq!(err.code(), Some(INV_BANK_SIZE));
        assert_eq!(err.node(), Some(block_b.id()));

        let roomy = Block::with_pages(&session, vec![Page::new(&session, session.sample("words"))])
            .bank("words", bank(["b1", "b2", "b3"]));
        let texts = vec![
            sample(&session, "words", SampleSpec::new().variable("x")),
            sample(&session, "words", SampleSpec::new().variable("y")),
        ];
        let block_a = Block::with_pages(&session, pages_of(&session, texts)).bank("words", bank(["a1", "a2"]));
        assert!(Experiment::new(vec![block_a, roomy]).compile(&session).is_ok());
    }

    #[test]
    fn test_unplaced_variable_still_holds_its_slot() {
        let session = Session::default();
        let _draft = sample(&session, "pair", SampleSpec::new().variable("draft"));
        let texts = vec![session.sample("pair"), session.sample("pair")];
        let pages = pages_of(&session, texts);

        let err = compile_pages(&session, pages.clone(), "pair", bank(["left", "right"])).unwrap_err();
        assert!(matches!(err, ExperimentError::InsufficientBankSize { .. }));

        let doc = compile_pages(&session, pages, "pair", bank(["left", "right", "middle"])).unwrap();
        assert_eq!(
            page_texts(&doc),
            vec![
                json!({ "sampleFrom": "pair", "variable": 1 }),
                json!({ "sampleFrom": "pair", "variable": 2 }),
            ]
        );
    }

    #[test]
    fn test_undeclared_bank_is_missing() {
        let session = Session::default();
        let option = AnswerOption::new(&session, session.sample("nowhere"));
        let page = Page::new(&session, "pick").options(vec![option.clone()]);
        let experiment = Experiment::new(vec![Block::with_pages(&session, vec![page])]);

        let err = experiment.compile(&session).unwrap_err();
        assert!(matches!(err, ExperimentError::MissingAttribute { .. }));
        assert_eq!(err.node(), Some(option.id()));
    }

    #[test]
    fn test_variable_from_another_session_is_missing() {
        let authoring = Session::default();
        let text = sample(&authoring, "words", SampleSpec::new().variable("x"));
        let other = Session::default();
        let pages = pages_of(&other, vec![text]);
        let err = compile_pages(&other, pages, "words", bank(["a"])).unwrap_err();
        assert!(matches!(err, ExperimentError::MissingAttribute { .. }));
    }
}
