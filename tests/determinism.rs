use std::fs;

use pretty_assertions::assert_eq;
use speriment_compiler::{
    bank, fingerprint, make_experiment, validate_against_schema, AnswerOption, Block, Criterion,
    EmitOptions, Experiment, ExperimentError, IdGenerator, Item, Page, Resource, RunIf, SampleSpec,
    Session, Text,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A small but complete study: consent gate, sampled practice items with
/// feedback, a treatment split and a follow-up guarded on an answer.
fn build_study(session: &Session) -> Result<Experiment, ExperimentError> {
    let consent_yes = AnswerOption::new(session, "I agree");
    let consent = Page::new(session, "Do you consent to take part?")
        .options(vec![consent_yes.clone(), AnswerOption::new(session, "I do not agree")])
        .keyboard(true);

    let practice = (0..3)
        .map(|_| {
            let word = session.sample("words");
            let question = Page::new(session, vec![Text::from("Is this a word?"), Text::from(word)])
                .options(vec![
                    AnswerOption::new(session, "Yes").correct(true).feedback("Correct!"),
                    AnswerOption::new(session, "No").correct(false).feedback("Not quite."),
                ])
                .resource(Resource::new("beep.wav").autoplay(true));
            Item::new(session, question)
        })
        .collect::<Vec<_>>();

    let speaker = session.sample_from("speakers", SampleSpec::new().variable("main"))?;
    let same_speaker = session.sample_from("speakers", SampleSpec::new().variable("main"))?;
    let heard = Page::new(session, "What did you hear?")
        .freetext(true)
        .correct("^[a-z]+$")
        .resource(speaker);
    let confirm = Page::new(session, "Was it the same voice?").resource(same_speaker);

    let practice_block = Block::with_items(session, practice)
        .bank("words", bank(["blick", "table", "frunt", "chair"]))
        .criterion(Criterion::Streak(2))
        .cutoff(3);
    let audio_block = Block::with_pages(session, vec![heard, confirm]);
    let text_block = Block::with_pages(session, vec![Page::new(session, "Read the passage.")]);
    let treatments = Block::with_blocks(session, vec![audio_block.clone(), text_block.clone()])
        .treatments(vec![vec![audio_block.handle()], vec![text_block.handle()]]);

    let thanks = Block::with_pages(session, vec![Page::new(session, "Thank you!")])
        .run_if(RunIf::on_page(&consent).with_option(&consent_yes));
    let gate = Block::with_pages(session, vec![consent]);

    Ok(Experiment::new(vec![gate, practice_block, treatments, thanks])
        .bank("speakers", bank(["ann.wav", "bo.wav"])))
}

fn render(seed: u64) -> String {
    make_experiment(IdGenerator::with_seed(seed), |session| {
        build_study(session)?.to_json(session)
    })
    .unwrap()
}

// ============================================================================
// Deterministic output
// ============================================================================

#[test]
fn deterministic_build_identical_bytes() {
    let first = render(0);
    let second = render(0);
    assert_eq!(fingerprint(&first), fingerprint(&second), "builds must produce identical bytes");
    assert_eq!(first, second);
}

#[test]
fn compiling_twice_from_one_session_leaves_tree_reusable() {
    let session = Session::new(IdGenerator::new());
    let experiment = build_study(&session).unwrap();
    let before = experiment.clone();

    let first = experiment.compile(&session).unwrap();
    let second = experiment.compile(&session).unwrap();

    assert_eq!(experiment, before);
    assert_eq!(first.blocks.len(), second.blocks.len());
    assert_eq!(first.pages().len(), second.pages().len());
}

#[test]
fn seed_shifts_identifiers_only() {
    let low = render(0);
    let high = render(1000);
    assert_ne!(low, high);
    assert!(high.contains("\"id\": \"1001\""));
}

#[test]
fn rendered_document_matches_schema() {
    let json = render(0);
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    validate_against_schema(&value).unwrap();

    let mut broken = value.clone();
    broken["blocks"][0]["latinSquare"] = serde_json::json!("yes");
    let err = validate_against_schema(&broken).unwrap_err();
    assert!(matches!(err, ExperimentError::SchemaValidation { .. }));
}

#[test]
fn default_options_use_four_space_indent() {
    let json = render(0);
    assert!(json.starts_with("{\n    \"blocks\": ["));

    let compact = make_experiment(IdGenerator::new(), |session| {
        let options = EmitOptions::from_json_str(r#"{ "indent": 2 }"#)?;
        assert!(!options.trailing_semicolon);
        build_study(session)?.to_json_with(session, &options)
    })
    .unwrap();
    assert!(compact.starts_with("{\n  \"blocks\": ["));
}

// ============================================================================
// File output
// ============================================================================

#[test]
fn writes_javascript_variable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("study.js");

    make_experiment(IdGenerator::new(), |session| {
        build_study(session)?.to_file(session, &path, "study")
    })
    .unwrap();

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.starts_with("var study = {"));
    assert!(written.ends_with('}'));
    assert_eq!(written, format!("var study = {}", render(0)));
}

#[test]
fn trailing_semicolon_is_optional() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("study.js");
    let options = EmitOptions {
        trailing_semicolon: true,
        ..EmitOptions::default()
    };

    make_experiment(IdGenerator::new(), |session| {
        build_study(session)?.to_file_with(session, &path, "$study_1", &options)
    })
    .unwrap();

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.starts_with("var $study_1 = {"));
    assert!(written.ends_with("};"));
}

#[test]
fn invalid_variable_name_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("study.js");

    let err = make_experiment(IdGenerator::new(), |session| {
        build_study(session)?.to_file(session, &path, "my-study")
    })
    .unwrap_err();

    assert!(matches!(err, ExperimentError::InvalidVarName(_)));
    assert!(!path.exists());
}

#[test]
fn failed_validation_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("study.js");

    let err = make_experiment(IdGenerator::new(), |session| {
        let tiny = Block::with_pages(session, vec![Page::new(session, session.sample("one"))])
            .bank("one", bank(["a"]));
        let overdrawn = Block::with_pages(
            session,
            vec![Page::new(session, session.sample("one")), Page::new(session, session.sample("one"))],
        )
        .bank("one", bank(["b"]));
        Experiment::new(vec![tiny, overdrawn]).to_file(session, &path, "study")
    })
    .unwrap_err();

    assert!(matches!(err, ExperimentError::InsufficientBankSize { .. }));
    assert!(!path.exists());
}
