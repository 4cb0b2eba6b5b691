use keyphrase_trainer::{
    config::Config,
    corpus::{Corpus, Document},
    engine::{
        command::{into_model, CommandBuilder},
        CancelToken, ModelBuilder, TrainOut, TrainingParams,
    },
};
use std::time::{Duration, Instant};

fn shell(script: &str) -> Config {
    let mut cfg = Config::default();
    cfg.builder.command = "sh".into();
    cfg.builder.args = vec!["-c".into(), script.into()];
    cfg.builder.poll_interval_ms = 10;
    cfg
}

fn one_doc() -> Corpus {
    Corpus::new(vec![Document {
        id: Some("a".into()),
        content: "keyphrase extraction".into(),
        topics: vec!["nlp".into()],
    }])
}

// Well past a pipe buffer, so a child that never reads would block a plain write.
fn large_corpus() -> Corpus {
    let body = "keyphrase ".repeat(200);
    Corpus::new(
        (0..200)
            .map(|i| Document {
                id: Some(format!("doc-{i}")),
                content: format!("{i} {body}"),
                topics: vec!["nlp".into()],
            })
            .collect(),
    )
}

#[test]
fn failed_reply_becomes_error() {
    let out = TrainOut {
        ok: false,
        model: serde_json::Value::Null,
        warnings: vec![],
        error: Some("bad feature vector".into()),
    };
    assert_eq!(into_model(out).unwrap_err().to_string(), "bad feature vector");
}

#[cfg(unix)]
#[test]
fn reads_model_from_stdout() {
    let cfg = shell(r#"cat > /dev/null; printf '%s' '{"ok":true,"model":{"weights":[1,2]},"warnings":["tiny corpus"]}'"#);
    let builder = CommandBuilder::new(&cfg).unwrap();
    let params = TrainingParams::from_config(&cfg);
    let model = builder
        .build_model(&params, &one_doc(), &CancelToken::new())
        .unwrap();
    assert_eq!(model.model["weights"][1], 2);
    assert_eq!(model.warnings, vec!["tiny corpus".to_string()]);
}

#[cfg(unix)]
#[test]
fn non_zero_exit_is_an_error() {
    let cfg = shell("cat > /dev/null; echo 'out of memory' >&2; exit 3");
    let builder = CommandBuilder::new(&cfg).unwrap();
    let params = TrainingParams::from_config(&cfg);
    let err = builder
        .build_model(&params, &one_doc(), &CancelToken::new())
        .unwrap_err();
    assert!(err.to_string().contains("out of memory"));
}

#[cfg(unix)]
#[test]
fn cancellation_kills_the_child() {
    let cfg = shell("cat > /dev/null; exec sleep 30");
    let builder = CommandBuilder::new(&cfg).unwrap();
    let params = TrainingParams::from_config(&cfg);
    let cancel = CancelToken::new();

    let trigger = cancel.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        trigger.cancel();
    });

    let started = Instant::now();
    let err = builder.build_model(&params, &one_doc(), &cancel).unwrap_err();
    assert_eq!(err.to_string(), "builder cancelled");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[cfg(unix)]
#[test]
fn timeout_applies_when_child_ignores_stdin() {
    let mut cfg = shell("exec sleep 30");
    cfg.builder.timeout_seconds = 1;
    let builder = CommandBuilder::new(&cfg).unwrap();
    let params = TrainingParams::from_config(&cfg);

    let started = Instant::now();
    let err = builder
        .build_model(&params, &large_corpus(), &CancelToken::new())
        .unwrap_err();
    assert!(
        err.to_string().starts_with("builder exceeded timeout"),
        "unexpected error: {err:#}"
    );
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[cfg(unix)]
#[test]
fn cancellation_applies_when_child_ignores_stdin() {
    let cfg = shell("exec sleep 30");
    let builder = CommandBuilder::new(&cfg).unwrap();
    let params = TrainingParams::from_config(&cfg);
    let cancel = CancelToken::new();

    let trigger = cancel.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        trigger.cancel();
    });

    let started = Instant::now();
    let err = builder
        .build_model(&params, &large_corpus(), &cancel)
        .unwrap_err();
    assert_eq!(err.to_string(), "builder cancelled");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[cfg(unix)]
#[test]
fn child_may_reply_without_reading_stdin() {
    let cfg = shell(r#"printf '%s' '{"ok":true,"model":{"weights":[]}}'"#);
    let builder = CommandBuilder::new(&cfg).unwrap();
    let params = TrainingParams::from_config(&cfg);
    let model = builder
        .build_model(&params, &large_corpus(), &CancelToken::new())
        .unwrap();
    assert!(model.warnings.is_empty());
}

#[test]
fn empty_command_is_rejected() {
    let mut cfg = Config::default();
    cfg.builder.command = "  ".into();
    assert!(CommandBuilder::new(&cfg).is_err());
}
