use keyphrase_trainer::{
    cli::{self, Command},
    config::Config,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const CORPUS: &str = r#"{"id":"a","content":"Rust ownership rules","topics":["rust"]}
{"id":"b","content":"Borrow checker","topics":["rust"]}
not json at all
"#;

fn workdir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("keyphrase-trainer-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn shell(script: &str) -> Config {
    let mut cfg = Config::default();
    cfg.builder.command = "sh".into();
    cfg.builder.args = vec!["-c".into(), script.into()];
    cfg.builder.poll_interval_ms = 10;
    cfg.global.print_summary = false;
    cfg
}

fn train(cfg: &Config, corpus: &Path, out: &Path, cancel_after: Option<u64>) -> anyhow::Result<()> {
    cli::run(
        cfg,
        &Command::Train {
            corpus: corpus.to_path_buf(),
            out_dir: Some(out.to_path_buf()),
            cancel_after,
        },
    )
}

#[cfg(unix)]
#[test]
fn successful_run_writes_report_and_model() {
    let dir = workdir("success");
    let corpus = dir.join("corpus.jsonl");
    std::fs::write(&corpus, CORPUS).unwrap();
    let out = dir.join("out");
    let cfg = shell(r#"cat > /dev/null; printf '%s' '{"ok":true,"model":{"weights":[3]}}'"#);

    train(&cfg, &corpus, &out, None).unwrap();

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("report.json")).unwrap()).unwrap();
    assert_eq!(report["document_count"], 2);
    assert_eq!(report["skipped_count"], 1);
    assert!(report.get("error_message").is_none());
    let model: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("model.json")).unwrap()).unwrap();
    assert_eq!(model["weights"][0], 3);
}

#[cfg(unix)]
#[test]
fn failed_run_reports_error_and_writes_nothing() {
    let dir = workdir("failure");
    let corpus = dir.join("corpus.jsonl");
    std::fs::write(&corpus, CORPUS).unwrap();
    let out = dir.join("out");
    let cfg = shell(r#"cat > /dev/null; printf '%s' '{"ok":false,"error":"no features"}'"#);

    let err = train(&cfg, &corpus, &out, None).unwrap_err();
    assert_eq!(err.to_string(), "Error while training: no features");
    assert!(!out.join("report.json").exists());
    assert!(!out.join("model.json").exists());
}

#[test]
fn missing_corpus_fails_before_training() {
    let dir = workdir("missing");
    let out = dir.join("out");
    let cfg = shell("exit 1");

    assert!(train(&cfg, &dir.join("absent.jsonl"), &out, None).is_err());
    assert!(!out.exists());
}

#[test]
fn empty_corpus_is_rejected() {
    let dir = workdir("empty");
    let corpus = dir.join("corpus.jsonl");
    std::fs::write(&corpus, "not json\n").unwrap();
    let out = dir.join("out");
    let cfg = shell("exit 1");

    let err = train(&cfg, &corpus, &out, None).unwrap_err();
    assert!(err.to_string().contains("no usable documents"));
    assert!(!out.exists());
}

#[cfg(unix)]
#[test]
fn cancel_after_stops_a_hung_builder() {
    let dir = workdir("cancel");
    let corpus = dir.join("corpus.jsonl");
    std::fs::write(&corpus, CORPUS).unwrap();
    let out = dir.join("out");
    let cfg = shell("exec sleep 30");

    let started = Instant::now();
    let err = train(&cfg, &corpus, &out, Some(1)).unwrap_err();
    assert_eq!(err.to_string(), "training cancelled");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!out.join("report.json").exists());
}
