use crate::{
    config::Config,
    corpus::Corpus,
    engine::{command::CommandBuilder, TrainedModel, TrainingParams},
    tagger::Tagger,
    trainer::{ConfigHolder, Trainer},
    util::ensure_dir,
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "keyphrase-trainer")]
#[command(about = "Single-owner training job manager for keyphrase tagging models")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./keyphrase-trainer.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Doctor {},
    CheckCorpus {
        #[arg(long)]
        corpus: PathBuf,
    },
    Train {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Cancel the run if it is still going after this many seconds.
        #[arg(long)]
        cancel_after: Option<u64>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref());
    let cfg = match cfg_path {
        Some(p) => Config::load(&p)?,
        None => Config::default(),
    };
    let _guard = init_logging(&args, &cfg, resolve_log_path(&cfg).as_deref())?;
    run(&cfg, &args.cmd)
}

/// Runs one subcommand against an already loaded config. Logging is left to the caller.
pub fn run(cfg: &Config, cmd: &Command) -> Result<()> {
    match cmd {
        Command::Doctor {} => doctor(cfg),
        Command::CheckCorpus { corpus } => check_corpus(cfg, corpus),
        Command::Train {
            corpus,
            out_dir,
            cancel_after,
        } => train(cfg, corpus, out_dir.as_deref(), *cancel_after),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("keyphrase-trainer.toml");
    default.exists().then_some(default)
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from(&cfg.paths.out_dir).join("keyphrase-trainer.log"))
}

fn doctor(cfg: &Config) -> Result<()> {
    let tagger: Tagger<TrainedModel> = Tagger::new(cfg);
    let params: TrainingParams = tagger.training_params()?;
    let builder = CommandBuilder::new(cfg)?;
    let diag = builder.doctor()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "builder": diag,
            "params": params,
        }))?
    );
    Ok(())
}

fn check_corpus(cfg: &Config, path: &Path) -> Result<()> {
    let (corpus, skipped) = Corpus::load(path, &cfg.corpus)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "corpus": path,
            "documents": corpus.len(),
            "skipped": skipped,
            "digest": corpus.digest(),
        }))?
    );
    Ok(())
}

fn train(cfg: &Config, path: &Path, out_override: Option<&Path>, cancel_after: Option<u64>) -> Result<()> {
    let tagger = Arc::new(Tagger::<TrainedModel>::new(cfg));
    let trainer = Trainer::new(CommandBuilder::new(cfg)?, tagger.clone());

    trainer.lock()?;
    let loaded = Corpus::load(path, &cfg.corpus).and_then(|(corpus, skipped)| {
        if corpus.is_empty() {
            Err(anyhow!("corpus has no usable documents: {}", path.display()))
        } else {
            Ok((corpus, skipped))
        }
    });
    let (corpus, skipped) = match loaded {
        Ok(v) => v,
        Err(err) => {
            trainer.cancel();
            return Err(err);
        }
    };
    info!("corpus documents={} skipped={}", corpus.len(), skipped);
    if let Err(err) = trainer.train(corpus, skipped) {
        trainer.cancel();
        return Err(err.into());
    }

    let deadline = cancel_after.map(|s| Instant::now() + Duration::from_secs(s));
    let started = Instant::now();
    let cancelled = loop {
        let wait = match deadline {
            Some(d) => d.saturating_duration_since(Instant::now()).min(PROGRESS_INTERVAL),
            None => PROGRESS_INTERVAL,
        };
        if trainer.wait_idle(wait) {
            break false;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            warn!("cancelling after {:?}", started.elapsed());
            trainer.cancel();
            break true;
        }
        info!("training elapsed={:?}", started.elapsed());
    };

    let status = trainer.status();
    let out_dir = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));

    if !cancelled && !status.failed {
        ensure_dir(&out_dir)?;
        if cfg.output.write_report_json {
            std::fs::write(
                out_dir.join(&cfg.output.report_filename),
                serde_json::to_string_pretty(&status.report)?,
            )?;
        }
        if cfg.output.write_model_json {
            let published = tagger
                .model()
                .ok_or_else(|| anyhow!("run finished but no model was published"))?;
            std::fs::write(
                out_dir.join(&cfg.output.model_filename),
                serde_json::to_string_pretty(published.model.as_ref())?,
            )?;
        }
    }

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "name": cfg.global.name,
                "cancelled": cancelled,
                "status": status,
                "out_dir": out_dir,
            }))?
        );
    }

    if cancelled {
        return Err(anyhow!("training cancelled"));
    }
    if let Some(msg) = &status.report.error_message {
        return Err(anyhow!("{msg}"));
    }
    Ok(())
}
