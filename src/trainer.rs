use crate::{
    corpus::Corpus,
    engine::{CancelToken, ModelBuilder, TrainingParams},
    report::TrainingReport,
};
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

/// Supplies the parameters for a run. Queried once per `train` call.
pub trait ConfigHolder: Send + Sync + 'static {
    fn training_params(&self) -> anyhow::Result<TrainingParams>;
}

/// Receives the model of a successful run.
///
/// `publish` runs while the trainer's state is held and must not call back into
/// the trainer.
pub trait ModelHolder<M>: Send + Sync + 'static {
    fn publish(&self, model: M, report: TrainingReport);
}

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("a training job is already in progress")]
    AlreadyLocked,
    #[error("Must lock() before train()")]
    NotLocked,
    #[error("training has already been started for this lock")]
    AlreadyRunning,
    #[error("could not resolve training parameters: {0:#}")]
    Config(anyhow::Error),
    #[error("could not start training worker: {0}")]
    Spawn(#[source] std::io::Error),
}

impl TrainerError {
    /// Misuse of the lock/train protocol, as opposed to an internal failure.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            TrainerError::AlreadyLocked | TrainerError::NotLocked | TrainerError::AlreadyRunning
        )
    }

    pub fn status_code(&self) -> u16 {
        if self.is_conflict() { 409 } else { 500 }
    }
}

/// Snapshot for status polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainerStatus {
    pub locked: bool,
    pub failed: bool,
    #[serde(flatten)]
    pub report: TrainingReport,
}

struct WorkerHandle {
    run: u64,
    cancel: CancelToken,
}

struct JobState {
    locked: bool,
    // Bumped on every successful lock(); identifies the run a worker belongs to.
    generation: u64,
    report: TrainingReport,
    previous: TrainingReport,
    worker: Option<WorkerHandle>,
}

impl JobState {
    fn owns(&self, run: u64) -> bool {
        self.worker.as_ref().is_some_and(|w| w.run == run)
    }
}

struct Shared {
    state: Mutex<JobState>,
    idle: Condvar,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn done(&self, state: &mut JobState) {
        state.report.log_end();
        state.locked = false;
        state.worker = None;
        self.idle.notify_all();
    }
}

/// Single-owner training job: at most one run at a time, with a current and a
/// previous report.
pub struct Trainer<B: ModelBuilder, T> {
    builder: Arc<B>,
    tagger: Arc<T>,
    shared: Arc<Shared>,
}

impl<B: ModelBuilder, T> Clone for Trainer<B, T> {
    fn clone(&self) -> Self {
        Self {
            builder: self.builder.clone(),
            tagger: self.tagger.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<B, T> Trainer<B, T>
where
    B: ModelBuilder,
    T: ConfigHolder + ModelHolder<B::Model>,
{
    pub fn new(builder: B, tagger: Arc<T>) -> Self {
        Self::with_report(builder, tagger, TrainingReport::default())
    }

    /// Starts from a report restored from elsewhere, e.g. a previous process.
    pub fn with_report(builder: B, tagger: Arc<T>, report: TrainingReport) -> Self {
        Self {
            builder: Arc::new(builder),
            tagger,
            shared: Arc::new(Shared {
                state: Mutex::new(JobState {
                    locked: false,
                    generation: 0,
                    report,
                    previous: TrainingReport::default(),
                    worker: None,
                }),
                idle: Condvar::new(),
            }),
        }
    }

    pub fn lock(&self) -> Result<(), TrainerError> {
        let mut state = self.shared.state();
        if state.locked {
            return Err(TrainerError::AlreadyLocked);
        }
        state.locked = true;
        state.generation += 1;
        let mut fresh = TrainingReport::default();
        fresh.log_start();
        state.previous = std::mem::replace(&mut state.report, fresh);
        debug!("trainer locked for run {}", state.generation);
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.shared.state().locked
    }

    pub fn is_failed(&self) -> bool {
        self.shared.state().report.is_failed()
    }

    pub fn report(&self) -> TrainingReport {
        self.shared.state().report.clone()
    }

    pub fn status(&self) -> TrainerStatus {
        let state = self.shared.state();
        TrainerStatus {
            locked: state.locked,
            failed: state.report.is_failed(),
            report: state.report.clone(),
        }
    }

    /// Starts the run on its own thread and returns without waiting for it.
    /// `skipped` is the number of input documents excluded from `corpus`.
    pub fn train(&self, corpus: Corpus, skipped: usize) -> Result<(), TrainerError> {
        let run = {
            let state = self.shared.state();
            if !state.locked {
                return Err(TrainerError::NotLocked);
            }
            if state.worker.is_some() {
                return Err(TrainerError::AlreadyRunning);
            }
            state.generation
        };

        let params = self.tagger.training_params().map_err(TrainerError::Config)?;
        info!("Using document language: {}", params.lang);
        info!("Using stemmer: {}", params.stemmer);
        info!("Using stopwords: {}", params.stopwords);
        let digest = corpus.digest();

        let mut state = self.shared.state();
        // The lock may have been cancelled (and retaken) while parameters were resolved.
        if !state.locked || state.generation != run {
            return Err(TrainerError::NotLocked);
        }
        if state.worker.is_some() {
            return Err(TrainerError::AlreadyRunning);
        }

        let documents = corpus.len();
        let cancel = CancelToken::new();
        let worker = Worker {
            run,
            params,
            corpus,
            cancel: cancel.clone(),
            builder: self.builder.clone(),
            tagger: self.tagger.clone(),
            shared: self.shared.clone(),
        };
        std::thread::Builder::new()
            .name(format!("trainer-run-{run}"))
            .spawn(move || worker.run())
            .map_err(TrainerError::Spawn)?;

        // The worker cannot complete before this is stored: it needs `state` first.
        state.report.log_document_counts(documents, skipped);
        state.report.log_corpus_digest(digest);
        state.worker = Some(WorkerHandle { run, cancel });
        Ok(())
    }

    /// Abandons the current run. The model builder is only asked to stop;
    /// whatever it returns afterwards is discarded.
    pub fn cancel(&self) {
        let mut state = self.shared.state();
        if !state.locked {
            return;
        }
        if let Some(worker) = &state.worker {
            worker.cancel.cancel();
        }
        info!("cancelling training run {}", state.generation);
        self.shared.done(&mut state);
        state.report = std::mem::take(&mut state.previous);
    }

    /// Blocks until no run is active or `timeout` passes. Returns whether the
    /// trainer is unlocked.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let state = self.shared.state();
        let (state, _) = self
            .shared
            .idle
            .wait_timeout_while(state, timeout, |s| s.locked)
            .unwrap_or_else(PoisonError::into_inner);
        !state.locked
    }
}

struct Worker<B: ModelBuilder, T> {
    run: u64,
    params: TrainingParams,
    corpus: Corpus,
    cancel: CancelToken,
    builder: Arc<B>,
    tagger: Arc<T>,
    shared: Arc<Shared>,
}

impl<B, T> Worker<B, T>
where
    B: ModelBuilder,
    T: ModelHolder<B::Model>,
{
    fn run(self) {
        debug!("Training thread started");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.builder
                .build_model(&self.params, &self.corpus, &self.cancel)
        }));
        match outcome {
            Ok(Ok(model)) => self.succeed(model),
            Ok(Err(err)) => self.fail(&format!("{err:#}")),
            Err(payload) => self.fail(&panic_message(payload.as_ref())),
        }
        debug!("Training thread stopped");
    }

    fn succeed(&self, model: B::Model) {
        let mut state = self.shared.state();
        if self.cancel.is_cancelled() || !state.owns(self.run) {
            debug!("discarding model of cancelled run {}", self.run);
            return;
        }
        self.shared.done(&mut state);
        info!(
            "training run {} finished with {} documents",
            self.run,
            self.corpus.len()
        );
        self.tagger.publish(model, state.report.clone());
    }

    fn fail(&self, detail: &str) {
        let mut state = self.shared.state();
        if !state.owns(self.run) {
            debug!("cancelled run {} ended with: {detail}", self.run);
            return;
        }
        let message = format!("Error while training: {detail}");
        error!("{message}");
        state.report.log_error(message);
        self.shared.done(&mut state);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unexpected panic in model builder".to_string()
    }
}
