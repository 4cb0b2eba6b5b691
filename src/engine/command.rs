use super::{types::*, CancelToken, ModelBuilder};
use crate::{config::Config, corpus::Corpus};
use anyhow::{anyhow, Context, Result};
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Output, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Runs an external training program. The request goes to its stdin as JSON
/// and a `TrainOut` is read back from stdout.
pub struct CommandBuilder {
    cfg: Config,
    command: PathBuf,
}

impl CommandBuilder {
    pub fn new(cfg: &Config) -> Result<Self> {
        let raw = cfg.builder.command.trim();
        if raw.is_empty() {
            return Err(anyhow!("builder.command is empty"));
        }
        Ok(Self {
            cfg: cfg.clone(),
            command: expand_tilde(raw),
        })
    }

    pub fn doctor(&self) -> Result<BuilderDiag> {
        let timeout = non_zero_secs(self.cfg.builder.doctor_timeout_seconds);
        let mut diag: BuilderDiag =
            self.run_json(&serde_json::json!({"cmd": "doctor"}), timeout, None)?;
        if diag.command.is_empty() {
            diag.command = self.command.display().to_string();
        }
        Ok(diag)
    }

    fn run_json<I: serde::Serialize, O: for<'de> serde::Deserialize<'de>>(
        &self,
        input: &I,
        timeout: Option<Duration>,
        cancel: Option<&CancelToken>,
    ) -> Result<O> {
        debug!(
            "builder run {} args={:?} timeout={:?}",
            self.command.display(),
            self.cfg.builder.args,
            timeout
        );
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.cfg.builder.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (k, v) in &self.cfg.builder.env {
            cmd.env(k, v);
        }

        let bytes = serde_json::to_vec(input).with_context(|| "encoding builder request")?;
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning builder: {}", self.command.display()))?;

        // All three pipes are serviced off this thread so the timeout and the
        // cancel token are honoured even when the child never reads its input.
        let stdin_thread = feed(child.stdin.take(), bytes);
        let stdout_thread = drain(child.stdout.take());
        let stderr_thread = drain(child.stderr.take());

        let poll = Duration::from_millis(self.cfg.builder.poll_interval_ms.max(1));
        let output = wait_for(&mut child, stdout_thread, stderr_thread, timeout, poll, cancel)?;
        finish_feed(stdin_thread);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "builder failed ({}): {}",
                output.status,
                stderr.trim()
            ));
        }
        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("builder stderr: {}", stderr.trim());
        }

        let out: O = serde_json::from_slice(&output.stdout)
            .with_context(|| "parsing builder JSON output")?;
        Ok(out)
    }
}

impl ModelBuilder for CommandBuilder {
    type Model = TrainedModel;

    fn build_model(
        &self,
        params: &TrainingParams,
        corpus: &Corpus,
        cancel: &CancelToken,
    ) -> Result<TrainedModel> {
        let req = serde_json::json!({
            "cmd": "train",
            "params": params,
            "documents": &corpus.documents,
        });
        let timeout = non_zero_secs(self.cfg.builder.timeout_seconds);
        let out: TrainOut = self.run_json(&req, timeout, Some(cancel))?;
        into_model(out)
    }
}

/// Converts the program's reply into a model, surfacing `ok=false` as an error.
pub fn into_model(out: TrainOut) -> Result<TrainedModel> {
    if !out.ok {
        let msg = out.error.unwrap_or_else(|| "builder reported failure".to_string());
        return Err(anyhow!(msg));
    }
    for w in &out.warnings {
        warn!("builder warning: {w}");
    }
    Ok(TrainedModel {
        model: out.model,
        warnings: out.warnings,
    })
}

fn feed(stdin: Option<ChildStdin>, bytes: Vec<u8>) -> JoinHandle<std::io::Result<()>> {
    std::thread::spawn(move || {
        if let Some(mut w) = stdin {
            w.write_all(&bytes)?;
            w.flush()?;
        }
        Ok(())
    })
}

// A child may exit without consuming its input; that is not an error here.
fn finish_feed(handle: JoinHandle<std::io::Result<()>>) {
    if !handle.is_finished() {
        debug!("builder exited with stdin still open; writer left detached");
        return;
    }
    match handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(err)) if err.kind() == ErrorKind::BrokenPipe => {
            debug!("builder closed stdin early: {err}");
        }
        Ok(Err(err)) => debug!("writing builder stdin: {err}"),
        Err(_) => debug!("stdin writer thread panicked"),
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> JoinHandle<Result<Vec<u8>>> {
    std::thread::spawn(move || -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        if let Some(mut r) = reader {
            r.read_to_end(&mut buf).with_context(|| "read builder output")?;
        }
        Ok(buf)
    })
}

fn wait_for(
    child: &mut Child,
    stdout_thread: JoinHandle<Result<Vec<u8>>>,
    stderr_thread: JoinHandle<Result<Vec<u8>>>,
    timeout: Option<Duration>,
    poll: Duration,
    cancel: Option<&CancelToken>,
) -> Result<Output> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().with_context(|| "try_wait")? {
            return Ok(Output {
                status,
                stdout: join(stdout_thread, "stdout")?,
                stderr: join(stderr_thread, "stderr")?,
            });
        }

        let cancelled = cancel.is_some_and(CancelToken::is_cancelled);
        let timed_out = timeout.is_some_and(|t| start.elapsed() > t);
        if cancelled || timed_out {
            let _ = child.kill();
            child.wait().with_context(|| "wait after kill")?;
            // The writer and readers are left detached: grandchildren of the
            // builder may still hold the pipes open.
            drop(stdout_thread);
            drop(stderr_thread);
            if cancelled {
                return Err(anyhow!("builder cancelled"));
            }
            warn!("builder timed out after {:?}", start.elapsed());
            return Err(anyhow!(
                "builder exceeded timeout ({:?})",
                timeout.unwrap_or_default()
            ));
        }

        std::thread::sleep(poll);
    }
}

fn join(handle: JoinHandle<Result<Vec<u8>>>, name: &str) -> Result<Vec<u8>> {
    handle
        .join()
        .map_err(|_| anyhow!("{name} reader thread panicked"))?
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
