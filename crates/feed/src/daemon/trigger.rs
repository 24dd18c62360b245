//! Runs the new-ticker command, one invocation at a time.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use feed_core::{FeedError, Result, Symbol};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Default upper bound on one command's run time.
pub const DEFAULT_TRIGGER_TIMEOUT: Duration = Duration::from_secs(30 * 60);

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_tickers_file() -> PathBuf {
    PathBuf::from("new_tickers.txt")
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TRIGGER_TIMEOUT.as_secs()
}

/// The command run when new tickers appear, and where its output goes.
///
/// The command is a shell template. `{date}` becomes today's date
/// (`YYYY-MM-DD`), `{tickers}` the comma-joined new tickers, and
/// `{tickers_file}` the path of a side file holding the same list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Shell command template.
    pub command: String,
    /// Directory for per-run log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Side file the new tickers are written to before each run.
    #[serde(default = "default_tickers_file")]
    pub tickers_file: PathBuf,
    /// Seconds before a running command is killed.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl TriggerConfig {
    /// Creates a trigger with default log location, side file and timeout.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            log_dir: default_log_dir(),
            tickers_file: default_tickers_file(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Sets the log directory.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Sets the side file path.
    #[must_use]
    pub fn with_tickers_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.tickers_file = path.into();
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Time allowed for one run.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Checks the template and timeout.
    ///
    /// # Errors
    /// Returns [`FeedError::Configuration`] for a blank command or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(FeedError::Configuration("trigger command is empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(FeedError::Configuration("trigger timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Substitutes the placeholders for one run.
    #[must_use]
    pub fn render(&self, date: NaiveDate, tickers: &[Symbol]) -> String {
        self.command
            .replace("{date}", &date.format("%Y-%m-%d").to_string())
            .replace("{tickers_file}", &self.tickers_file.display().to_string())
            .replace("{tickers}", &join(tickers))
    }
}

fn join(tickers: &[Symbol]) -> String {
    tickers
        .iter()
        .map(Symbol::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug)]
struct Job {
    command: String,
    tickers: Vec<Symbol>,
}

/// Queue of trigger commands drained by one background task.
///
/// Submitting never blocks the caller. Commands run strictly one after
/// another, each with its own log file, and are killed if they outlive the
/// configured timeout. A failing command is logged and the queue moves on.
#[derive(Debug)]
pub struct TriggerRunner {
    config: TriggerConfig,
    jobs: mpsc::UnboundedSender<Job>,
    stop: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl TriggerRunner {
    /// Starts the worker on the current Tokio runtime.
    ///
    /// # Errors
    /// Returns [`FeedError::Configuration`] if the config is invalid or no
    /// runtime is running.
    pub fn spawn(config: TriggerConfig) -> Result<Self> {
        config.validate()?;
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| FeedError::Configuration(format!("trigger runner needs a runtime: {e}")))?;

        let (jobs, rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(false);
        let worker = handle.spawn(drain(config.clone(), rx, stop_rx));
        Ok(Self {
            config,
            jobs,
            stop,
            worker,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Queues one run for `tickers`, dated today.
    pub fn submit(&self, tickers: &[Symbol]) {
        self.submit_dated(Local::now().date_naive(), tickers);
    }

    /// Queues one run for `tickers` with an explicit date.
    pub fn submit_dated(&self, date: NaiveDate, tickers: &[Symbol]) {
        let command = self.config.render(date, tickers);
        info!(command = %command, tickers = %join(tickers), "Queued trigger command");
        let job = Job {
            command,
            tickers: tickers.to_vec(),
        };
        if let Err(e) = self.jobs.send(job) {
            warn!(command = %e.0.command, "Trigger worker has stopped, command dropped");
        }
    }

    /// Stops the worker. A running command is killed; queued ones are
    /// logged and dropped.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.worker.await {
            error!(error = %e, "Trigger worker panicked");
        }
    }
}

async fn drain(config: TriggerConfig, mut jobs: mpsc::UnboundedReceiver<Job>, mut stop: watch::Receiver<bool>) {
    loop {
        let job = tokio::select! {
            biased;
            _ = stop.changed() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => return,
            },
        };

        tokio::select! {
            biased;
            _ = stop.changed() => {
                warn!(command = %job.command, "Trigger command interrupted by shutdown");
                break;
            }
            () = execute(&config, &job) => {}
        }
    }

    jobs.close();
    while let Ok(job) = jobs.try_recv() {
        warn!(command = %job.command, "Dropping queued trigger command");
    }
}

async fn execute(config: &TriggerConfig, job: &Job) {
    if let Err(e) = tokio::fs::write(&config.tickers_file, join(&job.tickers)).await {
        error!(path = %config.tickers_file.display(), error = %e, "Failed to write tickers file");
        return;
    }

    let log_path = config
        .log_dir
        .join(format!("trigger_{}.log", Local::now().format("%Y%m%d_%H%M%S")));
    let (stdout, stderr) = match open_log(&log_path, &job.command).await {
        Ok(handles) => handles,
        Err(e) => {
            error!(path = %log_path.display(), error = %e, "Failed to open trigger log");
            return;
        }
    };

    info!(command = %job.command, log = %log_path.display(), "Running trigger command");
    let mut child = match Command::new("sh")
        .arg("-c")
        .arg(&job.command)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            error!(command = %job.command, error = %e, "Failed to start trigger command");
            return;
        }
    };

    match tokio::time::timeout(config.timeout(), child.wait()).await {
        Ok(Ok(status)) if status.success() => {
            info!(command = %job.command, "Trigger command finished");
        }
        Ok(Ok(status)) => {
            warn!(command = %job.command, code = ?status.code(), log = %log_path.display(), "Trigger command failed");
        }
        Ok(Err(e)) => {
            error!(command = %job.command, error = %e, "Failed waiting for trigger command");
        }
        Err(_) => {
            warn!(command = %job.command, timeout = ?config.timeout(), "Trigger command timed out, killing");
            if let Err(e) = child.kill().await {
                error!(error = %e, "Failed to kill trigger command");
            }
        }
    }
}

async fn open_log(path: &Path, command: &str) -> std::io::Result<(Stdio, Stdio)> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("$ {command}\n").as_bytes()).await?;
    file.flush().await?;
    let out = file.into_std().await;
    let err = out.try_clone()?;
    Ok((Stdio::from(out), Stdio::from(err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(list: &[&str]) -> Vec<Symbol> {
        list.iter().map(|s| Symbol::new(*s)).collect()
    }

    async fn wait_for(path: &Path) -> String {
        for _ in 0..200 {
            if let Ok(text) = tokio::fs::read_to_string(path).await {
                if !text.is_empty() {
                    return text;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("{} never appeared", path.display());
    }

    #[test]
    fn test_render_placeholders() {
        let config = TriggerConfig::new("run --date {date} --list {tickers} --file {tickers_file}")
            .with_tickers_file("/tmp/new.txt");
        let date = NaiveDate::from_ymd_opt(2024, 9, 26).unwrap();
        assert_eq!(
            config.render(date, &symbols(&["NVDA", "AMD"])),
            "run --date 2024-09-26 --list NVDA,AMD --file /tmp/new.txt"
        );
    }

    #[test]
    fn test_validate() {
        assert!(TriggerConfig::new("  ").validate().is_err());
        assert!(TriggerConfig::new("true").with_timeout(Duration::ZERO).validate().is_err());
        assert!(TriggerConfig::new("true").validate().is_ok());
    }

    #[test]
    fn test_spawn_outside_runtime() {
        assert!(matches!(
            TriggerRunner::spawn(TriggerConfig::new("true")),
            Err(FeedError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_open_log_creates_dirs_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs/trigger.log");
        open_log(&path, "first").await.unwrap();
        open_log(&path, "second").await.unwrap();
        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(text, "$ first\n$ second\n");
    }

    #[tokio::test]
    async fn test_runs_commands_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let config = TriggerConfig::new(format!("cat {{tickers_file}} >> {}; echo >> {}", out.display(), out.display()))
            .with_log_dir(dir.path().join("logs"))
            .with_tickers_file(dir.path().join("new.txt"));

        let runner = TriggerRunner::spawn(config).unwrap();
        runner.submit(&symbols(&["NVDA"]));
        runner.submit(&symbols(&["AMD", "TSM"]));

        let mut text = wait_for(&out).await;
        for _ in 0..200 {
            if text.lines().count() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
            text = tokio::fs::read_to_string(&out).await.unwrap();
        }
        assert_eq!(text.lines().collect::<Vec<_>>(), vec!["NVDA", "AMD,TSM"]);
        assert!(std::fs::read_dir(dir.path().join("logs")).unwrap().next().is_some());
        runner.shutdown().await;
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("after.txt");
        let config = TriggerConfig::new("sleep 5")
            .with_log_dir(dir.path())
            .with_tickers_file(dir.path().join("new.txt"))
            .with_timeout(Duration::from_secs(1));

        let runner = TriggerRunner::spawn(config).unwrap();
        runner.submit(&symbols(&["NVDA"]));
        let started = std::time::Instant::now();
        // The queue only reaches this once the sleeping command is gone.
        runner.jobs
            .send(Job {
                command: format!("echo done > {}", out.display()),
                tickers: symbols(&["AMD"]),
            })
            .unwrap();
        assert_eq!(wait_for(&out).await.trim(), "done");
        assert!(started.elapsed() < Duration::from_secs(5));
        runner.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drops_pending() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("never.txt");
        let config = TriggerConfig::new(format!("sleep 5; echo ran >> {}", out.display()))
            .with_log_dir(dir.path())
            .with_tickers_file(dir.path().join("new.txt"));

        let runner = TriggerRunner::spawn(config).unwrap();
        runner.submit(&symbols(&["NVDA"]));
        runner.submit(&symbols(&["AMD"]));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::time::timeout(Duration::from_secs(2), runner.shutdown())
            .await
            .unwrap();
        assert!(!out.exists());
    }
}
