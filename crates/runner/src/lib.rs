//! Process runner for the observation aggregator.
//!
//! The runner owns the lifecycle of a deployment:
//! - Named app processes run concurrently, each with a shared cancellation token
//! - SIGINT/SIGTERM cancel the token so processes can drain and tear down
//! - Closers run afterwards, bounded by a timeout, whatever the process outcome
//! - The exit code reflects whether any process failed
//!
//! # Example
//!
//! ```no_run
//! use aggregator_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     Runner::new()
//!         .with_named_process("worker", |ctx| async move {
//!             ctx.cancelled().await;
//!             tracing::info!("worker stopping");
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("flushing telemetry");
//!             Ok(())
//!         })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Boxed app process: receives the shutdown token, resolves when the process has fully stopped.
pub type AppProcess = Box<
    dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send,
>;

/// Boxed cleanup function executed after every app process has stopped.
pub type Closer = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send>;

/// Outcome of a completed run, used to pick the process exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every process stopped without error.
    Clean,
    /// At least one process failed or panicked; holds the name of the first one.
    Failed(String),
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Clean => 0,
            RunOutcome::Failed(_) => 1,
        }
    }
}

struct NamedProcess {
    name: String,
    process: AppProcess,
}

pub struct Runner {
    processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
    handle_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Creates a runner with a 10 second closer timeout and OS signal handling enabled.
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
            handle_signals: true,
        }
    }

    /// Adds a named app process.
    ///
    /// A process that returns an error cancels every other process. Errors
    /// returned after cancellation (for example a failed teardown) are still
    /// reported and make the run fail.
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.processes.push(NamedProcess {
            name: name.into(),
            process: Box::new(|token| Box::pin(process(token))),
        });
        self
    }

    /// Adds an already boxed app process, as produced by `into_runner_process` helpers.
    pub fn with_boxed_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.processes.push(NamedProcess {
            name: name.into(),
            process,
        });
        self
    }

    /// Adds a closer. All closers are attempted even if some fail.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Replaces the shutdown token, giving the caller external control over cancellation.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Disables SIGINT/SIGTERM handling. Used by tests that drive the token directly.
    pub fn without_signal_handlers(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Runs to completion and exits the process with the outcome's exit code.
    pub async fn run(self) {
        let outcome = self.run_to_completion().await;
        match &outcome {
            RunOutcome::Clean => tracing::info!("application exiting normally"),
            RunOutcome::Failed(name) => {
                tracing::error!(process = %name, "application exiting with error")
            }
        }
        std::process::exit(outcome.exit_code());
    }

    /// Runs every process until all have stopped, then executes the closers.
    pub async fn run_to_completion(self) -> RunOutcome {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for NamedProcess { name, process } in self.processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                let result = process(process_token).await;
                (name, result)
            });
        }

        if self.handle_signals {
            spawn_signal_handlers(token.clone());
        }

        // Processes are expected to stop on cancellation, so every one is joined
        // rather than aborted; that is what lets in-flight work drain.
        let mut first_failure = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    tracing::debug!(process = %name, "app process stopped");
                }
                Ok((name, Err(err))) => {
                    tracing::error!(process = %name, error = %format!("{:#}", err), "app process failed");
                    first_failure.get_or_insert(name);
                    token.cancel();
                }
                Err(err) => {
                    tracing::error!(error = %err, "app process panicked");
                    first_failure.get_or_insert_with(|| "<panicked>".to_string());
                    token.cancel();
                }
            }
        }

        if !self.closers.is_empty() {
            tracing::info!(timeout = ?self.closer_timeout, "running closers");
            match tokio::time::timeout(self.closer_timeout, run_closers(self.closers)).await {
                Ok(()) => tracing::info!("all closers completed"),
                Err(_) => tracing::error!(timeout = ?self.closer_timeout, "closers timed out"),
            }
        }

        match first_failure {
            Some(name) => RunOutcome::Failed(name),
            None => RunOutcome::Clean,
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => {
                tracing::error!(error = %err, "error setting up signal handler");
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to set up SIGTERM handler");
        sigterm.recv().await;
        tracing::info!("received SIGTERM signal");
        token.cancel();
    });
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();
    for closer in closers {
        closer_set.spawn(async move { closer().await });
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => tracing::debug!("closer completed"),
            Ok(Err(err)) => tracing::error!(error = %format!("{:#}", err), "closer failed"),
            Err(err) => tracing::error!(error = %err, "closer panicked"),
        }
    }
}
