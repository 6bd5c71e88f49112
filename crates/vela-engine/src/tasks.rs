//! Three-pool task orchestrator.
//!
//! - **Primary actions**: one worker drains an unbounded queue; at most
//!   one action runs at a time and the running one can be cancelled
//!   through its `CancellationToken` (cooperative).
//! - **Context mutations**: spawned tasks gated by a small semaphore.
//! - **Background work**: spawned tasks gated by a larger semaphore,
//!   fire-and-forget with unbounded queueing.
//!
//! Every submission resolves exactly once through a [`TaskHandle`]. A
//! failure emits [`EngineEvent::TaskFailed`] and an error log instead of
//! killing the pool; panics are isolated by the inner spawn.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use metrics::gauge;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::events::{EngineEvent, EventEmitter};

/// A primary-action job: receives the run's cancellation token.
pub type ActionJob =
    Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<(), EngineError>> + Send>;

/// How a submitted task ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Ran to completion.
    Completed,
    /// Cancelled before or during the run.
    Cancelled,
    /// Failed (error or panic); the message is best-effort.
    Failed(String),
}

/// Await-able completion handle for a submitted task.
pub struct TaskHandle {
    rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    /// Wait for the task to finish.
    pub async fn outcome(self) -> TaskOutcome {
        self.rx
            .await
            .unwrap_or_else(|_| TaskOutcome::Failed("task dropped without resolving".into()))
    }
}

struct QueuedAction {
    description: String,
    job: ActionJob,
    done: oneshot::Sender<TaskOutcome>,
}

/// The three pools. Cheap to share behind the manager.
pub struct TaskPools {
    actions_tx: mpsc::UnboundedSender<QueuedAction>,
    current_action: Arc<Mutex<Option<CancellationToken>>>,
    context_sem: Arc<Semaphore>,
    background_sem: Arc<Semaphore>,
    shutdown: CancellationToken,
    emitter: Arc<EventEmitter>,
}

impl TaskPools {
    /// Start the pools, spawning the primary-action worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(emitter: Arc<EventEmitter>, config: &EngineConfig) -> Self {
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let current_action = Arc::new(Mutex::new(None));
        let shutdown = CancellationToken::new();

        let _worker = tokio::spawn(action_worker(
            actions_rx,
            Arc::clone(&current_action),
            shutdown.clone(),
            Arc::clone(&emitter),
        ));

        Self {
            actions_tx,
            current_action,
            context_sem: Arc::new(Semaphore::new(config.context_workers)),
            background_sem: Arc::new(Semaphore::new(config.background_workers)),
            shutdown,
            emitter,
        }
    }

    /// Queue a primary action. Runs after everything queued before it.
    pub fn submit_action(&self, description: impl Into<String>, job: ActionJob) -> TaskHandle {
        let (done, rx) = oneshot::channel();
        let queued = QueuedAction {
            description: description.into(),
            job,
            done,
        };
        if let Err(rejected) = self.actions_tx.send(queued) {
            // Pool already shut down.
            let _ = rejected.0.done.send(TaskOutcome::Cancelled);
        }
        TaskHandle { rx }
    }

    /// Cancel the currently running primary action, if any.
    pub fn cancel_action(&self) -> bool {
        let guard = self.current_action.lock();
        if let Some(token) = guard.as_ref() {
            info!("cancelling current action");
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Spawn a context-mutation task (at most `context_workers` at once).
    pub fn submit_context<F>(&self, description: impl Into<String>, fut: F) -> TaskHandle
    where
        F: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        self.spawn_pooled(
            "context",
            description.into(),
            Arc::clone(&self.context_sem),
            fut,
        )
    }

    /// Spawn a background task (at most `background_workers` at once).
    pub fn submit_background<F>(&self, description: impl Into<String>, fut: F) -> TaskHandle
    where
        F: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        self.spawn_pooled(
            "background",
            description.into(),
            Arc::clone(&self.background_sem),
            fut,
        )
    }

    fn spawn_pooled<F>(
        &self,
        pool: &'static str,
        description: String,
        semaphore: Arc<Semaphore>,
        fut: F,
    ) -> TaskHandle
    where
        F: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        let (done, rx) = oneshot::channel();
        let emitter = Arc::clone(&self.emitter);
        let _task = tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                // Semaphore closed: shutting down.
                let _ = done.send(TaskOutcome::Cancelled);
                return;
            };
            gauge!("engine_tasks_active", "pool" => pool).increment(1.0);
            let outcome = run_isolated(fut, &description, &emitter).await;
            gauge!("engine_tasks_active", "pool" => pool).decrement(1.0);
            let _ = done.send(outcome);
        });
        TaskHandle { rx }
    }

    /// Cancel the in-flight action and stop accepting new work.
    pub fn shutdown(&self) {
        info!("task pools shutting down");
        self.shutdown.cancel();
        let _ = self.cancel_action();
        self.context_sem.close();
        self.background_sem.close();
    }
}

async fn action_worker(
    mut rx: mpsc::UnboundedReceiver<QueuedAction>,
    current: Arc<Mutex<Option<CancellationToken>>>,
    shutdown: CancellationToken,
    emitter: Arc<EventEmitter>,
) {
    loop {
        let queued = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            queued = rx.recv() => match queued {
                Some(queued) => queued,
                None => break,
            },
        };

        let token = CancellationToken::new();
        *current.lock() = Some(token.clone());
        gauge!("engine_tasks_active", "pool" => "action").set(1.0);
        debug!(description = %queued.description, "action started");

        let fut = (queued.job)(token.clone());
        let outcome = run_isolated(fut, &queued.description, &emitter).await;
        let outcome = if token.is_cancelled() && outcome == TaskOutcome::Completed {
            TaskOutcome::Cancelled
        } else {
            outcome
        };

        *current.lock() = None;
        gauge!("engine_tasks_active", "pool" => "action").set(0.0);
        debug!(description = %queued.description, ?outcome, "action finished");
        let _ = queued.done.send(outcome);
    }

    // Drain: everything still queued resolves as cancelled.
    while let Some(queued) = rx.recv().await {
        let _ = queued.done.send(TaskOutcome::Cancelled);
    }
}

/// Run a job inside its own spawn so a panic cannot take down the pool.
async fn run_isolated<F>(fut: F, description: &str, emitter: &EventEmitter) -> TaskOutcome
where
    F: Future<Output = Result<(), EngineError>> + Send + 'static,
{
    match tokio::spawn(fut).await {
        Ok(Ok(())) => TaskOutcome::Completed,
        Ok(Err(EngineError::Cancelled)) => TaskOutcome::Cancelled,
        Ok(Err(err)) => {
            error!(description, error = %err, "task failed");
            let _ = emitter.emit(EngineEvent::TaskFailed {
                description: description.to_string(),
                message: err.to_string(),
            });
            TaskOutcome::Failed(err.to_string())
        }
        Err(join_err) => {
            error!(description, error = %join_err, "task panicked");
            let _ = emitter.emit(EngineEvent::TaskFailed {
                description: description.to_string(),
                message: join_err.to_string(),
            });
            TaskOutcome::Failed(join_err.to_string())
        }
    }
}
