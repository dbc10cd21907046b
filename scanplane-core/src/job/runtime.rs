use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scanplane_model::ScanStatus;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::{Job, JobContext, JobData, JobId, JobRuntime, StatusHookSender};
use crate::error::{Result, ScanError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Jobs executing concurrently.
    pub workers: usize,
    /// Submissions buffered before `submit` starts failing.
    pub queue_capacity: usize,
    /// Attempts per status hook delivery.
    pub hook_delivery_attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub retry_backoff: Duration,
    /// Pause between failed hook deliveries.
    pub hook_retry_delay: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            hook_delivery_attempts: 3,
            retry_backoff: Duration::from_secs(2),
            hook_retry_delay: Duration::from_millis(500),
        }
    }
}

struct Envelope {
    id: JobId,
    data: JobData,
    job: Arc<dyn Job>,
}

/// Runs registered jobs on a bounded pool of tokio tasks.
pub struct InProcJobRuntime {
    config: RuntimeConfig,
    jobs: HashMap<String, Arc<dyn Job>>,
    mailbox: mpsc::Sender<Envelope>,
    shutdown_token: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for InProcJobRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.jobs.keys().collect();
        names.sort();
        f.debug_struct("InProcJobRuntime")
            .field("config", &self.config)
            .field("jobs", &names)
            .field("queued", &(self.mailbox.max_capacity() - self.mailbox.capacity()))
            .field("shutdown_cancelled", &self.shutdown_token.is_cancelled())
            .finish()
    }
}

impl InProcJobRuntime {
    /// Starts the dispatcher. Must be called inside a tokio runtime.
    pub fn start(
        config: RuntimeConfig,
        jobs: HashMap<String, Arc<dyn Job>>,
        hooks: Arc<dyn StatusHookSender>,
    ) -> Self {
        Self::launch(config, jobs, hooks, None)
    }

    /// Like [`InProcJobRuntime::start`], with `fallback` receiving terminal
    /// statuses that `hooks` failed to deliver.
    pub fn start_with_fallback(
        config: RuntimeConfig,
        jobs: HashMap<String, Arc<dyn Job>>,
        hooks: Arc<dyn StatusHookSender>,
        fallback: Arc<dyn StatusHookSender>,
    ) -> Self {
        Self::launch(config, jobs, hooks, Some(fallback))
    }

    fn launch(
        config: RuntimeConfig,
        jobs: HashMap<String, Arc<dyn Job>>,
        hooks: Arc<dyn StatusHookSender>,
        fallback: Option<Arc<dyn StatusHookSender>>,
    ) -> Self {
        let (mailbox, inbox) = mpsc::channel(config.queue_capacity.max(1));
        let shutdown_token = CancellationToken::new();
        let executor = Executor {
            hooks,
            fallback,
            config: config.clone(),
            shutdown: shutdown_token.clone(),
        };
        let dispatcher = tokio::spawn(dispatch(
            inbox,
            executor,
            Arc::new(Semaphore::new(config.workers.max(1))),
            shutdown_token.clone(),
        ));
        info!(workers = config.workers, jobs = jobs.len(), "job runtime started");

        Self {
            config,
            jobs,
            mailbox,
            shutdown_token,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Stops accepting work and waits for the workers to drain. In-flight
    /// jobs and jobs still queued both report `Stopped`.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            error!(error = %err, "job dispatcher terminated abnormally");
        }
        info!("job runtime stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown_token.is_cancelled()
    }
}

#[async_trait]
impl JobRuntime for InProcJobRuntime {
    async fn submit(&self, data: JobData) -> Result<JobId> {
        if self.shutdown_token.is_cancelled() {
            return Err(ScanError::JobSubmission("job runtime is shut down".into()));
        }
        if data.status_hook.trim().is_empty() {
            return Err(ScanError::JobSubmission(format!(
                "job {} has no status hook",
                data.name
            )));
        }
        let job = self.jobs.get(&data.name).cloned().ok_or_else(|| {
            ScanError::JobSubmission(format!("no job registered as {}", data.name))
        })?;

        let id = JobId::new();
        let name = data.name.clone();
        self.mailbox
            .try_send(Envelope {
                id: id.clone(),
                data,
                job,
            })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => {
                    ScanError::JobSubmission("job queue is full".into())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    ScanError::JobSubmission("job runtime is shut down".into())
                }
            })?;
        debug!(%id, name, "job queued");
        Ok(id)
    }
}

async fn dispatch(
    mut inbox: mpsc::Receiver<Envelope>,
    executor: Executor,
    slots: Arc<Semaphore>,
    shutdown: CancellationToken,
) {
    let mut running = JoinSet::new();
    let mut unstarted = Vec::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(_) = running.join_next(), if !running.is_empty() => {}
            envelope = inbox.recv() => {
                let Some(envelope) = envelope else { break };
                let permit = tokio::select! {
                    _ = shutdown.cancelled() => {
                        unstarted.push(envelope);
                        break;
                    }
                    permit = slots.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => {
                            unstarted.push(envelope);
                            break;
                        }
                    },
                };
                let executor = executor.clone();
                running.spawn(async move {
                    executor.execute(envelope).await;
                    drop(permit);
                });
            }
        }
    }

    // Submissions racing the shutdown either land here or fail with a
    // closed mailbox.
    inbox.close();
    while let Some(envelope) = inbox.recv().await {
        unstarted.push(envelope);
    }
    if !unstarted.is_empty() {
        warn!(count = unstarted.len(), "stopping jobs that never started");
    }
    for envelope in unstarted {
        let executor = executor.clone();
        running.spawn(async move { executor.abandon(envelope).await });
    }
    while running.join_next().await.is_some() {}
}

#[derive(Clone)]
struct Executor {
    hooks: Arc<dyn StatusHookSender>,
    fallback: Option<Arc<dyn StatusHookSender>>,
    config: RuntimeConfig,
    shutdown: CancellationToken,
}

impl Executor {
    fn context(&self, id: JobId, status_hook: &str) -> JobContext {
        JobContext::new(
            id,
            status_hook,
            self.hooks.clone(),
            self.config.hook_delivery_attempts,
            self.config.hook_retry_delay,
        )
        .with_fallback(self.fallback.clone())
    }

    /// Reports `Stopped` for a job the runtime accepted but never ran.
    async fn abandon(&self, envelope: Envelope) {
        let Envelope { id, data, .. } = envelope;
        let span = info_span!("job", job_id = %id, name = %data.name);
        async move {
            debug!("job dropped from the queue by shutdown");
            self.context(id, &data.status_hook)
                .report(ScanStatus::Stopped)
                .await;
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, envelope: Envelope) {
        let Envelope { id, data, job } = envelope;
        let span = info_span!("job", job_id = %id, name = %data.name);
        async move {
            let ctx = self.context(id, &data.status_hook);

            if let Err(err) = job.validate(&data.parameters) {
                error!(error = %err, "job parameters rejected");
                ctx.report(ScanStatus::Error).await;
                return;
            }

            let max_attempts = job.max_fails().max(1);
            for attempt in 1..=max_attempts {
                ctx.report(ScanStatus::Running).await;

                let outcome = tokio::select! {
                    outcome = job.run(&ctx, &data.parameters) => outcome,
                    _ = self.shutdown.cancelled() => {
                        warn!(attempt, "job interrupted by shutdown");
                        ctx.report(ScanStatus::Stopped).await;
                        return;
                    }
                };

                let err = match outcome {
                    Ok(()) => {
                        info!(attempt, "job finished");
                        ctx.report(ScanStatus::Success).await;
                        return;
                    }
                    Err(err) => err,
                };

                if !(job.should_retry() && err.is_retryable()) || attempt == max_attempts {
                    error!(attempt, error = %err, "job failed");
                    ctx.report(ScanStatus::Error).await;
                    return;
                }

                warn!(attempt, max_attempts, error = %err, "job attempt failed; retrying");
                tokio::select! {
                    _ = tokio::time::sleep(self.config.retry_backoff) => {}
                    _ = self.shutdown.cancelled() => {
                        ctx.report(ScanStatus::Stopped).await;
                        return;
                    }
                }
            }
        }
        .instrument(span)
        .await
    }
}
