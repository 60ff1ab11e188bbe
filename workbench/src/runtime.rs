//! Async shell around [`Workbench`]: a single task owns the store, reduces
//! incoming actions in batches and executes the effects they produce
//! against the backends.

use std::sync::Arc;

use common::Shared;
use hashbrown::HashMap;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::actions::{Action, DataFilesAction, Effect, JobAction};
use crate::config::WorkbenchConfig;
use crate::data_files::{HduId, Header, Histogram, Library};
use crate::error::{Result, WorkbenchError};
use crate::jobs::{BackendFuture, CorrelationId, JobBackend, JobId};
use crate::store::{Workbench, WorkbenchState};

/// Remote data-file service.
pub trait DataFileBackend: Send + Sync {
    fn load_library(&self) -> BackendFuture<'_, Library>;
    fn load_header(&self, hdu_id: HduId) -> BackendFuture<'_, Header>;
    fn load_histogram(&self, hdu_id: HduId) -> BackendFuture<'_, Histogram>;
    /// Imports survey assets into the library and returns the new HDU ids.
    fn import_assets(&self, provider_id: String, path: String) -> BackendFuture<'_, Vec<HduId>>;
}

#[derive(Debug)]
pub enum RuntimeMessage {
    Exit,
    Dispatch(Action),
    Multi(Vec<Action>),
}

type PollHandles = Shared<HashMap<CorrelationId, JoinHandle<()>>>;

#[derive(Clone)]
struct Backends {
    data_files: Arc<dyn DataFileBackend>,
    jobs: Arc<dyn JobBackend>,
}

#[derive(Debug)]
pub struct WorkbenchRuntime {
    thread_handle: Option<JoinHandle<()>>,
    tx: UnboundedSender<RuntimeMessage>,
    state_rx: watch::Receiver<Arc<WorkbenchState>>,
}

impl WorkbenchRuntime {
    /// Spawns the runtime task. Must be called inside a tokio runtime.
    pub fn new(
        workbench: Workbench,
        data_files: Arc<dyn DataFileBackend>,
        jobs: Arc<dyn JobBackend>,
    ) -> Self {
        let (tx, rx) = unbounded_channel::<RuntimeMessage>();
        let (state_tx, state_rx) = watch::channel(Arc::new(workbench.state().clone()));
        let backends = Backends { data_files, jobs };

        let thread_handle: JoinHandle<()> = tokio::spawn({
            let tx = tx.clone();
            async move {
                runtime_loop(rx, tx, workbench, backends, state_tx).await;
            }
        });

        Self {
            thread_handle: Some(thread_handle),
            tx,
            state_rx,
        }
    }

    pub fn with_config(
        config: WorkbenchConfig,
        data_files: Arc<dyn DataFileBackend>,
        jobs: Arc<dyn JobBackend>,
    ) -> Self {
        Self::new(Workbench::new(config), data_files, jobs)
    }

    pub fn send(&self, msg: RuntimeMessage) -> Result<()> {
        self.tx.send(msg).map_err(|_| WorkbenchError::RuntimeStopped)
    }

    pub fn dispatch(&self, action: impl Into<Action>) -> Result<()> {
        self.send(RuntimeMessage::Dispatch(action.into()))
    }

    pub fn dispatch_all<T: IntoIterator<Item = Action>>(&self, actions: T) -> Result<()> {
        self.send(RuntimeMessage::Multi(actions.into_iter().collect()))
    }

    /// Latest published state.
    pub fn state(&self) -> Arc<WorkbenchState> {
        self.state_rx.borrow().clone()
    }

    /// Receiver notified after every reduced batch.
    pub fn subscribe(&self) -> watch::Receiver<Arc<WorkbenchState>> {
        self.state_rx.clone()
    }

    pub async fn exit(&mut self) {
        if self.tx.send(RuntimeMessage::Exit).is_err() {
            debug!("Runtime already stopped");
        }
        if let Some(thread_handle) = self.thread_handle.take() {
            if let Err(err) = thread_handle.await {
                error!(%err, "Runtime task failed to join");
            }
        }
    }
}

impl Drop for WorkbenchRuntime {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            error!("WorkbenchRuntime dropped while the task is still running; call exit() first");
        }
    }
}

async fn runtime_loop(
    mut rx: UnboundedReceiver<RuntimeMessage>,
    tx: UnboundedSender<RuntimeMessage>,
    mut workbench: Workbench,
    backends: Backends,
    state_tx: watch::Sender<Arc<WorkbenchState>>,
) {
    let polls: PollHandles = Shared::default();
    let mut msgs: Vec<RuntimeMessage> = Vec::new();
    let mut actions: Vec<Action> = Vec::new();

    'runtime: loop {
        let Some(msg) = rx.recv().await else { break };
        msgs.push(msg);

        loop {
            match rx.try_recv() {
                Ok(msg) => msgs.push(msg),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'runtime,
            }
        }

        let mut exit = false;
        for msg in msgs.drain(..) {
            match msg {
                RuntimeMessage::Exit => {
                    exit = true;
                    break;
                }
                RuntimeMessage::Dispatch(action) => actions.push(action),
                RuntimeMessage::Multi(batch) => actions.extend(batch),
            }
        }

        if !actions.is_empty() {
            workbench.dispatch_all(actions.drain(..));
            for effect in workbench.take_effects() {
                run_effect(effect, &backends, &tx, &polls).await;
            }
            state_tx.send_replace(Arc::new(workbench.state().clone()));
        }

        if exit {
            break;
        }
    }

    let mut polls = polls.lock().await;
    for (_, handle) in polls.drain() {
        handle.abort();
    }
    info!("Workbench runtime stopped");
}

fn send_action(tx: &UnboundedSender<RuntimeMessage>, action: impl Into<Action>) -> bool {
    let sent = tx.send(RuntimeMessage::Dispatch(action.into())).is_ok();
    if !sent {
        debug!("Runtime stopped, dropping backend response");
    }
    sent
}

async fn run_effect(
    effect: Effect,
    backends: &Backends,
    tx: &UnboundedSender<RuntimeMessage>,
    polls: &PollHandles,
) {
    let backends = backends.clone();
    let tx = tx.clone();
    match effect {
        Effect::LoadLibrary => {
            tokio::spawn(async move {
                let action = match backends.data_files.load_library().await {
                    Ok(library) => DataFilesAction::LoadLibrarySuccess(library),
                    Err(err) => DataFilesAction::LoadLibraryFail(err.to_string()),
                };
                send_action(&tx, action);
            });
        }
        Effect::LoadHeader(hdu_id) => {
            tokio::spawn(async move {
                let action = match backends.data_files.load_header(hdu_id).await {
                    Ok(header) => DataFilesAction::LoadHduHeaderSuccess { hdu_id, header },
                    Err(err) => DataFilesAction::LoadHduHeaderFail {
                        hdu_id,
                        error: err.to_string(),
                    },
                };
                send_action(&tx, action);
            });
        }
        Effect::LoadHistogram(hdu_id) => {
            tokio::spawn(async move {
                let action = match backends.data_files.load_histogram(hdu_id).await {
                    Ok(histogram) => DataFilesAction::LoadHduHistogramSuccess { hdu_id, histogram },
                    Err(err) => DataFilesAction::LoadHduHistogramFail {
                        hdu_id,
                        error: err.to_string(),
                    },
                };
                send_action(&tx, action);
            });
        }
        Effect::ImportAssets {
            correlation_id,
            provider_id,
            path,
        } => {
            tokio::spawn(async move {
                let action = match backends.data_files.import_assets(provider_id, path).await {
                    Ok(hdu_ids) => DataFilesAction::ImportAssetsCompleted {
                        correlation_id,
                        hdu_ids,
                    },
                    Err(err) => DataFilesAction::ImportAssetsFail {
                        correlation_id,
                        error: err.to_string(),
                    },
                };
                send_action(&tx, action);
            });
        }
        Effect::CreateJob { correlation_id, job } => {
            tokio::spawn(async move {
                let action = match backends.jobs.create(job).await {
                    Ok(job) => JobAction::CreateJobSuccess { correlation_id, job },
                    Err(err) => JobAction::CreateJobFail {
                        correlation_id,
                        error: err.to_string(),
                    },
                };
                send_action(&tx, action);
            });
        }
        Effect::StartPolling {
            correlation_id,
            job_id,
            interval_ms,
        } => {
            start_polling(backends, tx, polls, correlation_id, job_id, interval_ms).await;
        }
        Effect::StopPolling(correlation_id) => {
            if let Some(handle) = polls.lock().await.remove(&correlation_id) {
                handle.abort();
            }
        }
        Effect::CancelJob { correlation_id, job_id } => {
            tokio::spawn(async move {
                if let Err(err) = backends.jobs.cancel(job_id).await {
                    warn!(%correlation_id, %job_id, %err, "Failed to cancel job");
                }
            });
        }
    }
}

/// Spawns a task polling the job until it reaches a terminal state, a poll
/// fails, or the task is aborted. The handle is registered while the table is
/// locked, so the task's own removal on exit always comes after it.
async fn start_polling(
    backends: Backends,
    tx: UnboundedSender<RuntimeMessage>,
    polls: &PollHandles,
    correlation_id: CorrelationId,
    job_id: JobId,
    interval_ms: u64,
) {
    let mut handles = polls.lock().await;
    let task_polls = polls.clone();
    let handle = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let (action, done) = match backends.jobs.poll(job_id).await {
                Ok(job) => {
                    let done = job.state.status.is_terminal();
                    (JobAction::UpdateJobSuccess { correlation_id, job }, done)
                }
                Err(err) => (
                    JobAction::UpdateJobFail {
                        correlation_id,
                        error: err.to_string(),
                    },
                    true,
                ),
            };
            if !send_action(&tx, action) || done {
                break;
            }
        }
        task_polls.lock().await.remove(&correlation_id);
    });
    if let Some(previous) = handles.insert(correlation_id, handle) {
        previous.abort();
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{sleep, timeout};

    use super::*;
    use crate::jobs::JobResult;
    use crate::testing::{MemoryDataFiles, MemoryJobs};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn finished_poll_task_leaves_the_table() {
        let backends = Backends {
            data_files: Arc::new(MemoryDataFiles::default()),
            jobs: Arc::new(MemoryJobs::new(1, JobResult::default())),
        };
        let (tx, mut rx) = unbounded_channel();
        let polls: PollHandles = Shared::default();
        let correlation_id = CorrelationId::unique();

        // unknown job: the first poll fails and ends the task
        start_polling(backends, tx, &polls, correlation_id, JobId::unique(), 1).await;

        let msg = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no poll result")
            .expect("channel closed");
        assert!(matches!(
            msg,
            RuntimeMessage::Dispatch(Action::Jobs(JobAction::UpdateJobFail { .. }))
        ));
        timeout(Duration::from_secs(5), async {
            while !polls.lock().await.is_empty() {
                sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("poll handle was never removed");
    }
}
