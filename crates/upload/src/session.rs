//! Upload of one file: chunk workers, pause/resume, and finalization.
//!
//! A session owns one upload attempt. Chunk indices sit in a shared work
//! queue; up to `max_chunks_per_file` workers pop an index, encode it on
//! the blocking pool, and send it. The file is finalized only after every
//! chunk has been confirmed by the transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use nimbus_protocol::FileRecord;
use nimbus_transfer::ChunkCodec;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::abort::{AbortReason, AbortRegistry};
use crate::credentials::CredentialStore;
use crate::error::{TransportError, UploadError};
use crate::finalize::FinalizationClient;
use crate::transport::ChunkTransport;
use crate::types::{FileId, SelectableFile, UploadConfig};

/// Receives the completion percentage (0..=100) after every confirmed chunk.
pub type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

/// Collaborators shared by every session of a scheduler.
#[derive(Clone)]
pub struct SessionContext {
    pub transport: Arc<dyn ChunkTransport>,
    pub finalizer: Arc<FinalizationClient>,
    pub credentials: Arc<CredentialStore>,
}

impl SessionContext {
    pub fn new(
        transport: Arc<dyn ChunkTransport>,
        finalizer: Arc<FinalizationClient>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self {
            transport,
            finalizer,
            credentials,
        }
    }
}

/// External controls of a running session.
pub struct SessionControl {
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
    registry: Arc<AbortRegistry>,
}

impl SessionControl {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            paused: watch::channel(false).0,
            registry: Arc::new(AbortRegistry::new()),
        }
    }

    /// Aborts in-flight chunk requests and holds workers until resumed.
    /// Aborted chunks are requeued.
    pub fn pause(&self) {
        self.paused.send_replace(true);
        let aborted = self.registry.abort_all(AbortReason::Pause);
        debug!(aborted, "session paused");
    }

    pub fn resume(&self) {
        self.registry.resume();
        self.paused.send_replace(false);
    }

    /// Stops the session for good. Nothing is reported for aborted chunks.
    pub fn cancel(&self) {
        self.registry.abort_all(AbortReason::UserCancel);
        self.cancel.cancel();
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of chunk requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.registry.in_flight()
    }
}

impl Default for SessionControl {
    fn default() -> Self {
        Self::new()
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum SessionOutcome {
    Completed(FileRecord),
    /// Cancelled through [`SessionControl::cancel`].
    Cancelled,
    Failed(UploadError),
}

/// Drives every chunk of one file to the backend and finalizes it.
pub struct FileUploadSession {
    file_id: FileId,
    upload_id: Arc<str>,
    codec: Arc<ChunkCodec>,
    ctx: SessionContext,
    collection_id: Option<String>,
    max_chunks: usize,
    control: Arc<SessionControl>,
    progress: ProgressSink,
}

impl FileUploadSession {
    /// Prepares an upload attempt with a fresh upload id.
    pub fn new(
        file: &SelectableFile,
        ctx: SessionContext,
        config: &UploadConfig,
        control: Arc<SessionControl>,
        progress: ProgressSink,
    ) -> Self {
        Self {
            file_id: file.id,
            upload_id: Uuid::new_v4().to_string().into(),
            codec: Arc::new(ChunkCodec::new(file.source.clone(), config.chunk_size)),
            ctx,
            collection_id: config.collection_id.clone(),
            max_chunks: config.max_chunks_per_file.max(1),
            control,
            progress,
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn total_chunks(&self) -> u64 {
        self.codec.plan().total_chunks()
    }

    /// Runs the upload to completion, cancellation, or failure.
    pub async fn run(self) -> SessionOutcome {
        let name = self.codec.source().name().to_string();
        let total = self.total_chunks();
        info!(
            file = %name,
            file_id = %self.file_id,
            upload_id = %self.upload_id,
            total_chunks = total,
            "upload started"
        );

        let credentials = match self.ctx.credentials.resolve() {
            Ok(credentials) => credentials,
            Err(e) => return SessionOutcome::Failed(e.into()),
        };

        let queue = Arc::new(WorkQueue::new(total));
        let stop = self.control.cancel.child_token();
        let worker_count = usize::try_from(total)
            .unwrap_or(usize::MAX)
            .min(self.max_chunks);

        let mut workers = JoinSet::new();
        for _ in 0..worker_count {
            let worker = ChunkWorker {
                upload_id: self.upload_id.clone(),
                codec: self.codec.clone(),
                transport: self.ctx.transport.clone(),
                registry: self.control.registry.clone(),
                queue: queue.clone(),
                stop: stop.clone(),
                paused: self.control.paused.subscribe(),
                progress: self.progress.clone(),
            };
            workers.spawn(worker.run());
        }

        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(UploadError::Task(e.to_string())));
            if let Err(err) = result {
                if failure.is_none() {
                    stop.cancel();
                    self.control.registry.abort_all(AbortReason::SessionFailed);
                    failure = Some(err);
                } else {
                    debug!(upload_id = %self.upload_id, error = %err, "additional chunk failure");
                }
            }
        }

        if self.control.is_cancelled() {
            info!(file = %name, upload_id = %self.upload_id, "upload cancelled");
            return SessionOutcome::Cancelled;
        }
        if let Some(err) = failure {
            warn!(file = %name, upload_id = %self.upload_id, error = %err, "upload failed");
            return SessionOutcome::Failed(err);
        }

        let completed = queue.completed();
        if completed != total {
            return SessionOutcome::Failed(UploadError::Incomplete { completed, total });
        }

        let finalize = self.ctx.finalizer.finalize(
            &self.upload_id,
            total,
            &name,
            credentials,
            self.collection_id.clone(),
        );
        let result = tokio::select! {
            biased;
            _ = self.control.cancel.cancelled() => return SessionOutcome::Cancelled,
            result = finalize => result,
        };

        match result {
            Ok(record) => {
                info!(
                    file = %name,
                    upload_id = %self.upload_id,
                    stored_as = %record.file_name,
                    "upload finalized"
                );
                SessionOutcome::Completed(record)
            }
            Err(err) => {
                warn!(file = %name, upload_id = %self.upload_id, error = %err, "finalization failed");
                SessionOutcome::Failed(err)
            }
        }
    }
}

struct QueueState {
    pending: VecDeque<u64>,
    completed: u64,
    total: u64,
}

/// Chunk indices still to send plus the confirmed count.
///
/// Pop, requeue, and completion all go through one lock so the count and
/// the reported percentage advance together.
struct WorkQueue {
    inner: Mutex<QueueState>,
}

impl WorkQueue {
    fn new(total: u64) -> Self {
        Self {
            inner: Mutex::new(QueueState {
                pending: (0..total).collect(),
                completed: 0,
                total,
            }),
        }
    }

    fn pop(&self) -> Option<u64> {
        self.lock().pending.pop_front()
    }

    /// Puts an aborted chunk back at the head of the queue.
    fn requeue(&self, index: u64) {
        self.lock().pending.push_front(index);
    }

    fn complete(&self, progress: &ProgressSink) {
        let mut state = self.lock();
        state.completed += 1;
        progress(percent(state.completed, state.total));
    }

    fn completed(&self) -> u64 {
        self.lock().completed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn percent(completed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

struct ChunkWorker {
    upload_id: Arc<str>,
    codec: Arc<ChunkCodec>,
    transport: Arc<dyn ChunkTransport>,
    registry: Arc<AbortRegistry>,
    queue: Arc<WorkQueue>,
    stop: CancellationToken,
    paused: watch::Receiver<bool>,
    progress: ProgressSink,
}

impl ChunkWorker {
    async fn run(mut self) -> Result<(), UploadError> {
        loop {
            if !self.wait_until_runnable().await {
                return Ok(());
            }
            let Some(index) = self.queue.pop() else {
                return Ok(());
            };

            let codec = self.codec.clone();
            let chunk = tokio::task::spawn_blocking(move || codec.encode(index))
                .await
                .map_err(|e| UploadError::Task(e.to_string()))??;

            let ticket = self.registry.register();
            let result = self
                .transport
                .send_chunk(&self.upload_id, chunk, ticket.token())
                .await;
            let reason = self.registry.release(ticket);

            match result {
                Ok(()) => self.queue.complete(&self.progress),
                Err(TransportError::Aborted) => match reason {
                    Some(AbortReason::Pause) => {
                        debug!(upload_id = %self.upload_id, index, "chunk aborted by pause, requeued");
                        self.queue.requeue(index);
                    }
                    Some(AbortReason::UserCancel | AbortReason::SessionFailed) => return Ok(()),
                    None => return Err(UploadError::TransportAbort { index }),
                },
                Err(TransportError::Http { status, body }) => {
                    return Err(UploadError::TransportHttp { status, body });
                }
                Err(TransportError::Network(message)) => return Err(UploadError::Network(message)),
            }
        }
    }

    /// Blocks while paused. Returns `false` once the session is stopping.
    async fn wait_until_runnable(&mut self) -> bool {
        if self.stop.is_cancelled() {
            return false;
        }
        if !*self.paused.borrow() {
            return true;
        }
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => false,
            resumed = self.paused.wait_for(|paused| !*paused) => resumed.is_ok(),
        }
    }
}
