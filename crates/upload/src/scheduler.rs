//! Upload scheduler: a bounded pool of file sessions over a user batch.
//!
//! Files can be added at any time. Every state change runs the pump, which
//! makes sure each file has a progress record and starts sessions for
//! pending files while slots are free and uploads are not paused.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use nimbus_transfer::FileSource;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::session::{
    FileUploadSession, ProgressSink, SessionContext, SessionControl, SessionOutcome,
};
use crate::types::{
    FileId, PendingHandoff, SelectableFile, UploadConfig, UploadEvent, UploadProgress,
    UploadState,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct SchedulerState {
    files: Vec<SelectableFile>,
    progress: HashMap<FileId, UploadProgress>,
    /// Running sessions. A deleted file stays here until its task exits so
    /// the slot is only reused once the session is really gone.
    active: HashMap<FileId, Arc<SessionControl>>,
    paused: bool,
}

struct SchedulerInner {
    config: UploadConfig,
    ctx: SessionContext,
    state: Mutex<SchedulerState>,
    events_tx: mpsc::Sender<UploadEvent>,
    idle_tx: watch::Sender<bool>,
}

/// Schedules uploads of a batch of files.
///
/// Sessions are spawned on the current Tokio runtime, so methods that can
/// start uploads must be called from within one.
pub struct UploadScheduler {
    inner: Arc<SchedulerInner>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
}

impl UploadScheduler {
    pub fn new(config: UploadConfig, ctx: SessionContext) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let inner = SchedulerInner {
            config,
            ctx,
            state: Mutex::new(SchedulerState::default()),
            events_tx,
            idle_tx: watch::channel(true).0,
        };
        Self {
            inner: Arc::new(inner),
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    pub fn config(&self) -> &UploadConfig {
        &self.inner.config
    }

    /// Adds files to the batch and starts uploading them.
    ///
    /// Sources whose (name, size, content type, modification time) match a
    /// file already in the batch are skipped. Returns the ids of the files
    /// actually added.
    pub fn add_files(&self, sources: impl IntoIterator<Item = FileSource>) -> Vec<FileId> {
        self.add_selectable(sources.into_iter().map(SelectableFile::new))
    }

    /// Adds the files carried over from a previous scheduler, keeping their ids.
    pub fn accept_handoff(&self, handoff: PendingHandoff) -> Vec<FileId> {
        info!(files = handoff.len(), "accepting pending uploads");
        self.add_selectable(handoff.files)
    }

    fn add_selectable(&self, files: impl IntoIterator<Item = SelectableFile>) -> Vec<FileId> {
        let mut added = Vec::new();
        {
            let mut state = self.inner.lock();
            let mut known: HashSet<_> = state.files.iter().map(|f| f.source.dedup_key()).collect();
            for file in files {
                if !known.insert(file.source.dedup_key()) {
                    debug!(file = %file.source.name(), "skipping duplicate file");
                    continue;
                }
                added.push(file.id);
                state.files.push(file);
            }
        }
        if !added.is_empty() {
            info!(added = added.len(), "files added to upload batch");
            self.inner.pump(false);
        }
        added
    }

    /// Removes a file. An active upload of it is cancelled and never finalized.
    ///
    /// Returns `false` if the file is unknown.
    pub fn delete(&self, file_id: FileId) -> bool {
        {
            let mut state = self.inner.lock();
            let Some(pos) = state.files.iter().position(|f| f.id == file_id) else {
                return false;
            };
            let file = state.files.remove(pos);
            state.progress.remove(&file_id);
            if let Some(control) = state.active.get(&file_id) {
                control.cancel();
            }
            info!(file = %file.source.name(), %file_id, "file removed from batch");
        }
        self.inner.pump(false);
        true
    }

    /// Pauses every active session and stops new ones from starting.
    pub fn pause(&self) {
        let mut state = self.inner.lock();
        if state.paused {
            return;
        }
        state.paused = true;
        for control in state.active.values() {
            control.pause();
        }
        info!(active = state.active.len(), "uploads paused");
    }

    /// Resumes paused sessions and starts pending files.
    pub fn resume(&self) {
        {
            let mut state = self.inner.lock();
            if !state.paused {
                return;
            }
            state.paused = false;
            for control in state.active.values() {
                control.resume();
            }
            info!(active = state.active.len(), "uploads resumed");
        }
        self.inner.pump(false);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// Re-queues one failed file. Returns `false` if it is not in `Error`.
    pub fn retry(&self, file_id: FileId) -> bool {
        let reset = {
            let mut state = self.inner.lock();
            let SchedulerState {
                progress, active, ..
            } = &mut *state;
            match progress.get_mut(&file_id) {
                Some(record) if record.state == UploadState::Error && !active.contains_key(&file_id) => {
                    reset_to_pending(record);
                    self.inner.emit(UploadEvent::Progress(record.clone()));
                    true
                }
                _ => false,
            }
        };
        if reset {
            self.inner.pump(false);
        }
        reset
    }

    /// Re-queues every failed file.
    pub fn retry_all(&self) {
        self.inner.pump(true);
    }

    /// Progress records in the order the files were added.
    pub fn snapshot(&self) -> Vec<UploadProgress> {
        let state = self.inner.lock();
        state
            .files
            .iter()
            .filter_map(|f| state.progress.get(&f.id).cloned())
            .collect()
    }

    pub fn progress_of(&self, file_id: FileId) -> Option<UploadProgress> {
        self.inner.lock().progress.get(&file_id).cloned()
    }

    /// Files still waiting to upload or stopped by an error.
    pub fn pending_or_error(&self) -> Vec<FileId> {
        let state = self.inner.lock();
        state
            .files
            .iter()
            .filter(|f| {
                state
                    .progress
                    .get(&f.id)
                    .is_some_and(UploadProgress::is_pending_or_error)
            })
            .map(|f| f.id)
            .collect()
    }

    /// Returns `true` while any session is running (paused sessions included).
    pub fn is_uploading(&self) -> bool {
        !self.inner.lock().active.is_empty()
    }

    /// Waits until no session is running and, while paused, no file is
    /// left waiting to start.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.idle_tx.subscribe();
        let _ = rx.wait_for(|idle| *idle).await;
    }

    /// Drops completed files from the batch. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        let mut state = self.inner.lock();
        let SchedulerState {
            files, progress, ..
        } = &mut *state;
        let before = files.len();
        files.retain(|f| {
            let done = progress
                .get(&f.id)
                .is_some_and(|p| p.state == UploadState::Completed);
            if done {
                progress.remove(&f.id);
            }
            !done
        });
        before - files.len()
    }

    /// Cancels every session and empties the batch.
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        for control in state.active.values() {
            control.cancel();
        }
        state.files.clear();
        state.progress.clear();
        state.paused = false;
        info!("upload batch reset");
        drop(state);
        self.inner.pump(false);
    }

    /// Tears the scheduler down, returning the files that have not
    /// completed so a new scheduler can pick them up. Running sessions are
    /// cancelled; their files start over in the next scheduler.
    pub fn into_handoff(self) -> PendingHandoff {
        let state = self.inner.lock();
        let files: Vec<SelectableFile> = state
            .files
            .iter()
            .filter(|f| {
                state
                    .progress
                    .get(&f.id)
                    .is_none_or(|p| p.state != UploadState::Completed)
            })
            .cloned()
            .collect();
        debug!(files = files.len(), "handing off pending uploads");
        PendingHandoff { files }
    }
}

impl Drop for UploadScheduler {
    /// Cancels running sessions and forgets the batch so finishing tasks
    /// start nothing new.
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        for control in state.active.values() {
            control.cancel();
        }
        state.files.clear();
        state.progress.clear();
    }
}

impl SchedulerInner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: UploadEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.events_tx.try_send(event) {
            debug!("upload event channel full, dropping event");
        }
    }

    /// Starts sessions for pending files while slots are free.
    ///
    /// On a retry pass, files in `Error` are reset to `Pending` first.
    fn pump(self: &Arc<Self>, retry_errors: bool) {
        let mut state = self.lock();
        let SchedulerState {
            files,
            progress,
            active,
            paused,
        } = &mut *state;

        for file in files.iter() {
            progress
                .entry(file.id)
                .or_insert_with(|| UploadProgress::pending(file));
        }

        if retry_errors {
            for file in files.iter() {
                if active.contains_key(&file.id) {
                    continue;
                }
                if let Some(record) = progress.get_mut(&file.id)
                    && record.state == UploadState::Error
                {
                    reset_to_pending(record);
                    self.emit(UploadEvent::Progress(record.clone()));
                }
            }
        }

        if !*paused {
            let free = self.config.max_concurrent_uploads.saturating_sub(active.len());
            let candidates: Vec<SelectableFile> = files
                .iter()
                .filter(|f| {
                    !active.contains_key(&f.id)
                        && progress
                            .get(&f.id)
                            .is_some_and(|p| p.state == UploadState::Pending)
                })
                .take(free)
                .cloned()
                .collect();

            for file in candidates {
                let control = Arc::new(SessionControl::new());
                active.insert(file.id, control.clone());
                if let Some(record) = progress.get_mut(&file.id) {
                    record.state = UploadState::Uploading;
                    record.percent = 0;
                    record.error_message = None;
                    self.emit(UploadEvent::Progress(record.clone()));
                }
                self.start_session(file, control);
            }
        }

        // Paused files still waiting keep the batch busy until resume.
        let idle = active.is_empty()
            && (!*paused
                || !progress
                    .values()
                    .any(|p| p.state == UploadState::Pending));
        let became_idle = self.idle_tx.send_if_modified(|current| {
            let changed = *current != idle;
            *current = idle;
            changed
        }) && idle;
        if became_idle {
            debug!("upload batch idle");
            self.emit(UploadEvent::Idle);
        }
    }

    fn start_session(self: &Arc<Self>, file: SelectableFile, control: Arc<SessionControl>) {
        let file_id = file.id;
        let sink_inner = Arc::clone(self);
        let sink_control = control.clone();
        let progress: ProgressSink =
            Arc::new(move |percent| sink_inner.record_progress(file_id, &sink_control, percent));

        let session = FileUploadSession::new(
            &file,
            self.ctx.clone(),
            &self.config,
            control.clone(),
            progress,
        );
        debug!(file = %file.source.name(), %file_id, upload_id = session.upload_id(), "starting session");

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = session.run().await;
            inner.finish_session(file_id, &control, outcome);
            inner.pump(false);
        });
    }

    fn record_progress(&self, file_id: FileId, control: &Arc<SessionControl>, percent: u8) {
        let mut state = self.lock();
        let is_current = state
            .active
            .get(&file_id)
            .is_some_and(|c| Arc::ptr_eq(c, control));
        if !is_current || control.is_cancelled() {
            return;
        }
        if let Some(record) = state.progress.get_mut(&file_id)
            && record.state == UploadState::Uploading
        {
            record.percent = percent;
            self.emit(UploadEvent::Progress(record.clone()));
        }
    }

    fn finish_session(&self, file_id: FileId, control: &Arc<SessionControl>, outcome: SessionOutcome) {
        let mut state = self.lock();
        if state
            .active
            .get(&file_id)
            .is_some_and(|c| Arc::ptr_eq(c, control))
        {
            state.active.remove(&file_id);
        }

        let Some(record) = state.progress.get_mut(&file_id) else {
            debug!(%file_id, "session finished for removed file");
            return;
        };

        match outcome {
            SessionOutcome::Completed(file_record) => {
                record.state = UploadState::Completed;
                record.percent = 100;
                record.error_message = None;
                self.emit(UploadEvent::Progress(record.clone()));
                self.emit(UploadEvent::Completed {
                    file_id,
                    record: file_record,
                });
            }
            SessionOutcome::Failed(err) => {
                let message = err.to_string();
                error!(file = %record.display_name, %file_id, error = %message, "upload failed");
                record.state = UploadState::Error;
                record.error_message = Some(message.clone());
                self.emit(UploadEvent::Progress(record.clone()));
                self.emit(UploadEvent::Failed {
                    file_id,
                    error: message,
                });
            }
            SessionOutcome::Cancelled => {
                if record.state == UploadState::Uploading {
                    reset_to_pending(record);
                    self.emit(UploadEvent::Progress(record.clone()));
                }
            }
        }
    }
}

fn reset_to_pending(record: &mut UploadProgress) {
    record.state = UploadState::Pending;
    record.percent = 0;
    record.error_message = None;
}
