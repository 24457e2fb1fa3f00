//! Mock transports shared by the session and scheduler tests.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use nimbus_protocol::FileRecord;
use nimbus_transfer::EncodedChunk;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{FinalizeError, TransportError};
use crate::finalize::{FinalizeRequest, FinalizeTransport};
use crate::transport::ChunkTransport;

#[derive(Default)]
struct TransportState {
    /// (upload id, chunk index) of every accepted chunk.
    accepted: Vec<(String, u64)>,
    aborted: usize,
    in_flight: HashMap<String, usize>,
    total_in_flight: usize,
    max_in_flight_per_upload: usize,
    max_total_in_flight: usize,
    max_uploads_in_flight: usize,
    /// Failure returned once for a chunk index.
    failures: HashMap<u64, TransportError>,
}

/// Records chunk requests and lets tests hold them open.
pub struct MockTransport {
    state: Mutex<TransportState>,
    hold: watch::Sender<bool>,
    delay: Option<Duration>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TransportState::default()),
            hold: watch::channel(false).0,
            delay: None,
        }
    }

    /// Every request sleeps for `delay` before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    /// Keeps requests open until [`release`](Self::release) or cancellation.
    pub fn hold(&self) {
        self.hold.send_replace(true);
    }

    pub fn release(&self) {
        self.hold.send_replace(false);
    }

    /// Next request for chunk `index` fails with `error`.
    pub fn fail_chunk(&self, index: u64, error: TransportError) {
        self.state.lock().unwrap().failures.insert(index, error);
    }

    pub fn accepted(&self) -> Vec<(String, u64)> {
        self.state.lock().unwrap().accepted.clone()
    }

    /// Accepted chunk indices of one upload id, sorted.
    pub fn accepted_for(&self, upload_id: &str) -> Vec<u64> {
        let mut indices: Vec<u64> = self
            .accepted()
            .into_iter()
            .filter(|(id, _)| id == upload_id)
            .map(|(_, index)| index)
            .collect();
        indices.sort_unstable();
        indices
    }

    pub fn aborted(&self) -> usize {
        self.state.lock().unwrap().aborted
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().unwrap().total_in_flight
    }

    /// Number of distinct upload ids with a request open right now.
    pub fn uploads_in_flight(&self) -> usize {
        self.state.lock().unwrap().in_flight.len()
    }

    pub fn max_in_flight_per_upload(&self) -> usize {
        self.state.lock().unwrap().max_in_flight_per_upload
    }

    pub fn max_total_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_total_in_flight
    }

    pub fn max_uploads_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_uploads_in_flight
    }

    fn enter(&self, upload_id: &str) {
        let mut s = self.state.lock().unwrap();
        let count = s.in_flight.entry(upload_id.to_string()).or_insert(0);
        *count += 1;
        let count = *count;
        s.total_in_flight += 1;
        s.max_in_flight_per_upload = s.max_in_flight_per_upload.max(count);
        s.max_total_in_flight = s.max_total_in_flight.max(s.total_in_flight);
        s.max_uploads_in_flight = s.max_uploads_in_flight.max(s.in_flight.len());
    }

    fn exit(&self, upload_id: &str, index: u64, result: &Result<(), TransportError>) {
        let mut s = self.state.lock().unwrap();
        if let Some(count) = s.in_flight.get_mut(upload_id) {
            *count -= 1;
            if *count == 0 {
                s.in_flight.remove(upload_id);
            }
        }
        s.total_in_flight -= 1;
        match result {
            Ok(()) => s.accepted.push((upload_id.to_string(), index)),
            Err(TransportError::Aborted) => s.aborted += 1,
            Err(_) => {}
        }
    }

    async fn respond(&self, index: u64) -> Result<(), TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut rx = self.hold.subscribe();
        let _ = rx.wait_for(|held| !*held).await;

        match self.state.lock().unwrap().failures.remove(&index) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl ChunkTransport for MockTransport {
    fn send_chunk(
        &self,
        upload_id: &str,
        chunk: EncodedChunk,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        let upload_id = upload_id.to_string();
        Box::pin(async move {
            self.enter(&upload_id);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TransportError::Aborted),
                result = self.respond(chunk.index) => result,
            };
            self.exit(&upload_id, chunk.index, &result);
            result
        })
    }
}

/// Scripted finalize endpoint.
pub struct MockFinalizer {
    responses: Mutex<VecDeque<Result<FileRecord, FinalizeError>>>,
    calls: Mutex<Vec<(String, FinalizeRequest)>>,
}

impl MockFinalizer {
    /// Answers every call with a record named after the file unless a
    /// scripted response is queued.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_response(&self, response: Result<FileRecord, FinalizeError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<(String, FinalizeRequest)> {
        self.calls.lock().unwrap().clone()
    }

    /// Original names of finalized files, in call order.
    pub fn finalized_names(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|(_, request)| request.original_name)
            .collect()
    }
}

impl FinalizeTransport for MockFinalizer {
    fn finalize<'a>(
        &'a self,
        upload_id: &'a str,
        request: &'a FinalizeRequest,
    ) -> Pin<Box<dyn Future<Output = Result<FileRecord, FinalizeError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push((upload_id.to_string(), request.clone()));
            let scripted = self.responses.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| {
                Ok(FileRecord {
                    message: "Upload successful and file assembled".into(),
                    file_name: request.original_name.clone(),
                    file_directory: request.original_name.clone(),
                    access_path: String::new(),
                })
            })
        })
    }
}

/// Polls `condition` until it holds, panicking after five seconds.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
