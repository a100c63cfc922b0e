//! The converter session and its actor.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};

use crate::{ConvertBackend, ConvertError, Result};

/// The settings of a converter session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The time limit of every conversion.
    pub timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
        }
    }
}

/// The lifecycle of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// The backend is warming up.
    Starting,
    /// Conversions are accepted.
    Ready,
    /// The backend could not be started.
    Failed(String),
    /// The session was closed.
    Closed,
}

/// The progress of one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionStatus {
    /// Waiting for earlier conversions.
    Queued,
    /// Handed to the backend.
    Running,
    /// Converted successfully.
    Finished,
    /// The conversion failed.
    Failed(String),
    /// The conversion exceeded the time limit.
    TimedOut,
}

impl ConversionStatus {
    /// Whether the conversion is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed(_) | Self::TimedOut)
    }
}

struct Job {
    id: u64,
    input: Bytes,
    name: String,
    status: watch::Sender<ConversionStatus>,
    reply: oneshot::Sender<Result<Bytes>>,
}

enum Request {
    Convert(Job),
    Close(oneshot::Sender<()>),
}

/// A handle to a submitted conversion.
///
/// Dropping the handle does not cancel the conversion; its result is
/// discarded.
pub struct Conversion {
    id: u64,
    status: watch::Receiver<ConversionStatus>,
    result: oneshot::Receiver<Result<Bytes>>,
}

impl Conversion {
    /// The correlation id of the conversion.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The current status.
    pub fn status(&self) -> ConversionStatus {
        self.status.borrow().clone()
    }

    /// The statuses of the conversion, from the current one up to the
    /// terminal one.
    ///
    /// Statuses replaced before they were observed are skipped.
    pub fn progress(&self) -> impl Stream<Item = ConversionStatus> + use<> {
        let mut status = self.status.clone();
        status.mark_changed();
        futures::stream::unfold(Some(status), |status| async move {
            let mut status = status?;
            if status.changed().await.is_err() {
                return None;
            }
            let current = status.borrow_and_update().clone();
            let next = (!current.is_terminal()).then_some(status);
            Some((current, next))
        })
    }

    /// Waits for the converted PDF bytes.
    pub async fn wait(self) -> Result<Bytes> {
        self.result.await.unwrap_or(Err(ConvertError::Closed))
    }
}

/// A session owning one conversion backend.
#[derive(Clone)]
pub struct ConverterSession {
    tx: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<SessionState>,
    pending: Arc<Mutex<HashSet<u64>>>,
    next_id: Arc<AtomicU64>,
}

impl ConverterSession {
    /// Opens a session, warming the backend up in the background.
    ///
    /// Must be called within a tokio runtime.
    pub fn open(backend: impl ConvertBackend, config: SessionConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(SessionState::Starting);
        let pending = Arc::new(Mutex::new(HashSet::new()));

        let actor = SessionActor {
            backend: Box::new(backend),
            config,
            rx,
            state: state_tx,
            pending: pending.clone(),
        };
        tokio::spawn(actor.run());

        Self {
            tx,
            state,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Whether conversions run right away.
    pub fn is_ready(&self) -> bool {
        *self.state.borrow() == SessionState::Ready
    }

    /// Waits until the backend has warmed up.
    pub async fn ready(&self) -> Result<()> {
        let mut state = self.state.clone();
        let state = state
            .wait_for(|state| *state != SessionState::Starting)
            .await
            .map_err(|_| ConvertError::Closed)?;
        match &*state {
            SessionState::Ready => Ok(()),
            SessionState::Failed(msg) => Err(ConvertError::NotReady(msg.clone())),
            SessionState::Starting | SessionState::Closed => Err(ConvertError::Closed),
        }
    }

    /// Submits a conversion under a fresh correlation id.
    pub fn convert(&self, input: impl Into<Bytes>, name: &str) -> Result<Conversion> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.convert_as(id, input, name)
    }

    /// Submits a conversion under the given correlation id, which must not
    /// be pending already.
    pub fn convert_as(&self, id: u64, input: impl Into<Bytes>, name: &str) -> Result<Conversion> {
        if !self.pending.lock().insert(id) {
            return Err(ConvertError::Duplicate(id));
        }

        let (status_tx, status) = watch::channel(ConversionStatus::Queued);
        let (reply, result) = oneshot::channel();
        let job = Job {
            id,
            input: input.into(),
            name: name.to_owned(),
            status: status_tx,
            reply,
        };
        if self.tx.send(Request::Convert(job)).is_err() {
            self.pending.lock().remove(&id);
            return Err(ConvertError::Closed);
        }

        log::debug!("Conversion({id}): queued");
        Ok(Conversion { id, status, result })
    }

    /// Closes the session after the conversions submitted so far.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Request::Close(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

struct SessionActor {
    backend: Box<dyn ConvertBackend>,
    config: SessionConfig,
    rx: mpsc::UnboundedReceiver<Request>,
    state: watch::Sender<SessionState>,
    pending: Arc<Mutex<HashSet<u64>>>,
}

impl SessionActor {
    async fn run(mut self) {
        let warm_up = self.backend.warm_up().await;
        let failure = warm_up.err().map(|err| err.to_string());
        match &failure {
            None => {
                log::info!("ConverterSession: ready");
                self.state.send_replace(SessionState::Ready);
            }
            Some(msg) => {
                log::error!("ConverterSession: failed to start: {msg}");
                self.state.send_replace(SessionState::Failed(msg.clone()));
            }
        }

        while let Some(req) = self.rx.recv().await {
            match req {
                Request::Convert(job) => match &failure {
                    None => self.convert(job).await,
                    Some(msg) => self.finish(job, Err(ConvertError::NotReady(msg.clone()))),
                },
                Request::Close(tx) => {
                    log::info!("ConverterSession: closing");
                    let _ = tx.send(());
                    break;
                }
            }
        }

        // Requests still queued are answered by dropping their reply senders.
        self.rx.close();
        while let Ok(req) = self.rx.try_recv() {
            if let Request::Convert(job) = req {
                self.finish(job, Err(ConvertError::Closed));
            }
        }
        self.state.send_replace(SessionState::Closed);
    }

    async fn convert(&self, job: Job) {
        let id = job.id;
        job.status.send_replace(ConversionStatus::Running);
        log::debug!("Conversion({id}): running {}", job.name);

        let convert = self.backend.convert(job.input.clone(), &job.name);
        let result = match tokio::time::timeout(self.config.timeout, convert).await {
            Ok(result) => result,
            Err(_) => Err(ConvertError::TimedOut(self.config.timeout)),
        };
        self.finish(job, result);
    }

    fn finish(&self, job: Job, result: Result<Bytes>) {
        let id = job.id;
        let status = match &result {
            Ok(pdf) => {
                log::info!("Conversion({id}): finished, {} bytes", pdf.len());
                ConversionStatus::Finished
            }
            Err(ConvertError::TimedOut(limit)) => {
                log::warn!("Conversion({id}): timed out after {limit:?}");
                ConversionStatus::TimedOut
            }
            Err(err) => {
                log::warn!("Conversion({id}): {err}");
                ConversionStatus::Failed(err.to_string())
            }
        };

        self.pending.lock().remove(&id);
        job.status.send_replace(status);
        if job.reply.send(result).is_err() {
            log::debug!("Conversion({id}): result discarded");
        }
    }
}
