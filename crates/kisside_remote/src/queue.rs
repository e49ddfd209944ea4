use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::errors::{local_code, RemoteError, RpcError};
use crate::events::QueueEvent;
use crate::metrics::{QueueMetrics, QueueMetricsSnapshot};
use crate::request::Request;
use crate::response::Response;
use crate::transport::TransportRegistry;

mod driver;

/// How a resolved request ends: a decoded response or the error that stopped
/// it, whichever came first.
pub type CallResult = Result<Response, RpcError>;

/// Queue tuning. `Default` matches the historical client: three parallel
/// requests, a five second timeout, a half second sweep.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Upper bound on concurrently dispatched asynchronous requests.
    pub max_concurrent: usize,
    /// Optional lifetime budget of dispatches. Once spent, the queue accepts
    /// submissions but never dispatches again.
    pub max_total: Option<u64>,
    /// Fallback timeout for requests that do not carry their own. Zero
    /// disables the fallback entirely.
    pub default_timeout_ms: u64,
    /// Sweep cadence for timeouts and dead exchange tasks.
    pub poll_interval_ms: u64,
    pub command_channel_capacity: usize,
    pub signal_channel_capacity: usize,
    pub event_channel_capacity: usize,
    /// Whether dispatch runs at startup. A disabled queue still accepts and
    /// holds submissions.
    pub enabled: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_total: None,
            default_timeout_ms: 5_000,
            poll_interval_ms: 500,
            command_channel_capacity: 256,
            signal_channel_capacity: 1_024,
            event_channel_capacity: 256,
            enabled: true,
        }
    }
}

impl QueueConfig {
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_max_total(mut self, max_total: u64) -> Self {
        self.max_total = Some(max_total);
        self
    }

    pub fn with_default_timeout_ms(mut self, default_timeout_ms: u64) -> Self {
        self.default_timeout_ms = default_timeout_ms;
        self
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn with_command_channel_capacity(mut self, capacity: usize) -> Self {
        self.command_channel_capacity = capacity;
        self
    }

    pub fn with_signal_channel_capacity(mut self, capacity: usize) -> Self {
        self.signal_channel_capacity = capacity;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), RemoteError> {
        if self.max_concurrent == 0 {
            return Err(RemoteError::InvalidConfig(
                "max_concurrent must be at least 1".into(),
            ));
        }
        if self.max_total == Some(0) {
            return Err(RemoteError::InvalidConfig(
                "max_total must be at least 1 when set".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(RemoteError::InvalidConfig(
                "poll_interval_ms must be at least 1".into(),
            ));
        }
        if self.command_channel_capacity == 0
            || self.signal_channel_capacity == 0
            || self.event_channel_capacity == 0
        {
            return Err(RemoteError::InvalidConfig(
                "channel capacities must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) enum QueueCommand {
    Submit {
        request: Request,
        reply: oneshot::Sender<CallResult>,
    },
    Abort {
        seq: u64,
    },
    SetEnabled {
        enabled: bool,
    },
    Shutdown,
}

struct QueueInner {
    config: QueueConfig,
    command_tx: mpsc::Sender<QueueCommand>,
    events_tx: broadcast::Sender<QueueEvent>,
    metrics: Arc<QueueMetrics>,
    driver_task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the queue driver task. Cheap to clone; all clones address the
/// same driver. Dropping every clone without `shutdown` leaves the driver
/// running until the runtime itself stops.
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

impl RequestQueue {
    /// Validates the configuration and spawns the driver task.
    pub fn start(config: QueueConfig, registry: TransportRegistry) -> Result<Self, RemoteError> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(config.command_channel_capacity);
        let (signal_tx, signal_rx) = mpsc::channel(config.signal_channel_capacity);
        let (events_tx, _) = broadcast::channel(config.event_channel_capacity);
        let metrics = Arc::new(QueueMetrics::new());

        let driver = driver::Driver::new(
            config.clone(),
            registry,
            command_rx,
            signal_tx,
            signal_rx,
            events_tx.clone(),
            Arc::clone(&metrics),
        );
        let handle = tokio::spawn(driver.run());

        Ok(Self {
            inner: Arc::new(QueueInner {
                config,
                command_tx,
                events_tx,
                metrics,
                driver_task: Mutex::new(Some(handle)),
            }),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Hands a request to the driver. Resolution arrives through the
    /// returned [`PendingCall`]; the queued lifecycle event is emitted by
    /// the driver once it accepts the request.
    pub async fn submit(&self, request: Request) -> Result<PendingCall, RemoteError> {
        let seq = request.seq();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(QueueCommand::Submit {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RemoteError::QueueClosed)?;
        Ok(PendingCall {
            seq,
            reply: reply_rx,
        })
    }

    /// Aborts a queued or in-flight request. Unknown sequences are ignored,
    /// which makes abort safe to call after resolution.
    pub async fn abort(&self, seq: u64) -> Result<(), RemoteError> {
        self.inner
            .command_tx
            .send(QueueCommand::Abort { seq })
            .await
            .map_err(|_| RemoteError::QueueClosed)
    }

    /// Pauses or resumes dispatch. Held submissions drain in order when the
    /// queue is re-enabled.
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), RemoteError> {
        self.inner
            .command_tx
            .send(QueueCommand::SetEnabled { enabled })
            .await
            .map_err(|_| RemoteError::QueueClosed)
    }

    /// Subscribes to lifecycle events. Slow subscribers miss events rather
    /// than stall the driver.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events_tx.subscribe()
    }

    pub fn metrics_snapshot(&self) -> QueueMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Stops the driver. Outstanding requests resolve with a rejection
    /// carrying the closed-queue message.
    pub async fn shutdown(&self) -> Result<(), RemoteError> {
        let _ = self.inner.command_tx.send(QueueCommand::Shutdown).await;
        let handle = self.inner.driver_task.lock().await.take();
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|err| RemoteError::Internal(format!("queue driver join failed: {err}")))?;
        }
        Ok(())
    }
}

/// One submitted request waiting for resolution. Consume with
/// [`PendingCall::outcome`]; dropping it abandons the result without
/// aborting the request.
pub struct PendingCall {
    seq: u64,
    reply: oneshot::Receiver<CallResult>,
}

impl PendingCall {
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    pub async fn outcome(self) -> CallResult {
        let seq = self.seq;
        match self.reply.await {
            Ok(result) => result,
            Err(_) => Err(RpcError::local(
                local_code::ABORT,
                "request dropped without resolution",
            )
            .with_seq(seq)),
        }
    }
}
