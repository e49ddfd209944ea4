use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::errors::{local_code, RemoteError, RpcError};
use crate::events::{now_millis, LifecyclePhase, QueueEvent};
use crate::exchange::{self, ExchangeSignal, TerminalOutcome};
use crate::metrics::QueueMetrics;
use crate::request::Request;
use crate::transport::status::is_local_url;
use crate::transport::{StateTracker, TransportRegistry, TransportState};

use super::{CallResult, QueueCommand, QueueConfig};

/// Single-writer owner of all queue state. Runs as one task; every mutation
/// arrives as a command or an exchange signal, so no lock guards the maps.
pub(crate) struct Driver {
    config: QueueConfig,
    registry: TransportRegistry,
    command_rx: mpsc::Receiver<QueueCommand>,
    signal_tx: mpsc::Sender<ExchangeSignal>,
    signal_rx: mpsc::Receiver<ExchangeSignal>,
    events_tx: broadcast::Sender<QueueEvent>,
    metrics: Arc<QueueMetrics>,
    pending: VecDeque<PendingEntry>,
    active: HashMap<u64, ActiveExchange>,
    dispatched_total: u64,
    enabled: bool,
}

struct PendingEntry {
    request: Request,
    reply: oneshot::Sender<CallResult>,
}

struct ActiveExchange {
    coalesce: bool,
    sent_at: Instant,
    timeout: Option<Duration>,
    tracker: StateTracker,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    reply: oneshot::Sender<CallResult>,
}

impl Driver {
    pub(crate) fn new(
        config: QueueConfig,
        registry: TransportRegistry,
        command_rx: mpsc::Receiver<QueueCommand>,
        signal_tx: mpsc::Sender<ExchangeSignal>,
        signal_rx: mpsc::Receiver<ExchangeSignal>,
        events_tx: broadcast::Sender<QueueEvent>,
        metrics: Arc<QueueMetrics>,
    ) -> Self {
        let enabled = config.enabled;
        Self {
            config,
            registry,
            command_rx,
            signal_tx,
            signal_rx,
            events_tx,
            metrics,
            pending: VecDeque::new(),
            active: HashMap::new(),
            dispatched_total: 0,
            enabled,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut sweep =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_command = self.command_rx.recv() => {
                    match maybe_command {
                        Some(QueueCommand::Submit { request, reply }) => {
                            self.handle_submit(request, reply);
                        }
                        Some(QueueCommand::Abort { seq }) => self.handle_abort(seq),
                        Some(QueueCommand::SetEnabled { enabled }) => {
                            self.handle_set_enabled(enabled);
                        }
                        Some(QueueCommand::Shutdown) | None => break,
                    }
                }
                maybe_signal = self.signal_rx.recv() => {
                    if let Some(signal) = maybe_signal {
                        self.handle_signal(signal);
                    }
                }
                _ = sweep.tick() => {
                    self.sweep_active().await;
                    self.drain();
                }
            }
        }

        self.close_all();
        tracing::debug!("queue driver stopped");
    }

    fn handle_submit(&mut self, request: Request, reply: oneshot::Sender<CallResult>) {
        let seq = request.seq();
        let synchronous = !request.asynchronous;
        self.metrics.record_submitted();
        self.emit(seq, LifecyclePhase::Queued, request.coalesce_failures);
        tracing::debug!(seq, url = %request.url, synchronous, "request queued");

        let entry = PendingEntry { request, reply };
        if synchronous {
            // Synchronous submissions are admitted head-of-line.
            self.pending.push_front(entry);
        } else {
            self.pending.push_back(entry);
        }
        self.drain();
    }

    /// Dispatch from the head of the queue until a gate holds it back.
    /// Order is never reshuffled: when the head cannot go, nothing behind
    /// it goes either.
    fn drain(&mut self) {
        if !self.enabled {
            return;
        }
        loop {
            let Some(head) = self.pending.front() else {
                break;
            };
            if let Some(cap) = self.config.max_total {
                if self.dispatched_total >= cap {
                    break;
                }
            }
            let bypass_cap = !head.request.asynchronous;
            if !bypass_cap && self.active.len() >= self.config.max_concurrent {
                break;
            }
            let Some(entry) = self.pending.pop_front() else {
                break;
            };
            self.dispatch(entry);
        }
    }

    fn dispatch(&mut self, entry: PendingEntry) {
        let PendingEntry { request, reply } = entry;
        let seq = request.seq();

        let transport = match self.registry.select(&request) {
            Ok(transport) => transport,
            Err(err) => {
                tracing::warn!(seq, error = %err, "no transport accepts request");
                self.metrics.record_pending_resolved(LifecyclePhase::Failed);
                self.emit(seq, LifecyclePhase::Failed, request.coalesce_failures);
                let _ = reply.send(Err(RpcError::from(err).with_seq(seq)));
                return;
            }
        };

        self.dispatched_total += 1;
        self.metrics.record_dispatched();
        tracing::debug!(seq, transport = transport.name(), "request dispatched");

        let timeout = match request.timeout_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None if self.config.default_timeout_ms == 0 => None,
            None => Some(Duration::from_millis(self.config.default_timeout_ms)),
        };
        let coalesce = request.coalesce_failures;
        let local_file = is_local_url(&request.url);

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(exchange::run_exchange(
            request,
            transport,
            self.signal_tx.clone(),
            cancel_rx,
            local_file,
        ));

        self.active.insert(
            seq,
            ActiveExchange {
                coalesce,
                sent_at: Instant::now(),
                timeout,
                tracker: StateTracker::new(),
                cancel: Some(cancel_tx),
                task: Some(task),
                reply,
            },
        );
    }

    fn handle_signal(&mut self, signal: ExchangeSignal) {
        match signal {
            ExchangeSignal::State { seq, state } => {
                let Some(entry) = self.active.get_mut(&seq) else {
                    tracing::trace!(seq, ?state, "state signal for unknown exchange");
                    return;
                };
                let coalesce = entry.coalesce;
                let reached = entry.tracker.advance_to(state);
                for state in reached {
                    if let Some(phase) = phase_of(state) {
                        self.emit(seq, phase, coalesce);
                    }
                }
            }
            ExchangeSignal::Terminal { seq, outcome } => {
                let Some(entry) = self.active.remove(&seq) else {
                    // Late outcome for a request already timed out or
                    // aborted. The first resolution won; discard.
                    tracing::trace!(seq, "terminal signal for unknown exchange");
                    return;
                };
                let (target, phase, result) = match outcome {
                    TerminalOutcome::Completed(response) => (
                        TransportState::Completed,
                        LifecyclePhase::Completed,
                        Ok(response),
                    ),
                    TerminalOutcome::Failed(err) => {
                        (TransportState::Failed, LifecyclePhase::Failed, Err(err))
                    }
                };
                self.resolve_active(seq, entry, target, phase, result);
                self.drain();
            }
        }
    }

    fn handle_abort(&mut self, seq: u64) {
        if self.active.contains_key(&seq) {
            tracing::debug!(seq, "aborting in-flight request");
            self.force_terminal(
                seq,
                TransportState::Aborted,
                LifecyclePhase::Aborted,
                RpcError::local(local_code::ABORT, "request aborted"),
            );
            self.drain();
            return;
        }
        if let Some(index) = self
            .pending
            .iter()
            .position(|entry| entry.request.seq() == seq)
        {
            if let Some(entry) = self.pending.remove(index) {
                tracing::debug!(seq, "aborting queued request");
                self.metrics.record_pending_resolved(LifecyclePhase::Aborted);
                self.emit(seq, LifecyclePhase::Aborted, entry.request.coalesce_failures);
                let _ = entry.reply.send(Err(RpcError::local(
                    local_code::ABORT,
                    "request aborted",
                )
                .with_seq(seq)));
            }
            return;
        }
        tracing::trace!(seq, "abort for unknown sequence ignored");
    }

    fn handle_set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            tracing::debug!(enabled, "queue dispatch toggled");
        }
        self.enabled = enabled;
        if enabled {
            self.drain();
        }
    }

    /// Periodic pass over in-flight work: enforce timeouts and synthesize
    /// an abort for exchange tasks that died without reporting.
    async fn sweep_active(&mut self) {
        let now = Instant::now();
        let expired: Vec<u64> = self
            .active
            .iter()
            .filter(|(_, entry)| {
                entry
                    .timeout
                    .is_some_and(|limit| now.duration_since(entry.sent_at) >= limit)
            })
            .map(|(seq, _)| *seq)
            .collect();
        for seq in expired {
            tracing::debug!(seq, "request exceeded its timeout");
            self.force_terminal(
                seq,
                TransportState::Timeout,
                LifecyclePhase::Timeout,
                RpcError::local(local_code::TIMEOUT, "request timed out"),
            );
        }

        let finished: Vec<u64> = self
            .active
            .iter()
            .filter(|(_, entry)| entry.task.as_ref().is_some_and(JoinHandle::is_finished))
            .map(|(seq, _)| *seq)
            .collect();
        for seq in finished {
            let Some(entry) = self.active.get_mut(&seq) else {
                continue;
            };
            let Some(task) = entry.task.take() else {
                continue;
            };
            match task.await {
                Ok(()) => {
                    // Clean exit with the entry still registered: the
                    // terminal signal is queued behind us and resolves the
                    // request on the next loop turn.
                }
                Err(err) => {
                    tracing::warn!(seq, error = %err, "exchange task terminated abnormally");
                    self.force_terminal(
                        seq,
                        TransportState::Aborted,
                        LifecyclePhase::Aborted,
                        RpcError::local(local_code::ABORT, "exchange terminated abnormally"),
                    );
                }
            }
        }
    }

    fn force_terminal(
        &mut self,
        seq: u64,
        target: TransportState,
        phase: LifecyclePhase,
        error: RpcError,
    ) {
        let Some(entry) = self.active.remove(&seq) else {
            return;
        };
        self.resolve_active(seq, entry, target, phase, Err(error.with_seq(seq)));
    }

    fn resolve_active(
        &mut self,
        seq: u64,
        mut entry: ActiveExchange,
        target: TransportState,
        phase: LifecyclePhase,
        result: CallResult,
    ) {
        if let Some(cancel) = entry.cancel.take() {
            let _ = cancel.send(());
        }
        let reached = entry.tracker.advance_to(target);
        for state in reached {
            if let Some(reached_phase) = phase_of(state) {
                self.emit(seq, reached_phase, entry.coalesce);
            }
        }
        self.metrics.record_terminal(phase);
        if entry.reply.send(result).is_err() {
            tracing::trace!(seq, "caller dropped before resolution");
        }
    }

    fn close_all(&mut self) {
        let drained: Vec<PendingEntry> = self.pending.drain(..).collect();
        for entry in drained {
            let seq = entry.request.seq();
            self.metrics.record_pending_resolved(LifecyclePhase::Aborted);
            self.emit(seq, LifecyclePhase::Aborted, entry.request.coalesce_failures);
            let _ = entry
                .reply
                .send(Err(RpcError::from(RemoteError::QueueClosed).with_seq(seq)));
        }

        let active: Vec<(u64, ActiveExchange)> = self.active.drain().collect();
        for (seq, mut entry) in active {
            if let Some(cancel) = entry.cancel.take() {
                let _ = cancel.send(());
            }
            self.metrics.record_terminal(LifecyclePhase::Aborted);
            self.emit(seq, LifecyclePhase::Aborted, entry.coalesce);
            let _ = entry
                .reply
                .send(Err(RpcError::from(RemoteError::QueueClosed).with_seq(seq)));
        }
    }

    fn emit(&self, seq: u64, phase: LifecyclePhase, coalesce: bool) {
        let phase = if coalesce { phase.coalesced() } else { phase };
        let event = QueueEvent {
            seq,
            ts_millis: now_millis(),
            phase,
        };
        if self.events_tx.send(event).is_err() {
            // No live subscriber. Normal for callers that only await
            // resolution.
            self.metrics.record_event_dropped();
        }
    }
}

/// Observable lifecycle phase of a transport state, if any. `Created` and
/// `Configured` are internal bookkeeping and produce no event.
fn phase_of(state: TransportState) -> Option<LifecyclePhase> {
    match state {
        TransportState::Created | TransportState::Configured => None,
        TransportState::Sending => Some(LifecyclePhase::Sending),
        TransportState::Receiving => Some(LifecyclePhase::Receiving),
        TransportState::Completed => Some(LifecyclePhase::Completed),
        TransportState::Failed => Some(LifecyclePhase::Failed),
        TransportState::Aborted => Some(LifecyclePhase::Aborted),
        TransportState::Timeout => Some(LifecyclePhase::Timeout),
    }
}
