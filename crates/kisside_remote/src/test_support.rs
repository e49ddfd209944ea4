//! Shared fixtures for in-crate tests. Nothing here ships.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::errors::RemoteError;
use crate::request::{Request, ResponseKind};
use crate::transport::{
    ProgressRelay, Transport, TransportCapabilities, TransportFailure, TransportFuture,
    TransportState, WireBody, WireRequest, WireResponse,
};

const ALL_KINDS: &[ResponseKind] = &[
    ResponseKind::Text,
    ResponseKind::Json,
    ResponseKind::Xml,
    ResponseKind::Html,
    ResponseKind::Script,
];

type ReplyFn = dyn Fn(&WireRequest) -> (u16, String) + Send + Sync;

enum Behavior {
    /// Answer immediately from the closure.
    Reply(Arc<ReplyFn>),
    /// Record the start, then block until the test releases one reply.
    Gated {
        release_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<(u16, String)>>>,
        started: Arc<Mutex<Vec<u64>>>,
    },
    /// Never complete. Pairs with timeout and cancellation tests.
    Stall,
    /// Blow up inside the exchange task.
    Panic,
}

pub(crate) struct MockTransport {
    capabilities: TransportCapabilities,
    behavior: Behavior,
    seen: Arc<Mutex<Vec<WireRequest>>>,
}

impl MockTransport {
    pub(crate) fn replying(
        reply: impl Fn(&WireRequest) -> (u16, String) + Send + Sync + 'static,
    ) -> Self {
        Self::with_behavior(Behavior::Reply(Arc::new(reply)))
    }

    /// Returns a release handle alongside the transport. Each value sent on
    /// the handle unblocks exactly one in-flight perform.
    pub(crate) fn gated() -> (mpsc::Sender<(u16, String)>, Self) {
        let (release_tx, release_rx) = mpsc::channel(64);
        let transport = Self::with_behavior(Behavior::Gated {
            release_rx: Arc::new(tokio::sync::Mutex::new(release_rx)),
            started: Arc::new(Mutex::new(Vec::new())),
        });
        (release_tx, transport)
    }

    pub(crate) fn stalling() -> Self {
        Self::with_behavior(Behavior::Stall)
    }

    pub(crate) fn panicking() -> Self {
        Self::with_behavior(Behavior::Panic)
    }

    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            capabilities: TransportCapabilities {
                synchronous: true,
                asynchronous: true,
                cross_domain: true,
                file_upload: true,
                program_fields: true,
                response_kinds: ALL_KINDS,
            },
            behavior,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn with_capabilities(mut self, capabilities: TransportCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Every wire request this transport has performed, in order.
    pub(crate) fn seen(&self) -> Vec<WireRequest> {
        self.seen.lock().unwrap().clone()
    }

    /// Sequences whose perform has begun, in start order. Only meaningful
    /// for gated transports.
    pub(crate) fn started(&self) -> Vec<u64> {
        match &self.behavior {
            Behavior::Gated { started, .. } => started.lock().unwrap().clone(),
            _ => Vec::new(),
        }
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn capabilities(&self) -> TransportCapabilities {
        self.capabilities
    }

    fn prepare(&self, request: &Request) -> Result<WireRequest, RemoteError> {
        let body = match &request.data {
            Some(data) => WireBody::Raw {
                content_type: "application/json".to_owned(),
                payload: data.clone().into_bytes(),
            },
            None => WireBody::Empty,
        };
        Ok(WireRequest {
            seq: request.seq(),
            url: request.url.clone(),
            method: request.method,
            headers: request.headers.clone(),
            query: request.url_params.clone(),
            body,
        })
    }

    fn perform<'a>(
        &'a self,
        wire: &'a WireRequest,
        relay: &'a ProgressRelay,
    ) -> TransportFuture<'a> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(wire.clone());
            match &self.behavior {
                Behavior::Reply(reply) => {
                    relay.advance(TransportState::Receiving);
                    let (status, body) = reply(wire);
                    Ok(ok_response(status, body))
                }
                Behavior::Gated {
                    release_rx,
                    started,
                } => {
                    started.lock().unwrap().push(wire.seq);
                    let mut rx = release_rx.lock().await;
                    match rx.recv().await {
                        Some((status, body)) => {
                            relay.advance(TransportState::Receiving);
                            Ok(ok_response(status, body))
                        }
                        None => Err(TransportFailure::Network("release handle dropped".into())),
                    }
                }
                Behavior::Stall => {
                    std::future::pending::<()>().await;
                    unreachable!("pending future resolved")
                }
                Behavior::Panic => panic!("transport asked to panic"),
            }
        })
    }
}

fn ok_response(status: u16, body: String) -> WireResponse {
    WireResponse {
        status,
        headers: vec![("content-type".to_owned(), "application/json".to_owned())],
        body: body.into_bytes(),
    }
}

/// Polls a predicate until it holds or the deadline passes. Keeps tests free
/// of fixed sleeps where the condition is observable.
pub(crate) async fn wait_until(deadline: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}
