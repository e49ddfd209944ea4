use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::RemoteError;
use crate::request::{HttpMethod, Request, ResponseKind, UploadPart};

pub mod form;
pub mod http;
pub mod query;
pub mod status;

pub use form::FormTransport;
pub use http::HttpTransport;
pub use query::QueryTransport;

/// Shared ready-state machine: strictly forward-only, one level at a time
/// as observed, terminal exactly once.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransportState {
    Created,
    Configured,
    Sending,
    Receiving,
    Completed,
    Aborted,
    Timeout,
    Failed,
}

impl TransportState {
    pub fn level(self) -> u8 {
        match self {
            TransportState::Created => 1,
            TransportState::Configured => 2,
            TransportState::Sending => 3,
            TransportState::Receiving => 4,
            TransportState::Completed
            | TransportState::Aborted
            | TransportState::Timeout
            | TransportState::Failed => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.level() == 5
    }
}

const INTERMEDIATE_CHAIN: [TransportState; 3] = [
    TransportState::Configured,
    TransportState::Sending,
    TransportState::Receiving,
];

/// Tracks one exchange's observed state. Backward signals and anything after
/// a terminal state are ignored; skipped intermediate levels are replayed so
/// observers never see a jump of more than one level.
#[derive(Debug)]
pub struct StateTracker {
    current: TransportState,
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            current: TransportState::Created,
        }
    }

    pub fn current(&self) -> TransportState {
        self.current
    }

    /// Advance toward `target`, returning every state to emit in order.
    /// Allocation: one Vec of at most 4 states. Complexity: O(1).
    pub fn advance_to(&mut self, target: TransportState) -> Vec<TransportState> {
        if self.current.is_terminal() || target.level() <= self.current.level() {
            return Vec::new();
        }

        let mut emitted = Vec::new();
        for state in INTERMEDIATE_CHAIN {
            if state.level() > self.current.level() && state.level() < target.level() {
                emitted.push(state);
            }
        }
        emitted.push(target);
        self.current = target;
        emitted
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Static capability descriptor declared by each transport variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportCapabilities {
    pub synchronous: bool,
    pub asynchronous: bool,
    pub cross_domain: bool,
    pub file_upload: bool,
    pub program_fields: bool,
    pub response_kinds: &'static [ResponseKind],
}

impl TransportCapabilities {
    pub fn supports(&self, needs: &TransportRequirements) -> bool {
        (!needs.synchronous || self.synchronous)
            && (!needs.asynchronous || self.asynchronous)
            && (!needs.cross_domain || self.cross_domain)
            && (!needs.file_upload || self.file_upload)
            && (!needs.program_fields || self.program_fields)
            && self.response_kinds.contains(&needs.response_kind)
    }
}

/// What one request demands of a transport, derived from the request alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportRequirements {
    pub synchronous: bool,
    pub asynchronous: bool,
    pub cross_domain: bool,
    pub file_upload: bool,
    pub program_fields: bool,
    pub response_kind: ResponseKind,
}

impl TransportRequirements {
    pub fn of(request: &Request) -> Self {
        Self {
            synchronous: !request.asynchronous,
            asynchronous: request.asynchronous,
            cross_domain: request.cross_domain,
            file_upload: !request.uploads.is_empty(),
            program_fields: !request.form_fields.is_empty(),
            response_kind: request.response_kind,
        }
    }
}

/// Fully-encoded outbound call, ready for the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct WireRequest {
    pub seq: u64,
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: WireBody,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WireBody {
    Empty,
    Raw {
        content_type: String,
        payload: Vec<u8>,
    },
    Form(Vec<(String, String)>),
    Multipart {
        fields: Vec<(String, String)>,
        uploads: Vec<UploadPart>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportFailure {
    #[error("network error: {0}")]
    Network(String),
    #[error("read error: {0}")]
    Read(String),
}

/// Forwards mid-flight state changes out of a running `perform` call.
pub struct ProgressRelay {
    notify: Box<dyn Fn(TransportState) + Send + Sync>,
}

impl ProgressRelay {
    pub fn new(notify: impl Fn(TransportState) + Send + Sync + 'static) -> Self {
        Self {
            notify: Box::new(notify),
        }
    }

    pub fn advance(&self, state: TransportState) {
        (self.notify)(state);
    }
}

pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<WireResponse, TransportFailure>> + Send + 'a>>;

/// Wire-level adapter. `prepare` is pure per-variant encoding; `perform`
/// drives the native call and reports `Receiving` through the relay once
/// response headers arrive.
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> TransportCapabilities;

    fn prepare(&self, request: &Request) -> Result<WireRequest, RemoteError>;

    fn perform<'a>(&'a self, wire: &'a WireRequest, relay: &'a ProgressRelay)
        -> TransportFuture<'a>;
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("name", &self.name())
            .finish()
    }
}

/// Fixed-priority transport list; selection picks the first variant whose
/// capability set covers the request.
#[derive(Clone)]
pub struct TransportRegistry {
    transports: Vec<Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new(transports: Vec<Arc<dyn Transport>>) -> Self {
        Self { transports }
    }

    /// Built-in priority order: body transport, form transport, query
    /// transport.
    pub fn standard() -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| RemoteError::Internal(format!("http client: {err}")))?;
        Ok(Self::new(vec![
            Arc::new(HttpTransport::new(client.clone())),
            Arc::new(FormTransport::new(client.clone())),
            Arc::new(QueryTransport::new(client)),
        ]))
    }

    pub fn select(&self, request: &Request) -> Result<Arc<dyn Transport>, RemoteError> {
        let needs = TransportRequirements::of(request);
        self.transports
            .iter()
            .find(|transport| transport.capabilities().supports(&needs))
            .cloned()
            .ok_or_else(|| RemoteError::NoTransport(describe_requirements(&needs)))
    }
}

fn describe_requirements(needs: &TransportRequirements) -> String {
    let mut demands = Vec::new();
    if needs.synchronous {
        demands.push("synchronous");
    }
    if needs.cross_domain {
        demands.push("crossDomain");
    }
    if needs.file_upload {
        demands.push("fileUpload");
    }
    if needs.program_fields {
        demands.push("programFields");
    }
    format!(
        "responseKind={:?} demands=[{}]",
        needs.response_kind,
        demands.join(",")
    )
}
