pub mod envelope;
pub mod errors;
pub mod events;
pub(crate) mod exchange;
pub mod metrics;
pub mod queue;
pub mod request;
pub mod response;
pub mod rpc;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use envelope::{decode_reply, CallEnvelope, ProtocolVersion};
pub use errors::{local_code, ErrorOrigin, RemoteError, RpcError};
pub use events::{LifecyclePhase, QueueEvent};
pub use metrics::QueueMetricsSnapshot;
pub use queue::{CallResult, PendingCall, QueueConfig, RequestQueue};
pub use request::{HttpMethod, Request, ResponseKind, UploadPart};
pub use response::{Response, ResponseContent};
pub use rpc::{Rpc, RpcCall, RpcConfig};
pub use transport::{
    FormTransport, HttpTransport, QueryTransport, StateTracker, Transport, TransportCapabilities,
    TransportRegistry, TransportRequirements, TransportState,
};

pub type QueueEventRx = tokio::sync::broadcast::Receiver<QueueEvent>;
