use thiserror::Error;

use kisside_remote::{
    ProtocolVersion, QueueConfig, RemoteError, RequestQueue, Rpc, RpcConfig, TransportRegistry,
};

use crate::auth::AuthService;
use crate::fs::FsService;

pub const DEFAULT_SERVICE: &str = "kisside";

/// Connection settings for one kisside server.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    /// Service name stamped on every call envelope.
    pub service: String,
    pub version: ProtocolVersion,
    /// Per-call timeout override. `None` defers to the queue default.
    pub timeout_ms: Option<u64>,
    pub coalesce_failures: bool,
    pub queue: QueueConfig,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            service: DEFAULT_SERVICE.to_owned(),
            version: ProtocolVersion::Qx1,
            timeout_ms: None,
            coalesce_failures: false,
            queue: QueueConfig::default(),
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_coalesced_failures(mut self, coalesce: bool) -> Self {
        self.coalesce_failures = coalesce;
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    fn validate(&self) -> Result<(), ClientError> {
        if self.base_url.trim().is_empty() {
            return Err(ClientError::EmptyBaseUrl);
        }
        Ok(())
    }
}

/// Typed client for a kisside server: one request queue, one RPC endpoint,
/// and the auth/fs surfaces on top. Clones share the queue and session.
#[derive(Clone)]
pub struct Client {
    rpc: Rpc,
    queue: RequestQueue,
}

impl Client {
    /// Build the standard transport set, start the queue driver, and bind
    /// the RPC endpoint. Touches no network until the first call.
    pub fn start(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let ClientConfig {
            base_url,
            service,
            version,
            timeout_ms,
            coalesce_failures,
            queue,
        } = config;

        let registry = TransportRegistry::standard()?;
        let queue = RequestQueue::start(queue, registry)?;

        let mut rpc_config = RpcConfig::new(base_url)
            .with_service(service)
            .with_version(version)
            .with_coalesced_failures(coalesce_failures);
        if let Some(timeout_ms) = timeout_ms {
            rpc_config = rpc_config.with_timeout_ms(timeout_ms);
        }
        let rpc = Rpc::new(rpc_config, queue.clone());
        tracing::debug!(url = %rpc.url(), "kisside client started");

        Ok(Self { rpc, queue })
    }

    pub fn rpc(&self) -> &Rpc {
        &self.rpc
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Authentication surface. Stateless; sessions live in the tokens it
    /// returns.
    pub fn auth(&self) -> AuthService {
        AuthService::new(self.rpc.clone())
    }

    /// Filesystem surface bound to one auth token.
    pub fn fs(&self, authtoken: impl Into<String>) -> FsService {
        FsService::new(self.rpc.clone(), authtoken)
    }

    /// Stop the queue driver. Outstanding calls resolve with a rejection.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.queue.shutdown().await?;
        Ok(())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("base url must not be empty")]
    EmptyBaseUrl,

    #[error("remote layer error: {0}")]
    Remote(#[from] RemoteError),
}
