use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde_json::Value;

use crate::envelope::{decode_reply, CallEnvelope, ProtocolVersion};
use crate::errors::{local_code, RpcError};
use crate::queue::{PendingCall, RequestQueue};
use crate::request::{HttpMethod, Request, ResponseKind};

/// Endpoint-level settings shared by every call issued through one [`Rpc`].
#[derive(Clone, Debug)]
pub struct RpcConfig {
    pub url: String,
    pub service: Option<String>,
    pub version: ProtocolVersion,
    /// Per-call timeout override. `None` defers to the queue default.
    pub timeout_ms: Option<u64>,
    pub cross_domain: bool,
    pub coalesce_failures: bool,
    pub server_data: Option<Value>,
    /// Initial session suffix appended to the URL, if one is already known.
    pub path_suffix: Option<String>,
}

impl RpcConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            service: None,
            version: ProtocolVersion::Qx1,
            timeout_ms: None,
            cross_domain: false,
            coalesce_failures: false,
            server_data: None,
            path_suffix: None,
        }
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
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

    pub fn with_cross_domain(mut self, cross_domain: bool) -> Self {
        self.cross_domain = cross_domain;
        self
    }

    pub fn with_coalesced_failures(mut self, coalesce: bool) -> Self {
        self.coalesce_failures = coalesce;
        self
    }

    pub fn with_server_data(mut self, server_data: Value) -> Self {
        self.server_data = Some(server_data);
        self
    }

    pub fn with_path_suffix(mut self, path_suffix: impl Into<String>) -> Self {
        self.path_suffix = Some(path_suffix.into());
        self
    }
}

struct RpcInner {
    queue: RequestQueue,
    base_url: String,
    url_suffix: ArcSwapOption<String>,
    service: Option<String>,
    version: ProtocolVersion,
    timeout_ms: Option<u64>,
    cross_domain: bool,
    coalesce_failures: bool,
    server_data: ArcSwapOption<Value>,
}

/// JSON-RPC endpoint bound to a [`RequestQueue`]. Clones share the session
/// suffix and server data, so a refresh through one clone redirects the rest.
#[derive(Clone)]
pub struct Rpc {
    inner: Arc<RpcInner>,
}

impl Rpc {
    pub fn new(config: RpcConfig, queue: RequestQueue) -> Self {
        let RpcConfig {
            url,
            service,
            version,
            timeout_ms,
            cross_domain,
            coalesce_failures,
            server_data,
            path_suffix,
        } = config;
        Self {
            inner: Arc::new(RpcInner {
                queue,
                base_url: url,
                url_suffix: ArcSwapOption::from_pointee(path_suffix),
                service,
                version,
                timeout_ms,
                cross_domain,
                coalesce_failures,
                server_data: ArcSwapOption::from_pointee(server_data),
            }),
        }
    }

    /// Endpoint URL for the next call, session suffix included.
    pub fn url(&self) -> String {
        match self.inner.url_suffix.load().as_deref() {
            Some(suffix) => format!("{}{suffix}", self.inner.base_url),
            None => self.inner.base_url.clone(),
        }
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.inner.queue
    }

    /// Replace the opaque state echoed back to the server on qx1 calls.
    pub fn set_server_data(&self, server_data: Option<Value>) {
        self.inner.server_data.store(server_data.map(Arc::new));
    }

    pub fn server_data(&self) -> Option<Value> {
        self.inner
            .server_data
            .load_full()
            .map(|value| (*value).clone())
    }

    /// Issue a call and wait for its decoded result.
    pub async fn call(
        &self,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<Value, RpcError> {
        self.begin_call(method, params, true).await?.outcome().await
    }

    /// Issue a head-of-line call that bypasses the concurrency cap, then
    /// wait for its decoded result.
    pub async fn call_sync(
        &self,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<Value, RpcError> {
        self.begin_call(method, params, false)
            .await?
            .outcome()
            .await
    }

    /// Submit a call without waiting. The returned handle exposes the
    /// sequence number for abort before resolution.
    pub async fn begin_call(
        &self,
        method: impl Into<String>,
        params: Vec<Value>,
        asynchronous: bool,
    ) -> Result<RpcCall, RpcError> {
        let mut request = Request::new(self.url(), HttpMethod::Post, ResponseKind::Json)
            .with_header("Content-Type", "application/json");
        if !asynchronous {
            request = request.synchronous();
        }
        if let Some(timeout_ms) = self.inner.timeout_ms {
            request = request.with_timeout_ms(timeout_ms);
        }
        request = request
            .with_cross_domain(self.inner.cross_domain)
            .with_coalesced_failures(self.inner.coalesce_failures);

        let envelope = CallEnvelope {
            service: self.inner.service.clone(),
            method: method.into(),
            id: request.seq(),
            params,
            version: self.inner.version,
            server_data: self
                .inner
                .server_data
                .load_full()
                .map(|value| (*value).clone()),
        };
        let request = request.with_data(envelope.to_wire().to_string());
        let seq = request.seq();
        tracing::debug!(seq, method = %envelope.method, "rpc call submitted");

        let pending = self
            .inner
            .queue
            .submit(request)
            .await
            .map_err(|err| RpcError::from(err).with_seq(seq))?;
        Ok(RpcCall {
            version: self.inner.version,
            pending,
        })
    }

    /// Abort a call by its sequence number. Resolved or unknown sequences
    /// are ignored.
    pub async fn abort(&self, seq: u64) -> Result<(), RpcError> {
        self.inner.queue.abort(seq).await.map_err(RpcError::from)
    }

    /// Ask the server for a fresh session suffix and rewrite the endpoint
    /// URL used by every subsequent call.
    pub async fn refresh_session(&self) -> Result<String, RpcError> {
        let result = self.call("refreshSession", Vec::new()).await?;
        let Some(suffix) = result.as_str() else {
            return Err(RpcError::local(
                local_code::NO_DATA,
                format!("refreshSession returned a non-string result: {result}"),
            ));
        };
        self.inner
            .url_suffix
            .store(Some(Arc::new(suffix.to_owned())));
        tracing::info!(suffix, "session suffix refreshed");
        Ok(suffix.to_owned())
    }
}

/// One in-flight call. Await [`RpcCall::outcome`] for the decoded result.
pub struct RpcCall {
    version: ProtocolVersion,
    pending: PendingCall,
}

impl RpcCall {
    pub fn sequence(&self) -> u64 {
        self.pending.sequence()
    }

    pub async fn outcome(self) -> Result<Value, RpcError> {
        let seq = self.pending.sequence();
        let response = self.pending.outcome().await?;
        let Some(payload) = response.json() else {
            return Err(
                RpcError::local(local_code::NO_DATA, "reply body is not json").with_seq(seq),
            );
        };
        decode_reply(self.version, payload, seq).map_err(|err| err.with_seq(seq))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::*;
    use crate::errors::ErrorOrigin;
    use crate::queue::QueueConfig;
    use crate::test_support::{wait_until, MockTransport};
    use crate::transport::{Transport, TransportRegistry, WireBody, WireRequest};

    fn wire_json(wire: &WireRequest) -> Value {
        match &wire.body {
            WireBody::Raw { payload, .. } => serde_json::from_slice(payload).expect("json body"),
            other => panic!("unexpected body: {other:?}"),
        }
    }

    fn echo_result(result: Value) -> impl Fn(&WireRequest) -> (u16, String) + Send + Sync {
        move |wire| {
            let id = wire_json(wire)["id"].clone();
            (200, json!({"id": id, "result": result}).to_string())
        }
    }

    async fn rpc_over(
        transport: MockTransport,
        config: RpcConfig,
    ) -> (Arc<MockTransport>, Rpc, RequestQueue) {
        let transport = Arc::new(transport);
        let object: Arc<dyn Transport> = transport.clone();
        let queue = RequestQueue::start(
            QueueConfig::default().with_poll_interval_ms(25),
            TransportRegistry::new(vec![object]),
        )
        .expect("start");
        let rpc = Rpc::new(config, queue.clone());
        (transport, rpc, queue)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn call_round_trips_result_by_id() {
        let (transport, rpc, queue) = rpc_over(
            MockTransport::replying(echo_result(json!({"ok": true}))),
            RpcConfig::new("http://host/rpc").with_service("kisside"),
        )
        .await;

        let result = rpc
            .call("listdir", vec![json!("token"), json!("/")])
            .await
            .expect("result");
        assert_eq!(result, json!({"ok": true}));

        let body = wire_json(&transport.seen()[0]);
        assert_eq!(body["service"], json!("kisside"));
        assert_eq!(body["method"], json!("listdir"));
        assert_eq!(body["params"], json!(["token", "/"]));

        queue.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn server_errors_classify_with_default_origin() {
        let (_transport, rpc, queue) = rpc_over(
            MockTransport::replying(|wire| {
                let id = wire_json(wire)["id"].clone();
                (
                    200,
                    json!({"id": id, "error": {"code": 5, "message": "bad path"}}).to_string(),
                )
            }),
            RpcConfig::new("http://host/rpc"),
        )
        .await;

        let err = rpc.call("stat", vec![json!("/nope")]).await.expect_err("error");
        assert_eq!(err.origin, ErrorOrigin::Server);
        assert_eq!(err.code, 5);
        assert_eq!(err.message, "bad path");

        queue.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn call_sync_resolves_inline() {
        let (_transport, rpc, queue) = rpc_over(
            MockTransport::replying(echo_result(json!("pong"))),
            RpcConfig::new("http://host/rpc"),
        )
        .await;

        let result = rpc.call_sync("ping", Vec::new()).await.expect("result");
        assert_eq!(result, json!("pong"));

        queue.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn refresh_session_rewrites_the_endpoint_url() {
        let (transport, rpc, queue) = rpc_over(
            MockTransport::replying(|wire| {
                let body = wire_json(wire);
                let id = body["id"].clone();
                if body["method"] == json!("refreshSession") {
                    (200, json!({"id": id, "result": ";session=afresh"}).to_string())
                } else {
                    (200, json!({"id": id, "result": true}).to_string())
                }
            }),
            RpcConfig::new("http://host/rpc"),
        )
        .await;

        let suffix = rpc.refresh_session().await.expect("suffix");
        assert_eq!(suffix, ";session=afresh");
        rpc.call("ping", Vec::new()).await.expect("result");

        let seen = transport.seen();
        assert_eq!(seen[0].url, "http://host/rpc");
        assert_eq!(seen[1].url, "http://host/rpc;session=afresh");

        queue.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn server_data_rides_along_on_qx1_calls() {
        let (transport, rpc, queue) = rpc_over(
            MockTransport::replying(echo_result(json!(1))),
            RpcConfig::new("http://host/rpc"),
        )
        .await;

        rpc.set_server_data(Some(json!({"hint": "h1"})));
        rpc.call("ping", Vec::new()).await.expect("result");

        let body = wire_json(&transport.seen()[0]);
        assert_eq!(body["server_data"], json!({"hint": "h1"}));

        queue.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn abort_resolves_an_in_flight_call() {
        let (release_tx, gated) = MockTransport::gated();
        let (transport, rpc, queue) = rpc_over(gated, RpcConfig::new("http://host/rpc")).await;

        let call = rpc.begin_call("slow", Vec::new(), true).await.expect("begin");
        let seq = call.sequence();
        assert!(wait_until(Duration::from_secs(1), || transport.started().len() == 1).await);

        rpc.abort(seq).await.expect("abort");
        let err = call.outcome().await.expect_err("aborted");
        assert_eq!(err.origin, ErrorOrigin::Local);
        assert_eq!(err.code, local_code::ABORT);

        drop(release_tx);
        queue.shutdown().await.expect("shutdown");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn v2_wire_joins_service_and_method_names() {
        let (transport, rpc, queue) = rpc_over(
            MockTransport::replying(echo_result(json!(null))),
            RpcConfig::new("http://host/rpc")
                .with_service("kisside")
                .with_version(ProtocolVersion::V2),
        )
        .await;

        rpc.call("ping", Vec::new()).await.expect("result");

        let body = wire_json(&transport.seen()[0]);
        assert_eq!(body["jsonrpc"], json!("2.0"));
        assert_eq!(body["method"], json!("kisside.ping"));
        assert!(body.get("service").is_none());

        queue.shutdown().await.expect("shutdown");
    }
}
