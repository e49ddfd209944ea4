use crate::errors::RemoteError;
use crate::request::{HttpMethod, Request, ResponseKind};
use crate::transport::http::{send_wire, split_content_type};
use crate::transport::{
    ProgressRelay, Transport, TransportCapabilities, TransportFuture, WireBody, WireRequest,
};

/// Reserved query parameter names; the wire on this transport cannot carry
/// a body, so the call id and payload ride in the URL.
pub const SCRIPT_TRANSPORT_ID: &str = "_ScriptTransport_id";
pub const SCRIPT_TRANSPORT_DATA: &str = "_ScriptTransport_data";

const RESPONSE_KINDS: &[ResponseKind] = &[ResponseKind::Text, ResponseKind::Json];

/// Query-encoded GET transport: the only cross-domain variant. Last in the
/// selection order; limited to text and json replies.
pub struct QueryTransport {
    client: reqwest::Client,
}

impl QueryTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for QueryTransport {
    fn name(&self) -> &'static str {
        "query"
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities {
            synchronous: false,
            asynchronous: true,
            cross_domain: true,
            file_upload: false,
            program_fields: false,
            response_kinds: RESPONSE_KINDS,
        }
    }

    fn prepare(&self, request: &Request) -> Result<WireRequest, RemoteError> {
        if !request.uploads.is_empty() {
            return Err(RemoteError::Unsupported(
                "query transport cannot upload files".to_owned(),
            ));
        }

        // No body rides on this wire, so any caller-set Content-Type is
        // dropped.
        let (headers, _) = split_content_type(request.headers.clone());

        let mut query = request.url_params.clone();
        query.extend(request.body_params.iter().cloned());
        query.push((SCRIPT_TRANSPORT_ID.to_owned(), request.seq().to_string()));
        if let Some(data) = &request.data {
            query.push((SCRIPT_TRANSPORT_DATA.to_owned(), data.clone()));
        }

        Ok(WireRequest {
            seq: request.seq(),
            url: request.url.clone(),
            method: HttpMethod::Get,
            headers,
            query,
            body: WireBody::Empty,
        })
    }

    fn perform<'a>(
        &'a self,
        wire: &'a WireRequest,
        relay: &'a ProgressRelay,
    ) -> TransportFuture<'a> {
        Box::pin(send_wire(&self.client, wire, relay))
    }
}
