use crate::errors::RemoteError;
use crate::request::{HttpMethod, Request, ResponseKind};
use crate::transport::{
    ProgressRelay, Transport, TransportCapabilities, TransportFailure, TransportFuture,
    TransportState, WireBody, WireRequest, WireResponse,
};

const RESPONSE_KINDS: &[ResponseKind] = &[
    ResponseKind::Text,
    ResponseKind::Json,
    ResponseKind::Xml,
    ResponseKind::Html,
    ResponseKind::Script,
];

const DEFAULT_BODY_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Body-carrying transport over the native HTTP client. First in the
/// selection order; covers every response kind but stays same-origin and
/// cannot upload files.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities {
            synchronous: true,
            asynchronous: true,
            cross_domain: false,
            file_upload: false,
            program_fields: false,
            response_kinds: RESPONSE_KINDS,
        }
    }

    fn prepare(&self, request: &Request) -> Result<WireRequest, RemoteError> {
        let (mut headers, content_type) = split_content_type(request.headers.clone());
        if !headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("accept"))
        {
            headers.push(("Accept".to_owned(), request.response_kind.mime().to_owned()));
        }

        let mut query = request.url_params.clone();
        let body = if let Some(data) = &request.data {
            if !request.method.carries_body() {
                return Err(RemoteError::Unsupported(format!(
                    "{} request cannot carry a raw body",
                    request.method.as_str()
                )));
            }
            WireBody::Raw {
                content_type: content_type
                    .unwrap_or_else(|| DEFAULT_BODY_CONTENT_TYPE.to_owned()),
                payload: data.clone().into_bytes(),
            }
        } else if request.method.carries_body() && !request.body_params.is_empty() {
            WireBody::Form(request.body_params.clone())
        } else {
            query.extend(request.body_params.iter().cloned());
            WireBody::Empty
        };

        Ok(WireRequest {
            seq: request.seq(),
            url: request.url.clone(),
            method: request.method,
            headers,
            query,
            body,
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

/// Drive one fully-encoded request over the shared HTTP client. `Receiving`
/// is relayed once response headers arrive, before the body is drained.
pub(crate) async fn send_wire(
    client: &reqwest::Client,
    wire: &WireRequest,
    relay: &ProgressRelay,
) -> Result<WireResponse, TransportFailure> {
    let mut builder = client.request(to_reqwest_method(wire.method), &wire.url);
    if !wire.query.is_empty() {
        builder = builder.query(&wire.query);
    }
    for (name, value) in &wire.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder = match &wire.body {
        WireBody::Empty => builder,
        WireBody::Raw {
            content_type,
            payload,
        } => builder
            .header(reqwest::header::CONTENT_TYPE, content_type.as_str())
            .body(payload.clone()),
        WireBody::Form(pairs) => builder.form(pairs),
        WireBody::Multipart { fields, uploads } => {
            let mut form = reqwest::multipart::Form::new();
            for (name, value) in fields {
                form = form.text(name.clone(), value.clone());
            }
            for upload in uploads {
                let part = reqwest::multipart::Part::bytes(upload.bytes.clone())
                    .file_name(upload.file_name.clone())
                    .mime_str(&upload.mime)
                    .map_err(|err| {
                        TransportFailure::Network(format!(
                            "invalid upload mime {}: {err}",
                            upload.mime
                        ))
                    })?;
                form = form.part(upload.field.clone(), part);
            }
            builder.multipart(form)
        }
    };

    let response = builder
        .send()
        .await
        .map_err(|err| TransportFailure::Network(err.to_string()))?;
    relay.advance(TransportState::Receiving);

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                value.to_str().unwrap_or("").to_owned(),
            )
        })
        .collect();
    let body = response
        .bytes()
        .await
        .map_err(|err| TransportFailure::Read(err.to_string()))?;

    Ok(WireResponse {
        status,
        headers,
        body: body.to_vec(),
    })
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

/// Pull the first Content-Type pair out of a header list so the body
/// encoding stays the single source of that header.
pub(crate) fn split_content_type(
    headers: Vec<(String, String)>,
) -> (Vec<(String, String)>, Option<String>) {
    let mut content_type = None;
    let mut kept = Vec::with_capacity(headers.len());
    for (name, value) in headers {
        if content_type.is_none() && name.eq_ignore_ascii_case("content-type") {
            content_type = Some(value);
        } else {
            kept.push((name, value));
        }
    }
    (kept, content_type)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::request::{HttpMethod, Request, ResponseKind};

    fn transport() -> HttpTransport {
        HttpTransport::new(reqwest::Client::new())
    }

    #[tokio::test(flavor = "current_thread")]
    async fn raw_body_takes_content_type_out_of_headers() {
        let request = Request::new("http://host/rpc", HttpMethod::Post, ResponseKind::Json)
            .with_header("Content-Type", "application/json")
            .with_data(r#"{"method":"ping"}"#);
        let wire = transport().prepare(&request).expect("prepare");

        assert!(wire
            .headers
            .iter()
            .all(|(name, _)| !name.eq_ignore_ascii_case("content-type")));
        assert_eq!(
            wire.body,
            WireBody::Raw {
                content_type: "application/json".to_owned(),
                payload: br#"{"method":"ping"}"#.to_vec(),
            }
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn get_requests_fold_body_params_into_query() {
        let request = Request::new("http://host/rpc", HttpMethod::Get, ResponseKind::Text)
            .with_url_param("a", "1")
            .with_body_param("b", "2");
        let wire = transport().prepare(&request).expect("prepare");

        assert_eq!(wire.method, HttpMethod::Get);
        assert_eq!(
            wire.query,
            vec![("a".to_owned(), "1".to_owned()), ("b".to_owned(), "2".to_owned())]
        );
        assert_eq!(wire.body, WireBody::Empty);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn post_body_params_become_a_form_body() {
        let request = Request::new("http://host/rpc", HttpMethod::Post, ResponseKind::Text)
            .with_body_param("b", "2");
        let wire = transport().prepare(&request).expect("prepare");
        assert_eq!(wire.body, WireBody::Form(vec![("b".to_owned(), "2".to_owned())]));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn raw_body_on_get_is_rejected() {
        let request = Request::new("http://host/rpc", HttpMethod::Get, ResponseKind::Json)
            .with_data("payload");
        let err = transport().prepare(&request).expect_err("must reject");
        assert!(matches!(err, RemoteError::Unsupported(_)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn accept_header_follows_response_kind() {
        let request = Request::new("http://host/rpc", HttpMethod::Get, ResponseKind::Json);
        let wire = transport().prepare(&request).expect("prepare");
        assert!(wire
            .headers
            .iter()
            .any(|(name, value)| name == "Accept" && value == "application/json"));
    }
}
