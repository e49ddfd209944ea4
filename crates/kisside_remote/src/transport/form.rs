use crate::errors::RemoteError;
use crate::request::{HttpMethod, Request, ResponseKind};
use crate::transport::http::{send_wire, split_content_type};
use crate::transport::{
    ProgressRelay, Transport, TransportCapabilities, TransportFuture, WireBody, WireRequest,
};

const RESPONSE_KINDS: &[ResponseKind] = &[
    ResponseKind::Text,
    ResponseKind::Json,
    ResponseKind::Xml,
    ResponseKind::Html,
    ResponseKind::Script,
];

/// Multipart form transport: the only variant that can upload files or
/// send programmatic form fields. Always posts; asynchronous only.
pub struct FormTransport {
    client: reqwest::Client,
}

impl FormTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for FormTransport {
    fn name(&self) -> &'static str {
        "form"
    }

    fn capabilities(&self) -> TransportCapabilities {
        TransportCapabilities {
            synchronous: false,
            asynchronous: true,
            cross_domain: false,
            file_upload: true,
            program_fields: true,
            response_kinds: RESPONSE_KINDS,
        }
    }

    fn prepare(&self, request: &Request) -> Result<WireRequest, RemoteError> {
        if request.data.is_some() {
            return Err(RemoteError::Unsupported(
                "form transport cannot carry a raw body".to_owned(),
            ));
        }

        // The multipart encoder owns the Content-Type (it carries the
        // boundary), so any caller-provided value is dropped.
        let (headers, _) = split_content_type(request.headers.clone());

        let mut fields = request.body_params.clone();
        fields.extend(request.form_fields.iter().cloned());

        Ok(WireRequest {
            seq: request.seq(),
            url: request.url.clone(),
            method: HttpMethod::Post,
            headers,
            query: request.url_params.clone(),
            body: WireBody::Multipart {
                fields,
                uploads: request.uploads.clone(),
            },
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

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::request::{HttpMethod, Request, ResponseKind, UploadPart};

    fn upload_request() -> Request {
        Request::new("http://host/upload", HttpMethod::Post, ResponseKind::Json)
            .with_body_param("authtoken", "token")
            .with_form_field("overwrite", "true")
            .with_upload(UploadPart {
                field: "file".to_owned(),
                file_name: "notes.txt".to_owned(),
                mime: "text/plain".to_owned(),
                bytes: b"hello".to_vec(),
            })
    }

    #[tokio::test(flavor = "current_thread")]
    async fn prepare_merges_params_and_fields_into_multipart() {
        let transport = FormTransport::new(reqwest::Client::new());
        let wire = transport.prepare(&upload_request()).expect("prepare");

        assert_eq!(wire.method, HttpMethod::Post);
        match wire.body {
            WireBody::Multipart { fields, uploads } => {
                assert_eq!(
                    fields,
                    vec![
                        ("authtoken".to_owned(), "token".to_owned()),
                        ("overwrite".to_owned(), "true".to_owned()),
                    ]
                );
                assert_eq!(uploads.len(), 1);
                assert_eq!(uploads[0].file_name, "notes.txt");
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn prepare_drops_caller_content_type() {
        let transport = FormTransport::new(reqwest::Client::new());
        let request = upload_request().with_header("Content-Type", "application/json");
        let wire = transport.prepare(&request).expect("prepare");
        assert!(wire
            .headers
            .iter()
            .all(|(name, _)| !name.eq_ignore_ascii_case("content-type")));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn prepare_rejects_raw_data() {
        let transport = FormTransport::new(reqwest::Client::new());
        let request = upload_request().with_data("raw");
        let err = transport.prepare(&request).expect_err("must reject");
        assert!(matches!(err, RemoteError::Unsupported(_)));
    }
}
