use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-wide sequence source. Sequence numbers are assigned once at
/// construction, strictly increasing, never reused.
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_sequence() -> u64 {
    NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Head,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Head => "HEAD",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn carries_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ResponseKind {
    Text,
    Json,
    Xml,
    Html,
    Script,
}

impl ResponseKind {
    pub fn mime(self) -> &'static str {
        match self {
            ResponseKind::Text => "text/plain",
            ResponseKind::Json => "application/json",
            ResponseKind::Xml => "application/xml",
            ResponseKind::Html => "text/html",
            ResponseKind::Script => "text/javascript",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Value object describing one outbound call. Owns no network state; the
/// queue takes ownership at submission and resolves the caller exactly once.
#[derive(Clone, Debug)]
pub struct Request {
    seq: u64,
    pub url: String,
    pub method: HttpMethod,
    pub asynchronous: bool,
    /// `None` falls back to the queue default; `Some(0)` disables the check.
    pub timeout_ms: Option<u64>,
    pub response_kind: ResponseKind,
    pub headers: Vec<(String, String)>,
    pub url_params: Vec<(String, String)>,
    pub body_params: Vec<(String, String)>,
    pub form_fields: Vec<(String, String)>,
    pub uploads: Vec<UploadPart>,
    pub data: Option<String>,
    pub cross_domain: bool,
    pub coalesce_failures: bool,
}

impl Request {
    pub fn new(url: impl Into<String>, method: HttpMethod, response_kind: ResponseKind) -> Self {
        Self {
            seq: next_sequence(),
            url: url.into(),
            method,
            asynchronous: true,
            timeout_ms: None,
            response_kind,
            headers: Vec::new(),
            url_params: Vec::new(),
            body_params: Vec::new(),
            form_fields: Vec::new(),
            uploads: Vec::new(),
            data: None,
            cross_domain: false,
            coalesce_failures: false,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Mark the request synchronous: admitted head-of-line and exempt from
    /// the concurrency cap.
    pub fn synchronous(mut self) -> Self {
        self.asynchronous = false;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_url_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.url_params.push((name.into(), value.into()));
        self
    }

    pub fn with_body_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.body_params.push((name.into(), value.into()));
        self
    }

    pub fn with_form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_fields.push((name.into(), value.into()));
        self
    }

    pub fn with_upload(mut self, part: UploadPart) -> Self {
        self.uploads.push(part);
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
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
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn sequence_numbers_are_strictly_increasing() {
        let requests: Vec<Request> = (0..6)
            .map(|_| Request::new("http://host/rpc", HttpMethod::Post, ResponseKind::Json))
            .collect();
        for pair in requests.windows(2) {
            assert!(pair[0].seq() < pair[1].seq());
        }
    }

    #[test]
    fn sequence_numbers_never_repeat_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..50)
                        .map(|_| {
                            Request::new("http://host/rpc", HttpMethod::Get, ResponseKind::Text)
                                .seq()
                        })
                        .collect::<Vec<u64>>()
                })
            })
            .collect();

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().expect("thread"));
        }
        let count = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), count);
    }

    #[test]
    fn defaults_are_async_without_timeout_override() {
        let request = Request::new("http://host/rpc", HttpMethod::Post, ResponseKind::Json);
        assert!(request.asynchronous);
        assert_eq!(request.timeout_ms, None);
        assert!(!request.cross_domain);
        assert!(!request.coalesce_failures);
    }

    #[test]
    fn builders_accumulate_ordered_pairs() {
        let request = Request::new("http://host/rpc", HttpMethod::Post, ResponseKind::Json)
            .with_header("Content-Type", "application/json")
            .with_url_param("a", "1")
            .with_url_param("b", "2")
            .synchronous();
        assert!(!request.asynchronous);
        assert_eq!(request.url_params, vec![
            ("a".to_owned(), "1".to_owned()),
            ("b".to_owned(), "2".to_owned()),
        ]);
    }
}
