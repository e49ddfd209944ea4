use serde_json::Value;

use crate::errors::{local_code, RpcError};
use crate::request::ResponseKind;

#[derive(Clone, Debug, PartialEq)]
pub enum ResponseContent {
    Text(String),
    Json(Value),
    Xml(String),
    Html(String),
    Script(String),
}

/// Terminal payload of one request. Produced at most once, immutable.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content: Option<ResponseContent>,
}

impl Response {
    /// Decode a raw body into typed content. An empty body yields `None`
    /// content; an undecodable body for a structured kind is a local
    /// no-data failure.
    pub fn decode(
        kind: ResponseKind,
        status: u16,
        headers: Vec<(String, String)>,
        body: &[u8],
    ) -> Result<Self, RpcError> {
        let text = String::from_utf8_lossy(body);
        if text.trim().is_empty() {
            return Ok(Self {
                status,
                headers,
                content: None,
            });
        }

        let content = match kind {
            ResponseKind::Text => ResponseContent::Text(text.into_owned()),
            ResponseKind::Json => {
                let value: Value = serde_json::from_str(&text).map_err(|err| {
                    RpcError::local(local_code::NO_DATA, format!("undecodable json body: {err}"))
                })?;
                ResponseContent::Json(value)
            }
            ResponseKind::Xml => ResponseContent::Xml(text.into_owned()),
            ResponseKind::Html => ResponseContent::Html(text.into_owned()),
            ResponseKind::Script => ResponseContent::Script(text.into_owned()),
        };

        Ok(Self {
            status,
            headers,
            content: Some(content),
        })
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.content {
            Some(ResponseContent::Json(value)) => Some(value),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Some(ResponseContent::Text(text))
            | Some(ResponseContent::Xml(text))
            | Some(ResponseContent::Html(text))
            | Some(ResponseContent::Script(text)) => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::errors::ErrorOrigin;

    #[test]
    fn decodes_json_body() {
        let response =
            Response::decode(ResponseKind::Json, 200, Vec::new(), br#"{"id":1,"result":true}"#)
                .expect("decode");
        assert_eq!(response.json(), Some(&json!({"id": 1, "result": true})));
    }

    #[test]
    fn empty_body_yields_no_content() {
        let response =
            Response::decode(ResponseKind::Json, 200, Vec::new(), b"  \n").expect("decode");
        assert_eq!(response.content, None);
    }

    #[test]
    fn broken_json_is_a_local_no_data_error() {
        let err = Response::decode(ResponseKind::Json, 200, Vec::new(), b"{nope")
            .expect_err("must fail");
        assert_eq!(err.origin, ErrorOrigin::Local);
        assert_eq!(err.code, local_code::NO_DATA);
    }

    #[test]
    fn text_kind_keeps_raw_body() {
        let response =
            Response::decode(ResponseKind::Text, 200, Vec::new(), b"plain payload").expect("decode");
        assert_eq!(response.text(), Some("plain payload"));
        assert_eq!(response.json(), None);
    }
}
