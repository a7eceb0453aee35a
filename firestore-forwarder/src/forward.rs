//! Replays a stored request against the configured target.

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Url};
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::error::ForwardError;
use crate::model::ForwardableRequest;

/// Response of a successful forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardOutcome {
    pub status: u16,
    pub body: String
}

/// Sends stored requests to a single fixed URL.
///
/// No timeout and no retry: a request is attempted once.
pub struct Forwarder {
    client: Client,
    target: String
}

impl Forwarder {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            target: target.into()
        }
    }

    /// Builds the outbound request without sending it.
    pub fn build_request(&self, request: &ForwardableRequest) -> Result<reqwest::Request, ForwardError> {
        let method_name = method_of(request).to_uppercase();
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| ForwardError::InvalidMethod(method_name.clone()))?;

        let mut url = Url::parse(&self.target).map_err(|e| ForwardError::InvalidUrl {
            url: self.target.clone(),
            reason: e.to_string()
        })?;
        if let Some(query) = &request.query {
            let pairs = query_pairs(query);
            if !pairs.is_empty() {
                url.query_pairs_mut().extend_pairs(pairs);
            }
        }

        let mut headers = HeaderMap::new();
        if let Some(stored) = &request.headers {
            for (name, value) in stored {
                let Some(value) = header_text(value) else {
                    continue;
                };
                let header_name =
                    HeaderName::from_bytes(name.as_bytes()).map_err(|e| ForwardError::InvalidHeader {
                        name: name.clone(),
                        reason: e.to_string()
                    })?;
                let header_value = HeaderValue::from_str(&value).map_err(|e| ForwardError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string()
                })?;
                headers.insert(header_name, header_value);
            }
        }

        let body = match &request.body {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text.clone().into_bytes()),
            Some(json) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                Some(json.to_string().into_bytes())
            }
        };

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        builder.build().map_err(ForwardError::Transport)
    }

    /// Sends one stored request and logs the result.
    ///
    /// A non-success response is returned as [`ForwardError::Status`]; every
    /// other error means no response was received.
    pub async fn forward(&self, doc_id: &str, request: &ForwardableRequest) -> Result<ForwardOutcome, ForwardError> {
        info!(
            doc_id = %doc_id,
            method = method_of(request),
            webhook_name = request.webhook_name.as_deref().unwrap_or_default(),
            "Sending request"
        );

        let outbound = match self.build_request(request) {
            Ok(outbound) => outbound,
            Err(e) => {
                error!(doc_id = %doc_id, error = %e, "Failed to build request");
                return Err(e);
            }
        };

        let response = match self.client.execute(outbound).await {
            Ok(response) => response,
            Err(e) => {
                error!(doc_id = %doc_id, error = %e, "No response from forward target");
                return Err(ForwardError::Transport(e));
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() {
            info!(doc_id = %doc_id, status = status.as_u16(), body = %body, "Forward response");
            Ok(ForwardOutcome {
                status: status.as_u16(),
                body
            })
        } else {
            let failure = ForwardError::Status {
                status: status.as_u16(),
                body
            };
            error!(
                doc_id = %doc_id,
                error = %failure,
                body = failure.response_body().unwrap_or_default(),
                "Forward error"
            );
            Err(failure)
        }
    }
}

fn method_of(request: &ForwardableRequest) -> &str {
    request
        .method
        .as_deref()
        .filter(|m| !m.is_empty())
        .unwrap_or("GET")
}

/// Flattens stored query parameters the way browsers' form encoders do:
/// arrays become `key[]` and nested maps `key[sub]`. Nulls are dropped.
fn query_pairs(query: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in query {
        push_pairs(&mut pairs, key.clone(), value);
    }
    pairs
}

fn push_pairs(pairs: &mut Vec<(String, String)>, key: String, value: &Value) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                push_pairs(pairs, format!("{key}[]"), item);
            }
        }
        Value::Object(fields) => {
            for (sub, item) in fields {
                push_pairs(pairs, format!("{key}[{sub}]"), item);
            }
        }
        scalar => {
            if let Some(text) = header_text(scalar) {
                pairs.push((key, text));
            }
        }
    }
}

// Strings verbatim, nulls dropped, everything else as its JSON text.
fn header_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: Value) -> ForwardableRequest {
        ForwardableRequest::from_fields(value.as_object().unwrap())
    }

    #[test]
    fn test_build_post_with_json_body() {
        let forwarder = Forwarder::new("http://localhost:3000/hook");
        let built = forwarder
            .build_request(&request(json!({
                "method": "post",
                "headers": {"x-request-id": "r1", "x-attempt": 2, "x-empty": null},
                "body": {"a": 1}
            })))
            .unwrap();

        assert_eq!(built.method(), Method::POST);
        assert_eq!(built.url().as_str(), "http://localhost:3000/hook");
        assert_eq!(built.headers()["x-request-id"], "r1");
        assert_eq!(built.headers()["x-attempt"], "2");
        assert!(!built.headers().contains_key("x-empty"));
        assert_eq!(built.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(built.body().and_then(|b| b.as_bytes()), Some(&b"{\"a\":1}"[..]));
    }

    #[test]
    fn test_build_keeps_stored_content_type() {
        let forwarder = Forwarder::new("http://localhost/hook");
        let built = forwarder
            .build_request(&request(json!({
                "method": "PUT",
                "headers": {"Content-Type": "application/vnd.api+json"},
                "body": [1, 2]
            })))
            .unwrap();
        assert_eq!(built.headers()[CONTENT_TYPE], "application/vnd.api+json");
    }

    #[test]
    fn test_build_string_body_verbatim() {
        let forwarder = Forwarder::new("http://localhost/hook");
        let built = forwarder
            .build_request(&request(json!({"method": "POST", "body": "a=1&b=2"})))
            .unwrap();
        assert_eq!(built.body().and_then(|b| b.as_bytes()), Some(&b"a=1&b=2"[..]));
        assert!(!built.headers().contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_build_missing_method_defaults_to_get() {
        let forwarder = Forwarder::new("http://localhost/hook");
        let built = forwarder.build_request(&request(json!({}))).unwrap();
        assert_eq!(built.method(), Method::GET);
        assert!(built.body().is_none());

        let built = forwarder
            .build_request(&request(json!({"method": ""})))
            .unwrap();
        assert_eq!(built.method(), Method::GET);
    }

    #[test]
    fn test_build_query_parameters() {
        let forwarder = Forwarder::new("http://localhost/hook?fixed=1");
        let built = forwarder
            .build_request(&request(json!({
                "query": {"page": 2, "tag": ["a", "b"], "filter": {"state": "open"}, "skip": null}
            })))
            .unwrap();

        let pairs: Vec<(String, String)> = built
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("fixed".to_string(), "1".to_string())));
        assert!(pairs.contains(&("page".to_string(), "2".to_string())));
        assert!(pairs.contains(&("tag[]".to_string(), "a".to_string())));
        assert!(pairs.contains(&("tag[]".to_string(), "b".to_string())));
        assert!(pairs.contains(&("filter[state]".to_string(), "open".to_string())));
        assert!(!pairs.iter().any(|(k, _)| k == "skip"));
    }

    #[test]
    fn test_build_invalid_method() {
        let forwarder = Forwarder::new("http://localhost/hook");
        let err = forwarder
            .build_request(&request(json!({"method": "GE T"})))
            .unwrap_err();
        assert!(matches!(err, ForwardError::InvalidMethod(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_build_invalid_header_name() {
        let forwarder = Forwarder::new("http://localhost/hook");
        let err = forwarder
            .build_request(&request(json!({"headers": {"bad header": "x"}})))
            .unwrap_err();
        assert!(matches!(err, ForwardError::InvalidHeader { .. }));
    }

    #[test]
    fn test_build_invalid_target() {
        let forwarder = Forwarder::new("localhost-without-scheme");
        let err = forwarder.build_request(&request(json!({}))).unwrap_err();
        assert!(matches!(err, ForwardError::InvalidUrl { .. }));
    }
}
