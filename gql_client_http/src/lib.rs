#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

use std::time::Duration;

use async_trait::async_trait;
use gql_client::{ExecutionResult, Request, Transport, TransportError, Variables};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Serialize;
use url::Url;

/// HTTP statuses retried inside the transport.
const RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];

const BACKOFF_FACTOR: Duration = Duration::from_millis(100);

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    variables: &'a Variables,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    operation_name: Option<&'a str>,
}

/// Builds an [`HttpTransport`] with non-default settings.
pub struct HttpTransportBuilder {
    url: Url,
    headers: HeaderMap,
    timeout: Option<Duration>,
    retries: u32,
    use_json: bool,
}

impl HttpTransportBuilder {
    /// Headers sent with every request (authentication, cookies, …).
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Default timeout applied when a request carries none.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// How many times a transient 5xx response is retried before being
    /// returned. Zero (the default) disables retrying.
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sends the request body form-encoded instead of as JSON.
    #[must_use]
    pub fn form_encoded(mut self) -> Self {
        self.use_json = false;
        self
    }

    /// Finishes the builder.
    pub fn build(self) -> Result<HttpTransport, TransportError> {
        let client = reqwest::Client::builder()
            .default_headers(self.headers)
            .build()
            .map_err(TransportError::network)?;
        Ok(HttpTransport {
            client,
            url: self.url,
            default_timeout: self.timeout,
            retries: self.retries,
            use_json: self.use_json,
        })
    }
}

/// Transport executing GraphQL operations as HTTP `POST` requests.
///
/// A JSON response carrying a `data` or `errors` key is an execution result
/// regardless of status; any other body escalates to the HTTP status.
/// Transient 5xx statuses are retried with exponential backoff up to the
/// configured budget.
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    default_timeout: Option<Duration>,
    retries: u32,
    use_json: bool,
}

impl HttpTransport {
    /// A transport for `url` with default settings.
    pub fn new(url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            default_timeout: None,
            retries: 0,
            use_json: true,
        }
    }

    /// Starts building a transport for `url`.
    pub fn builder(url: Url) -> HttpTransportBuilder {
        HttpTransportBuilder {
            url,
            headers: HeaderMap::new(),
            timeout: None,
            retries: 0,
            use_json: true,
        }
    }

    /// The endpoint requests are posted to.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: Request<'_>) -> Result<ExecutionResult, TransportError> {
        let query = request.query();
        let empty = Variables::new();
        let variables = request.variables.unwrap_or(&empty);
        let body = QueryBody {
            query: &query,
            variables,
            operation_name: request.operation_name,
        };
        let form_pairs = if self.use_json {
            None
        } else {
            let variables = serde_json::to_string(variables).map_err(|e| {
                TransportError::Protocol(format!("failed to encode variables: {e}"))
            })?;
            Some([
                ("query".to_owned(), query.clone()),
                ("variables".to_owned(), variables),
            ])
        };
        let timeout = request.timeout.or(self.default_timeout);

        let mut attempt = 0u32;
        loop {
            let mut builder = self.client.post(self.url.clone());
            if let Some(timeout) = timeout {
                builder = builder.timeout(timeout);
            }
            builder = match &form_pairs {
                None => builder.json(&body),
                Some(pairs) => builder.form(pairs),
            };

            let response = builder.send().await.map_err(|error| {
                if error.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::network(error)
                }
            })?;

            let status = response.status();
            if RETRY_STATUSES.contains(&status.as_u16()) && attempt < self.retries {
                attempt += 1;
                tracing::warn!(
                    status = status.as_u16(),
                    attempt,
                    "server error, backing off before retrying",
                );
                tokio::time::sleep(BACKOFF_FACTOR * 2u32.pow(attempt - 1)).await;
                continue;
            }

            let text = response.text().await.map_err(TransportError::network)?;
            return decode_body(status, &text);
        }
    }
}

fn decode_body(status: StatusCode, body: &str) -> Result<ExecutionResult, TransportError> {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return Err(escalate(status)),
    };
    let carries_result = value
        .as_object()
        .map(|object| object.contains_key("data") || object.contains_key("errors"))
        .unwrap_or(false);
    if !carries_result {
        return Err(escalate(status));
    }
    serde_json::from_value(value)
        .map_err(|error| TransportError::Protocol(format!("malformed GraphQL response: {error}")))
}

/// A response without a GraphQL result is reported through its HTTP status;
/// a 2xx without one is a protocol violation.
fn escalate(status: StatusCode) -> TransportError {
    if status.is_success() {
        TransportError::Protocol("server did not return a GraphQL result".into())
    } else {
        TransportError::Http {
            status: status.as_u16(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bodies_without_a_graphql_result_escalate_to_the_status() {
        assert!(matches!(
            decode_body(StatusCode::NOT_FOUND, "not json"),
            Err(TransportError::Http { status: 404 }),
        ));
        assert!(matches!(
            decode_body(StatusCode::NOT_FOUND, r#"{"message": "nope"}"#),
            Err(TransportError::Http { status: 404 }),
        ));
        assert!(matches!(
            decode_body(StatusCode::OK, "<html>"),
            Err(TransportError::Protocol(_)),
        ));
    }

    #[test]
    fn graphql_results_are_decoded_regardless_of_status() {
        let result =
            decode_body(StatusCode::BAD_REQUEST, r#"{"errors": [{"message": "boom"}]}"#).unwrap();
        assert_eq!(result.first_error().unwrap().message, "boom");

        let result = decode_body(StatusCode::OK, r#"{"data": {"a": 1}}"#).unwrap();
        assert_eq!(result.data, Some(serde_json::json!({"a": 1})));
    }
}
