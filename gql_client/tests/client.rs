//! Client orchestration tests: construction rules, validation, local
//! execution, scalar adaptors and the retry policy.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use gql_client::{
    gql, AdaptorError, Client, Error, ExecutionResult, Request, Transport, TransportError,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn local_client() -> Client<gql_client::LocalSchemaTransport> {
    Client::builder()
        .schema(common::star_wars_schema())
        .transport(common::star_wars_transport())
        .build()
        .unwrap()
}

#[test]
fn at_most_one_schema_source_is_accepted() {
    let err = Client::builder()
        .schema(common::star_wars_schema())
        .type_defs(common::STAR_WARS_SDL)
        .transport(common::star_wars_transport())
        .build()
        .err().unwrap();
    assert!(matches!(err, Error::Config(_)), "schema+type_defs: {err}");

    let err = Client::builder()
        .schema(common::star_wars_schema())
        .introspection(json!({}))
        .transport(common::star_wars_transport())
        .build()
        .err().unwrap();
    assert!(matches!(err, Error::Config(_)), "schema+introspection: {err}");

    let err = Client::builder()
        .type_defs(common::STAR_WARS_SDL)
        .introspection(json!({}))
        .transport(common::star_wars_transport())
        .build()
        .err().unwrap();
    assert!(matches!(err, Error::Config(_)), "type_defs+introspection: {err}");
}

#[test]
fn a_transport_or_schema_is_required() {
    let err = Client::<gql_client::LocalSchemaTransport>::builder()
        .build()
        .err().unwrap();
    assert!(matches!(err, Error::Config(_)));

    let err = Client::builder().build_local().err().unwrap();
    assert!(matches!(err, Error::Config(_)));

    // schema without transport synthesizes local execution
    assert!(Client::builder()
        .schema(common::star_wars_schema())
        .build_local()
        .is_ok());
}

#[test]
fn validation_requires_a_schema() {
    let client = Client::builder()
        .transport(common::star_wars_transport())
        .build()
        .unwrap();
    let document = gql("{ hero { name } }").unwrap();
    assert!(matches!(
        client.validate(&document).unwrap_err(),
        Error::Syntax(_),
    ));
}

#[tokio::test]
async fn invalid_documents_are_rejected_before_execution() {
    let client = local_client();
    let document = gql("{ hero { name bloh } }").unwrap();
    match client.execute(&document, None).await.unwrap_err() {
        Error::Validation(errors) => {
            assert_eq!(
                errors[0].message(),
                "Cannot query field \"bloh\" on type \"Character\".",
            );
        }
        other => panic!("expected a validation error, got: {other}"),
    }
}

#[tokio::test]
async fn executes_against_the_local_schema() {
    let client = local_client();

    let document = gql("{ hero { name } }").unwrap();
    let result = client.execute(&document, None).await.unwrap();
    assert_eq!(result, json!({"hero": {"name": "R2-D2"}}));

    let document = gql("query Luke($id: String!) { human(id: $id) { name homePlanet } }").unwrap();
    let variables = json!({"id": "1000"}).as_object().cloned().unwrap();
    let result = client.execute(&document, Some(variables)).await.unwrap();
    assert_eq!(
        result,
        json!({"human": {"name": "Luke Skywalker", "homePlanet": "Tatooine"}}),
    );
}

#[tokio::test]
async fn custom_scalar_adaptors_rewrite_results() {
    let lowercase = |value: &serde_json::Value| match value.as_str() {
        Some(s) => Ok(serde_json::Value::String(s.to_lowercase())),
        None => Err(AdaptorError::new("expected a string")),
    };
    let client = Client::builder()
        .schema(common::star_wars_schema())
        .transport(common::star_wars_transport())
        .custom_scalar("String", Arc::new(lowercase))
        .build()
        .unwrap();

    let document = gql("{ hero { name } }").unwrap();
    let result = client.execute(&document, None).await.unwrap();
    assert_eq!(result, json!({"hero": {"name": "r2-d2"}}));
}

#[tokio::test]
async fn identity_adaptor_leaves_results_untouched() {
    let identity =
        |value: &serde_json::Value| -> Result<serde_json::Value, AdaptorError> { Ok(value.clone()) };
    let plain = local_client();
    let adapted = Client::builder()
        .schema(common::star_wars_schema())
        .transport(common::star_wars_transport())
        .custom_scalar("String", Arc::new(identity))
        .build()
        .unwrap();

    let document = gql("{ hero { name appearsIn friends { name } } }").unwrap();
    assert_eq!(
        plain.execute(&document, None).await.unwrap(),
        adapted.execute(&document, None).await.unwrap(),
    );
}

/// A transport that fails a configurable number of times before succeeding.
struct FlakyTransport {
    calls: AtomicU32,
    failures: u32,
    error: fn() -> TransportError,
}

impl FlakyTransport {
    fn failing_forever(error: fn() -> TransportError) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures: u32::MAX,
            error,
        }
    }

    fn failing(failures: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures,
            error: || TransportError::Http { status: 503 },
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn execute(&self, _request: Request<'_>) -> Result<ExecutionResult, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err((self.error)())
        } else {
            Ok(ExecutionResult::from_data(json!({"ok": true})))
        }
    }
}

#[tokio::test(start_paused = true)]
async fn retries_exhaust_into_a_retry_error() {
    let client = Client::builder()
        .transport(FlakyTransport::failing_forever(|| TransportError::Http {
            status: 503,
        }))
        .retries(3)
        .build()
        .unwrap();

    let document = gql("{ ping }").unwrap();
    match client.execute(&document, None).await.unwrap_err() {
        Error::Retry { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(matches!(source, TransportError::Http { status: 503 }));
        }
        other => panic!("expected retry exhaustion, got: {other}"),
    }
    assert_eq!(client.transport().calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn a_late_success_ends_the_retry_loop() {
    let client = Client::builder()
        .transport(FlakyTransport::failing(2))
        .retries(5)
        .build()
        .unwrap();

    let document = gql("{ ping }").unwrap();
    let result = client.execute(&document, None).await.unwrap();
    assert_eq!(result, json!({"ok": true}));
    assert_eq!(client.transport().calls(), 3);
}

#[tokio::test]
async fn protocol_errors_are_never_retried() {
    let client = Client::builder()
        .transport(FlakyTransport::failing_forever(|| {
            TransportError::Protocol("garbage".into())
        }))
        .retries(5)
        .build()
        .unwrap();

    let document = gql("{ ping }").unwrap();
    assert!(matches!(
        client.execute(&document, None).await.unwrap_err(),
        Error::Transport(TransportError::Protocol(_)),
    ));
    assert_eq!(client.transport().calls(), 1);
}

#[tokio::test]
async fn without_retries_the_first_failure_passes_through() {
    let client = Client::builder()
        .transport(FlakyTransport::failing(1))
        .build()
        .unwrap();

    let document = gql("{ ping }").unwrap();
    assert!(matches!(
        client.execute(&document, None).await.unwrap_err(),
        Error::Transport(TransportError::Http { status: 503 }),
    ));
    assert_eq!(client.transport().calls(), 1);
}

#[tokio::test]
async fn server_errors_wrap_the_first_entry() {
    struct ErroringTransport;

    #[async_trait]
    impl Transport for ErroringTransport {
        async fn execute(&self, _request: Request<'_>) -> Result<ExecutionResult, TransportError> {
            Ok(serde_json::from_value(json!({
                "data": null,
                "errors": [
                    {"message": "first failure"},
                    {"message": "second failure"},
                ],
            }))
            .expect("literal parses"))
        }
    }

    let client = Client::builder().transport(ErroringTransport).build().unwrap();
    let document = gql("{ ping }").unwrap();
    match client.execute(&document, None).await.unwrap_err() {
        Error::Server(entry) => assert_eq!(entry.message, "first failure"),
        other => panic!("expected a server error, got: {other}"),
    }
}
