//! End-to-end tests of the HTTP transport against in-process servers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use gql_client::{gql, Client, Error, Request, Transport, TransportError, Variables};
use gql_client_http::HttpTransport;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use url::Url;

async fn serve(router: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}/graphql").parse().expect("url")
}

#[tokio::test]
async fn posts_query_and_variables_as_json() {
    async fn echo(Json(body): Json<Value>) -> Json<Value> {
        Json(json!({"data": {"echo": body}}))
    }
    let url = serve(Router::new().route("/graphql", post(echo))).await;

    let transport = HttpTransport::new(url);
    let document = gql("query Hello($name: String) { hello(name: $name) }").unwrap();
    let variables: Variables = json!({"name": "world"}).as_object().cloned().unwrap();

    let result = transport
        .execute(Request::new(&document).variables(&variables))
        .await
        .unwrap();

    let echo = &result.data.unwrap()["echo"];
    assert_eq!(echo["variables"], json!({"name": "world"}));
    let query = echo["query"].as_str().unwrap();
    assert!(query.contains("hello(name: $name)"), "{query}");
}

#[tokio::test]
async fn form_encoding_is_supported() {
    async fn form(Form(fields): Form<HashMap<String, String>>) -> Json<Value> {
        assert!(fields["query"].contains("ping"));
        assert_eq!(fields["variables"], "{}");
        Json(json!({"data": {"ok": true}}))
    }
    let url = serve(Router::new().route("/graphql", post(form))).await;

    let transport = HttpTransport::builder(url).form_encoded().build().unwrap();
    let document = gql("{ ping }").unwrap();
    let result = transport.execute(Request::new(&document)).await.unwrap();
    assert_eq!(result.data, Some(json!({"ok": true})));
}

#[tokio::test]
async fn graphql_errors_come_back_as_results() {
    async fn errors() -> Json<Value> {
        Json(json!({
            "data": null,
            "errors": [{"message": "boom", "extensions": {"code": "BAD_REQUEST"}}],
        }))
    }
    let url = serve(Router::new().route("/graphql", post(errors))).await;

    let transport = HttpTransport::new(url.clone());
    let document = gql("{ ping }").unwrap();
    let result = transport.execute(Request::new(&document)).await.unwrap();
    assert_eq!(result.first_error().unwrap().message, "boom");

    // the client boundary wraps the first entry
    let client = Client::builder().transport(HttpTransport::new(url)).build().unwrap();
    match client.execute(&document, None).await.unwrap_err() {
        Error::Server(entry) => assert_eq!(entry.message, "boom"),
        other => panic!("expected a server error, got: {other}"),
    }
}

#[tokio::test]
async fn non_graphql_bodies_escalate_to_the_status() {
    async fn not_found() -> (StatusCode, Json<Value>) {
        (StatusCode::NOT_FOUND, Json(json!({"message": "no such route"})))
    }
    let url = serve(Router::new().route("/graphql", post(not_found))).await;
    let transport = HttpTransport::new(url);
    let document = gql("{ ping }").unwrap();
    assert!(matches!(
        transport.execute(Request::new(&document)).await.unwrap_err(),
        TransportError::Http { status: 404 },
    ));

    async fn html() -> (StatusCode, String) {
        (StatusCode::OK, "<html>hello</html>".to_owned())
    }
    let url = serve(Router::new().route("/graphql", post(html))).await;
    let transport = HttpTransport::new(url);
    assert!(matches!(
        transport.execute(Request::new(&document)).await.unwrap_err(),
        TransportError::Protocol(_),
    ));
}

#[derive(Clone)]
struct Flaky {
    counter: Arc<AtomicU32>,
    failures: u32,
}

async fn flaky(State(state): State<Flaky>) -> (StatusCode, Json<Value>) {
    let call = state.counter.fetch_add(1, Ordering::SeqCst);
    if call < state.failures {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"reason": "overloaded"})),
        )
    } else {
        (StatusCode::OK, Json(json!({"data": {"ok": true}})))
    }
}

#[tokio::test]
async fn transient_5xx_responses_are_retried() {
    let counter = Arc::new(AtomicU32::new(0));
    let state = Flaky {
        counter: Arc::clone(&counter),
        failures: 2,
    };
    let url = serve(Router::new().route("/graphql", post(flaky)).with_state(state)).await;

    let transport = HttpTransport::builder(url).retries(3).build().unwrap();
    let document = gql("{ ping }").unwrap();
    let result = transport.execute(Request::new(&document)).await.unwrap();
    assert_eq!(result.data, Some(json!({"ok": true})));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_status() {
    let counter = Arc::new(AtomicU32::new(0));
    let state = Flaky {
        counter: Arc::clone(&counter),
        failures: u32::MAX,
    };
    let url = serve(Router::new().route("/graphql", post(flaky)).with_state(state)).await;

    let transport = HttpTransport::builder(url).retries(2).build().unwrap();
    let document = gql("{ ping }").unwrap();
    assert!(matches!(
        transport.execute(Request::new(&document)).await.unwrap_err(),
        TransportError::Http { status: 503 },
    ));
    // one initial attempt plus two retries
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}
