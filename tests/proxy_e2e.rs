//! End-to-end tests: gate service against a mock upstream MCP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Uri};

use audiencegate::config::GateConfig;
use audiencegate::error::GateError;
use audiencegate::policy::{PolicyStore, ResourceKind};
use audiencegate::proxy::GateService;

const TOOLS_RESPONSE: &str =
    r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[{"name":"list_products"},{"name":"manage_users"},{"name":"ping"}]}}"#;

fn policy() -> Arc<PolicyStore> {
    let mut store = PolicyStore::new();
    store.register(ResourceKind::Tool, "list_products", ["PRODUCTS"]);
    store.register(ResourceKind::Tool, "manage_users", ["ADMIN"]);
    store.register(ResourceKind::Tool, "ping", Vec::<String>::new());
    Arc::new(store)
}

async fn spawn_upstream(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn gate_for(addr: SocketAddr) -> GateService {
    let upstream: Uri = format!("http://{addr}").parse().unwrap();
    GateService::new(upstream, policy(), GateConfig::default()).unwrap()
}

fn list_request(method: &str, audience: Option<&str>) -> Request<Full<Bytes>> {
    let body = format!(r#"{{"jsonrpc":"2.0","id":1,"method":"{method}"}}"#);
    let mut builder = Request::builder().method("POST").uri("/mcp");
    if let Some(audience) = audience {
        builder = builder.header("x-audience", audience);
    }
    builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

async fn body_string(res: hyper::Response<audiencegate::proxy::GateBody>) -> String {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_tools_list_is_filtered_by_audience() {
    let app = Router::new().route(
        "/mcp",
        post(|| async { ([(header::CONTENT_TYPE, "application/json")], TOOLS_RESPONSE) }),
    );
    let gate = gate_for(spawn_upstream(app).await);

    let res = gate
        .handle(list_request("tools/list", Some("PRODUCTS")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    // Content-Length is dropped when the body is rewritten in flight.
    assert!(res.headers().get(header::CONTENT_LENGTH).is_none());

    let body = body_string(res).await;
    assert_eq!(
        body,
        r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[{"name":"list_products"},{"name":"ping"}]}}"#
    );
}

#[tokio::test]
async fn test_missing_audience_header_hides_everything() {
    let app = Router::new().route(
        "/mcp",
        post(|| async { ([(header::CONTENT_TYPE, "application/json")], TOOLS_RESPONSE) }),
    );
    let gate = gate_for(spawn_upstream(app).await);

    let res = gate.handle(list_request("tools/list", None)).await.unwrap();
    let body = body_string(res).await;
    assert_eq!(
        body,
        r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#
    );
}

#[tokio::test]
async fn test_chunked_upstream_response_is_filtered() {
    // The upstream streams the response in awkward pieces, splitting an
    // element across chunks; the gate still filters correctly.
    let app = Router::new().route(
        "/mcp",
        post(|| async {
            let chunks: Vec<Result<&'static [u8], std::convert::Infallible>> = vec![
                Ok(br#"{"jsonrpc":"2.0","id":1,"result":{"tools":[{"na"#),
                Ok(br#"me":"manage_users"},{"name":"pi"#),
                Ok(br#"ng"}]}}"#),
            ];
            (
                [(header::CONTENT_TYPE, "application/json")],
                Body::from_stream(futures_util::stream::iter(chunks)),
            )
        }),
    );
    let gate = gate_for(spawn_upstream(app).await);

    let res = gate
        .handle(list_request("tools/list", Some("products")))
        .await
        .unwrap();
    let body = body_string(res).await;
    assert_eq!(
        body,
        r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[{"name":"ping"}]}}"#
    );
}

#[tokio::test]
async fn test_non_list_methods_pass_through_untouched() {
    let canned = r#"{"jsonrpc":"2.0","id":9,"result":{"content":[{"type":"text","text":"{\"tools\":[{\"name\":\"x\"}]}"}]}}"#;
    let app = Router::new().route(
        "/mcp",
        post(move || async move { ([(header::CONTENT_TYPE, "application/json")], canned) }),
    );
    let gate = gate_for(spawn_upstream(app).await);

    let res = gate
        .handle(list_request("tools/call", None))
        .await
        .unwrap();
    let body = body_string(res).await;
    // Byte-for-byte: even embedded text that looks like a tools array is
    // untouched on non-list methods.
    assert_eq!(body, canned);
}

#[tokio::test]
async fn test_compressed_list_response_streams_through_unfiltered() {
    let fake_gzip: &[u8] = b"\x1f\x8b\x08\x00not-really-gzip";
    let app = Router::new().route(
        "/mcp",
        post(move || async move {
            (
                [
                    (header::CONTENT_TYPE, "application/json"),
                    (header::CONTENT_ENCODING, "gzip"),
                ],
                Bytes::from_static(fake_gzip),
            )
                .into_response()
        }),
    );
    let gate = gate_for(spawn_upstream(app).await);

    let res = gate
        .handle(list_request("tools/list", Some("PRODUCTS")))
        .await
        .unwrap();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], fake_gzip);
}

#[tokio::test]
async fn test_error_status_passes_through_unfiltered() {
    let app = Router::new().route(
        "/mcp",
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream exploded") }),
    );
    let gate = gate_for(spawn_upstream(app).await);

    let res = gate
        .handle(list_request("tools/list", Some("PRODUCTS")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_string(res).await, "upstream exploded");
}

#[tokio::test]
async fn test_oversized_request_rejected() {
    let addr = spawn_upstream(Router::new()).await;
    let upstream: Uri = format!("http://{addr}").parse().unwrap();
    let config = GateConfig {
        req_buffer_max: 32,
        ..GateConfig::default()
    };
    let gate = GateService::new(upstream, policy(), config).unwrap();

    let big = "x".repeat(128);
    let req = Request::builder()
        .method("POST")
        .uri("/mcp")
        .body(Full::new(Bytes::from(big)))
        .unwrap();
    let err = gate.handle(req).await.unwrap_err();
    assert!(matches!(err, GateError::PayloadTooLarge(32)));
}

#[tokio::test]
async fn test_unreachable_upstream_is_connection_error() {
    // Bind a listener, grab the port, drop it: nothing is listening there.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let upstream: Uri = format!("http://{addr}").parse().unwrap();
    let gate = GateService::new(upstream, policy(), GateConfig::default()).unwrap();

    let err = gate
        .handle(list_request("tools/list", Some("PRODUCTS")))
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::Connection(_)));
}
