//! Core gate service: classify, forward, filter.
//!
//! The request side is buffered: JSON-RPC request bodies are small and the
//! method name decides whether the response needs filtering. The response
//! side streams: list responses flow through a [`FilteredBody`], everything
//! else is forwarded frame by frame untouched.

use std::sync::Arc;

use bytes::Bytes;
use http::header;
use http::Uri;
use http_body::Body;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, info, warn};

use crate::audience::RequestedAudiences;
use crate::config::GateConfig;
use crate::error::{BoxError, GateError, GateResult};
use crate::filter::{ChunkQueueSink, ListFilterSpec, RemovalFn, StreamFilter};
use crate::policy::{PolicyStore, RemovalPredicate, ResourceKind};

use super::body::FilteredBody;

/// Boxed response body type returned by the gate.
pub type GateBody = BoxBody<Bytes, BoxError>;

/// List methods the gate filters, with the array shape each one carries.
fn list_target(method: &str) -> Option<(ListFilterSpec, ResourceKind)> {
    match method {
        "tools/list" => Some((ListFilterSpec::tools(), ResourceKind::Tool)),
        "prompts/list" => Some((ListFilterSpec::prompts(), ResourceKind::Prompt)),
        "resources/list" => Some((ListFilterSpec::resources(), ResourceKind::Resource)),
        _ => None,
    }
}

/// The audience-filtering reverse proxy service.
///
/// One instance serves all connections; per-response filter state lives in
/// the response body wrapper, so no locking is needed here. The policy store
/// is read-only after startup.
#[derive(Clone)]
pub struct GateService {
    client: Client<HttpConnector, Full<Bytes>>,
    upstream: Uri,
    policy: Arc<PolicyStore>,
    config: GateConfig,
}

impl GateService {
    /// Create a gate forwarding to `upstream` (scheme + authority required,
    /// `http` only).
    pub fn new(upstream: Uri, policy: Arc<PolicyStore>, config: GateConfig) -> GateResult<Self> {
        if upstream.authority().is_none() {
            return Err(GateError::InvalidUri(
                "upstream URL must include an authority".to_string(),
            ));
        }
        match upstream.scheme_str() {
            Some("http") => {}
            other => {
                return Err(GateError::InvalidUri(format!(
                    "upstream scheme must be http, got {other:?}"
                )));
            }
        }

        let client = Client::builder(TokioExecutor::new())
            .http2_keep_alive_while_idle(true)
            .build_http::<Full<Bytes>>();

        Ok(Self {
            client,
            upstream,
            policy,
            config,
        })
    }

    /// Handle one request: buffer, classify, forward, and wrap the response
    /// body in a streaming filter when the method is a list call.
    pub async fn handle<B>(&self, req: Request<B>) -> GateResult<Response<GateBody>>
    where
        B: Body + Send + 'static,
        B::Data: Send,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();

        let audiences = RequestedAudiences::from_header(
            parts
                .headers
                .get(self.config.audience_header.as_str())
                .and_then(|v| v.to_str().ok()),
        );

        // Buffer the JSON-RPC request with a size limit so one request
        // cannot exhaust memory.
        let limit = self.config.req_buffer_max;
        let body_bytes = Limited::new(body, limit)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    warn!(limit = limit, "request body exceeded buffer limit");
                    GateError::PayloadTooLarge(limit)
                } else {
                    GateError::Client(e.to_string())
                }
            })?
            .to_bytes();

        let target = classify_method(&body_bytes).and_then(|m| list_target(&m));

        debug!(
            method = %parts.method,
            path = %parts.uri.path(),
            filtering = target.is_some(),
            requested_audiences = audiences.len(),
            "forwarding request"
        );

        let upstream_req = self.build_upstream_request(&parts, body_bytes, target.is_some())?;

        let upstream_res = self
            .client
            .request(upstream_req)
            .await
            .map_err(|e| GateError::Connection(e.to_string()))?;

        match target {
            Some((spec, kind)) if self.response_is_filterable(&upstream_res) => {
                let predicate = RemovalPredicate::new(Arc::clone(&self.policy), kind, audiences);
                let (mut res_parts, res_body) = upstream_res.into_parts();
                // The filtered body may shrink; drop the declared length and
                // let the connection switch to chunked transfer.
                res_parts.headers.remove(header::CONTENT_LENGTH);

                let filter = StreamFilter::new(
                    spec,
                    Box::new(move |id: &str| predicate.should_remove(id)) as RemovalFn,
                    ChunkQueueSink::new(),
                )
                .with_pending_max(self.config.filter_pending_max);

                let filtered = FilteredBody::new(res_body, filter);
                Ok(Response::from_parts(res_parts, filtered.boxed()))
            }
            _ => Ok(upstream_res.map(|b| b.map_err(Into::into).boxed())),
        }
    }

    /// Whether this response can be filtered in-stream.
    ///
    /// Compressed bodies cannot be marker-scanned; they stream through
    /// unfiltered with a warning (the request side already asked for
    /// identity encoding, so this indicates a non-compliant upstream).
    fn response_is_filterable<B>(&self, res: &Response<B>) -> bool {
        if !res.status().is_success() {
            return false;
        }
        if let Some(encoding) = res.headers().get(header::CONTENT_ENCODING) {
            let encoding = encoding.to_str().unwrap_or("unknown");
            if !encoding.eq_ignore_ascii_case("identity") {
                warn!(
                    encoding = encoding,
                    "upstream sent a compressed list response, filtering skipped"
                );
                return false;
            }
        }
        true
    }

    /// Rebuild the request for the upstream, copying end-to-end headers.
    fn build_upstream_request(
        &self,
        parts: &http::request::Parts,
        body: Bytes,
        filtering: bool,
    ) -> GateResult<Request<Full<Bytes>>> {
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let authority = self
            .upstream
            .authority()
            .expect("authority validated at construction");
        let uri = Uri::builder()
            .scheme("http")
            .authority(authority.as_str())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| GateError::InvalidUri(e.to_string()))?;

        let mut builder = Request::builder()
            .method(parts.method.clone())
            .uri(uri)
            .version(http::Version::HTTP_11);

        let headers = builder
            .headers_mut()
            .expect("request builder is valid before body attachment");
        for (name, value) in parts.headers.iter() {
            if is_hop_by_hop_header(name.as_str())
                || name == &header::HOST
                || name == &header::CONTENT_LENGTH
            {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        headers.insert(
            header::HOST,
            authority
                .as_str()
                .parse()
                .map_err(|_| GateError::InvalidUri("upstream authority".to_string()))?,
        );
        headers.insert(header::CONTENT_LENGTH, body.len().into());
        if filtering {
            // Ensure the upstream does not compress a response we need to
            // scan (mirrors the buffered-inspection rule).
            headers.remove(header::ACCEPT_ENCODING);
        }

        builder
            .body(Full::new(body))
            .map_err(|e| GateError::Connection(format!("failed to build request: {e}")))
    }
}

/// Extract the JSON-RPC method name from a buffered request body.
///
/// Anything that is not a single JSON object with a string `method` field
/// yields `None` and the request streams through unfiltered.
fn classify_method(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("method")
        .and_then(|m| m.as_str())
        .map(String::from)
}

/// Hop-by-hop headers that must not be forwarded (RFC 7230 §6.1).
fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Log the startup summary for a constructed gate.
pub fn log_startup(upstream: &Uri, policy: &PolicyStore, config: &GateConfig) {
    info!(
        upstream = %upstream,
        capabilities = policy.len(),
        audience_header = %config.audience_header,
        filter_pending_max = config.filter_pending_max,
        "audiencegate ready"
    );
}
