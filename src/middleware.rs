//! Request ID middleware for correlating logs with requests.
//!
//! Every request gets a UUID v4, echoed back in the `x-request-id` response
//! header, and is processed inside a tracing span carrying that ID, so every
//! log line emitted while handling it can be correlated.

use std::time::Instant;

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

/// Response header carrying the request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request extension holding the ID assigned to this request.
#[derive(Clone, Copy, Debug)]
pub struct RequestId(pub Uuid);

/// Assign a request ID and run the rest of the stack inside a request span.
///
/// Install as the outermost layer so the span covers every other layer.
pub async fn request_id_layer(mut request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
        status = tracing::field::Empty,
    );
    request.extensions_mut().insert(RequestId(request_id));

    let started = Instant::now();
    async move {
        let mut response = next.run(request).await;
        let status = response.status().as_u16();
        tracing::Span::current().record("status", status);
        tracing::debug!(
            duration_ms = started.elapsed().as_millis() as u64,
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}
