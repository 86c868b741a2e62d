use std::convert::Infallible;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Request, Response, StatusCode};

/// Body sent for every request
pub const HELLO_BODY: &str = "Hello, World!";

/// Answer any request with `200 Hello, World!`
pub async fn hello<B>(req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible> {
    tracing::debug!(method = %req.method(), path = %req.uri().path(), "Request");

    let mut response = Response::new(Full::new(Bytes::from_static(HELLO_BODY.as_bytes())));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    Ok(response)
}
