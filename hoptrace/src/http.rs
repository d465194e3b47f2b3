// Copyright Andeya Lee 2024
//
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.
//! API gateway request and response of the ingress stage.

use aws_lambda_events::encodings::Body;
use ::http::header::CONTENT_TYPE;

pub use ::http::{header, HeaderValue, Method};
pub use aws_lambda_events::apigw::{ApiGatewayProxyRequest as HttpRequest, ApiGatewayProxyResponse as HttpResponse};

/// Body of every failed ingress response.
pub const FAILED_BODY: &str = "Failed";

/// Protocol reported when the gateway omits it.
pub const DEFAULT_PROTOCOL: &str = "HTTP/1.1";

/// A request for `resource` as the gateway would deliver it, without headers.
pub fn request(method: Method, resource: &str) -> HttpRequest {
    let mut request = HttpRequest {
        http_method: method,
        resource: Some(resource.to_owned()),
        path: Some(resource.to_owned()),
        ..Default::default()
    };
    request.request_context.protocol = Some(DEFAULT_PROTOCOL.to_owned());
    request
}

/// Header value by case-insensitive name; empty when absent or not visible ASCII.
pub fn header<'a>(request: &'a HttpRequest, name: &str) -> &'a str {
    request.headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

/// Inbound protocol, e.g. `HTTP/1.1`.
pub fn protocol(request: &HttpRequest) -> &str {
    request.request_context.protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL)
}

/// 200 with the given JSON body.
pub fn ok(body: String) -> HttpResponse {
    response(200, body)
}

/// 500 with [`FAILED_BODY`].
pub fn failed() -> HttpResponse {
    response(500, FAILED_BODY.to_owned())
}

fn response(status_code: i64, body: String) -> HttpResponse {
    let mut response = HttpResponse {
        status_code,
        body: Some(Body::Text(body)),
        ..Default::default()
    };
    response.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Whether the status code is 200.
pub fn is_success(response: &HttpResponse) -> bool {
    response.status_code == 200
}

/// Text body of a response; empty for a missing or binary body.
pub fn body_text(response: &HttpResponse) -> &str {
    match &response.body {
        Some(Body::Text(text)) => text,
        _ => "",
    }
}
