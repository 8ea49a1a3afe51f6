use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, Response},
    middleware::Next,
};

/// The API only serves JSON, so nothing may be loaded or framed.
const CSP: &str = "default-src 'none'; frame-ancestors 'none'; base-uri 'none'; form-action 'none'";

const SECURITY_HEADERS: [(&str, &str); 3] = [
    ("content-security-policy", CSP),
    ("referrer-policy", "no-referrer"),
    ("x-content-type-options", "nosniff"),
];

/// Add security headers to every response, keeping any a handler already set.
pub async fn security_headers(req: Request<Body>, next: Next) -> Response<Body> {
    let mut res = next.run(req).await;

    for (name, value) in SECURITY_HEADERS {
        if res.headers().get(name).is_none() {
            res.headers_mut().insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
    }

    res
}
