use axum::http::{HeaderName, HeaderValue, Method};
use relayprobe_node_config::HttpHeaders;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::warn;

/// CORS layer from the configured headers. Unparseable entries are skipped.
pub(crate) fn layer(headers: &HttpHeaders) -> CorsLayer {
    let origin = if headers.allow_origin.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parse_all::<HeaderValue>(&headers.allow_origin))
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(AllowMethods::list(parse_all::<Method>(
            &headers.allow_methods,
        )))
        .allow_headers(AllowHeaders::list(parse_all::<HeaderName>(
            &headers.allow_headers,
        )))
}

fn parse_all<T: std::str::FromStr>(values: &[String]) -> Vec<T> {
    values
        .iter()
        .filter_map(|value| match value.parse() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!(%value, "Ignoring invalid CORS header value");
                None
            }
        })
        .collect()
}
