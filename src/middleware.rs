//! HTTP request tracking middleware for observability

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use std::time::Instant;

/// Middleware to track HTTP request latency and counts
pub async fn track_metrics(req: Request, next: Next) -> Result<Response, StatusCode> {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    // Normalize path to avoid high cardinality (group dynamic IDs)
    let normalized_path = normalize_path(&path);

    crate::metrics::HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &normalized_path, &status])
        .observe(duration);

    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &normalized_path, &status])
        .inc();

    Ok(response)
}

/// Normalize path to prevent metric cardinality explosion
/// /api/timeline/Contact/John%20Smith -> /api/timeline/{param}/{param}
fn normalize_path(path: &str) -> String {
    // Fixed-route prefixes; anything after them is caller data.
    const PARAM_ROUTES: &[&str] = &[
        "/api/timeline/",
        "/api/daily_log/",
        "/api/memory/",
        "/api/lessons/",
        "/api/audit/",
    ];

    for prefix in PARAM_ROUTES {
        if let Some(rest) = path.strip_prefix(prefix) {
            let params = rest.split('/').filter(|s| !s.is_empty()).count().max(1);
            let mut out = prefix.trim_end_matches('/').to_string();
            for _ in 0..params {
                out.push_str("/{param}");
            }
            return out;
        }
    }

    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path("/api/timeline/Contact/John"),
            "/api/timeline/{param}/{param}"
        );
        assert_eq!(
            normalize_path("/api/memory/550e8400-e29b-41d4-a716-446655440000"),
            "/api/memory/{param}"
        );
        assert_eq!(normalize_path("/api/daily_log/2026-08-29"), "/api/daily_log/{param}");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/api/ingest"), "/api/ingest");
    }
}
