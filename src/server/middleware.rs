use axum::{
    body::Body,
    extract::State,
    http::{Request, Uri},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use hyper::StatusCode;
use std::time::Instant;

use super::AppState;
use super::envelope;

/// Bearer-token check for protected routes. When no key is configured the
/// check is disabled (development mode), matching the proxy's single-tenant
/// trust model.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.config.api_key.as_deref() else {
        tracing::warn!("RELAY_API_KEY not set - authentication disabled");
        return next.run(req).await;
    };

    let header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok());

    let Some(header) = header else {
        return unauthorized("Unauthorized - Missing Authorization header");
    };

    if bearer_token(header) != expected {
        return unauthorized("Unauthorized - Invalid API key");
    }

    next.run(req).await
}

pub fn bearer_token(header: &str) -> &str {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .unwrap_or(header)
        .trim()
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(envelope::error(message)),
    )
        .into_response()
}

/// Records every request to the request-log table. The write happens in a
/// spawned task after the response is produced, so the response path never
/// waits on the store.
pub async fn log_request(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().to_string();
    let user_agent = req
        .headers()
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .map(String::from);

    let start = Instant::now();
    let response = next.run(req).await;
    let duration_ms = start.elapsed().as_millis() as i64;
    let status = response.status().as_u16();

    let store = state.store.clone();
    tokio::spawn(async move {
        if let Err(e) = store
            .log_request(&path, &method, status, user_agent.as_deref(), duration_ms)
            .await
        {
            tracing::warn!(error = %e, path = %path, "failed to log request");
        }
    });

    response
}

pub async fn strip_trailing_slash(req: Request<Body>, next: Next) -> Response {
    let uri = req.uri();

    if let Some(path) = uri.path().strip_suffix('/')
        && !path.is_empty()
    {
        let mut parts = uri.clone().into_parts();
        parts.path_and_query = Some(if let Some(query) = uri.query() {
            format!("{path}?{query}").parse().unwrap()
        } else {
            path.parse().unwrap()
        });

        let new_uri = Uri::from_parts(parts).unwrap();

        Redirect::permanent(&new_uri.to_string()).into_response()
    } else {
        next.run(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_strips_prefix() {
        assert_eq!(bearer_token("Bearer secret"), "secret");
        assert_eq!(bearer_token("bearer secret"), "secret");
        assert_eq!(bearer_token("secret"), "secret");
        assert_eq!(bearer_token("Bearer  secret "), "secret");
    }
}
