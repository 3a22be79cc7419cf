//! Request mediator
//!
//! Turns one proxied sub-request into a decision: `204` to let the request
//! through, `401` with a challenge to deny, `500` on directory faults. Denials
//! never say whether the user exists.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use ldapgate_auth::AuthDecision;
use ldapgate_core::HttpConfig;
use std::time::Instant;
use tracing::{debug, warn};

use crate::credentials::BasicCredentials;
use crate::server::AppState;

/// Verify the Basic credentials of any method on any path
pub async fn verify_request(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let credentials = match BasicCredentials::from_headers(&headers) {
        Some(credentials) => credentials,
        None => {
            debug!("Missing or malformed Basic credentials");
            return challenge(&state.challenge);
        }
    };

    let started = Instant::now();
    let decision = state
        .authenticator
        .authenticate(&credentials.username, &credentials.password)
        .await;
    state
        .metrics
        .record_decision(&decision, started.elapsed().as_secs_f64());

    render(&state.http, &state.challenge, &uri, decision)
}

/// Translate a decision into the response the reverse proxy expects
pub fn render(
    http: &HttpConfig,
    challenge_value: &HeaderValue,
    uri: &Uri,
    decision: AuthDecision,
) -> Response {
    match decision {
        AuthDecision::Allowed(subject) => {
            let mut response = StatusCode::NO_CONTENT.into_response();
            let headers = response.headers_mut();

            if let Some(prefix) = http.redirect_prefix() {
                let target = format!(
                    "{}{}",
                    prefix,
                    uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
                );
                insert_header(headers, &http.redirect_header, &target);
            }
            if let Some(user_header) = &http.user_header {
                insert_header(headers, user_header, &subject.uid);
            }

            response
        }
        AuthDecision::DeniedUnauthenticated | AuthDecision::DeniedUnauthorized => {
            challenge(challenge_value)
        }
        AuthDecision::Failed(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// Build the `WWW-Authenticate` value for a realm
pub fn challenge_header(realm: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("Basic realm=\"{}\"", realm)).ok()
}

fn challenge(value: &HeaderValue) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, value.clone())],
        "Unauthorized",
    )
        .into_response()
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => warn!("Skipping success header {} with unrepresentable value", name),
    }
}
