//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::jwt::JwtManager;

/// Authenticated user information extracted from the bearer token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    /// Membership in the configured admin allow-list
    pub is_admin: bool,
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
    /// Lowercase admin emails from configuration
    pub admin_emails: Vec<String>,
}

/// Extract bearer token from the Authorization header
fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
}

/// Middleware that requires a valid bearer token
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer_token(&request) else {
        tracing::debug!(path = %request.uri().path(), "Missing bearer token");
        return unauthorized("Authentication required");
    };

    match auth_state.jwt_manager.validate_token(token) {
        Ok(claims) => {
            let email = claims.email.to_lowercase();
            let is_admin = auth_state.admin_emails.iter().any(|a| a == &email);
            request.extensions_mut().insert(AuthUser {
                user_id: claims.sub,
                email: claims.email,
                is_admin,
            });
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(path = %request.uri().path(), error = %e, "Token validation failed");
            unauthorized("Invalid or expired token")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": {
                "code": "UNAUTHORIZED",
                "message": message,
            }
        })),
    )
        .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    fn test_state() -> AuthState {
        AuthState {
            jwt_manager: JwtManager::new("test-secret-key-at-least-32-chars!", 24),
            admin_emails: vec!["admin@example.com".to_string()],
        }
    }

    fn test_app(state: AuthState) -> Router {
        async fn whoami(Extension(user): Extension<AuthUser>) -> String {
            format!("{}:{}", user.user_id, user.is_admin)
        }
        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(state, require_auth))
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let app = test_app(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_token_is_401() {
        let app = test_app(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(AUTHORIZATION, "Bearer garbage")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_token_passes_and_flags_admin() {
        let state = test_state();
        let token = state
            .jwt_manager
            .generate_token("user-1", "Admin@Example.com")
            .unwrap();
        let app = test_app(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"user-1:true");
    }
}
