//! services/api/src/web/middleware.rs
//!
//! Identity middleware for protecting routes.

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::debug;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Reads the authenticated user id from the `x-user-id` header.
///
/// If valid, inserts the id into request extensions for handlers to use.
/// A missing header is 401 Unauthorized, a malformed one 400 Bad Request.
pub async fn require_user(mut req: Request, next: Next) -> Result<Response, (StatusCode, String)> {
    let raw = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                format!("{USER_ID_HEADER} header is required"),
            )
        })?;

    let user_id = Uuid::parse_str(raw.trim()).map_err(|_| {
        debug!("Rejected malformed user id header: {}", raw);
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid {USER_ID_HEADER} format"),
        )
    })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::Extension, middleware::from_fn, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|Extension(user_id): Extension<Uuid>| async move { user_id.to_string() }),
            )
            .layer(from_fn(require_user))
    }

    fn request(header: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/whoami");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn valid_header_reaches_the_handler() {
        let user_id = Uuid::new_v4();
        let response = app()
            .oneshot(request(Some(&user_id.to_string())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, user_id.to_string().as_bytes());
    }

    #[tokio::test]
    async fn missing_or_malformed_headers_are_rejected() {
        let missing = app().oneshot(request(None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let malformed = app().oneshot(request(Some("not-a-uuid"))).await.unwrap();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    }
}
