pub mod admin;
pub mod health;
pub mod reports;
pub mod work_items;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::Router;

use crate::error::ApiError;
use crate::state::AppState;

/// Caller identity as asserted by the fronting proxy. Anything without an
/// explicit role header is a viewer.
#[derive(Debug, Clone)]
pub struct Principal {
    pub role: String,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let role = parts
            .headers
            .get("x-auth-role")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("viewer")
            .to_string();
        Ok(Self { role })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(work_items::router())
        .merge(reports::router())
        .merge(admin::router())
}
