use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::errors::AppError;

/// Set by the authenticating gateway in front of this service.
pub const OWNER_HEADER: &str = "x-user-id";

/// The authenticated owner of the request.
#[derive(Debug, Clone, Copy)]
pub struct OwnerId(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;
        let owner = Uuid::parse_str(raw.trim()).map_err(|_| AppError::Unauthorized)?;
        Ok(OwnerId(owner))
    }
}
