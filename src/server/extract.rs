use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::auth::User;
use crate::error::{unauthenticated_error, Error};

/// Identity asserted by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Comma-separated roles of that identity.
pub const USER_ROLES_HEADER: &str = "x-user-roles";

#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(unauthenticated_error)?;

        let roles = parts
            .headers
            .get(USER_ROLES_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|role| !role.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(User::new(id, roles))
    }
}
