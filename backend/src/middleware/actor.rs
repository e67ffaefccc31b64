//! Actor identity extraction
//!
//! Authentication lives in front of this service; by the time a request
//! arrives here the gateway has resolved the caller and forwards the
//! identity in the `X-Actor` header. The identity is only used to stamp
//! audit fields (movement ledger, status history).

use axum::{extract::FromRequestParts, http::request::Parts};

/// Header carrying the resolved caller identity.
pub const ACTOR_HEADER: &str = "x-actor";

/// Audit identity of the current caller, if the gateway provided one.
#[derive(Clone, Debug, Default)]
pub struct CurrentActor(pub Option<String>);

impl CurrentActor {
    pub fn into_inner(self) -> Option<String> {
        self.0
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(String::from);
        Ok(CurrentActor(actor))
    }
}
