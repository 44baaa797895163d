//! JSON body extractor for RPC requests.

use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Like [`Json`], but a body that fails to parse is answered with the RPC
/// error envelope (`BAD_REQUEST`, 400) instead of axum's plain-text
/// rejection.
///
/// ```ignore
/// async fn render_frame(RpcJson(req): RpcJson<RenderFrameRequest>) -> AppResult<...> { ... }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcJson<T>(pub T);

impl<T, S> FromRequest<S> for RpcJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}
