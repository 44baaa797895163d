//! Handlers for the render RPC methods.
//!
//! Every handler except `ping` takes the service lock for the whole call,
//! so a render blocks other callers until it finishes.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::Json;
use tessera_core::protocol::{
    DataResponse, GetResultRequest, NewFileAck, PutAck, RenderFrameRequest, RenderPartRequest,
    RenderStatus, ResultHandle, UploadSummary, PING_REPLY,
};

use crate::error::AppResult;
use crate::extract::RpcJson;
use crate::state::AppState;

/// POST /rpc/ping
///
/// Answers without waiting for an in-flight call.
pub async fn ping() -> Json<DataResponse<&'static str>> {
    Json(DataResponse { data: PING_REPLY })
}

/// POST /rpc/newfile
pub async fn newfile(State(state): State<AppState>) -> AppResult<Json<DataResponse<NewFileAck>>> {
    let session_id = state.service.lock().await.newfile().await?;
    Ok(Json(DataResponse {
        data: NewFileAck { session_id },
    }))
}

/// POST /rpc/put -- raw chunk body.
pub async fn put(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<DataResponse<PutAck>>> {
    let bytes_written = state.service.lock().await.put(&body).await?;
    Ok(Json(DataResponse {
        data: PutAck { bytes_written },
    }))
}

/// POST /rpc/endfile
pub async fn endfile(State(state): State<AppState>) -> AppResult<Json<DataResponse<UploadSummary>>> {
    let summary = state.service.lock().await.endfile().await?;
    Ok(Json(DataResponse { data: summary }))
}

/// POST /rpc/render_frame
pub async fn render_frame(
    State(state): State<AppState>,
    RpcJson(req): RpcJson<RenderFrameRequest>,
) -> AppResult<Json<DataResponse<RenderStatus>>> {
    let status = state
        .service
        .lock()
        .await
        .render_frame(&req.scene, req.frame, req.image_format)
        .await?;
    Ok(Json(DataResponse { data: status }))
}

/// POST /rpc/render_part
pub async fn render_part(
    State(state): State<AppState>,
    RpcJson(req): RpcJson<RenderPartRequest>,
) -> AppResult<Json<DataResponse<RenderStatus>>> {
    let status = state
        .service
        .lock()
        .await
        .render_part(&req.scene, req.part_index, req.part_count, req.image_format)
        .await?;
    Ok(Json(DataResponse { data: status }))
}

/// POST /rpc/get_result
pub async fn get_result(
    State(state): State<AppState>,
    RpcJson(req): RpcJson<GetResultRequest>,
) -> AppResult<Json<DataResponse<ResultHandle>>> {
    let handle = state.service.lock().await.get_result(req.part_index).await?;
    Ok(Json(DataResponse { data: handle }))
}

/// POST /rpc/get -- raw chunk response; empty at end of artifact.
pub async fn get(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let chunk = state.service.lock().await.get().await?;
    Ok(([(CONTENT_TYPE, "application/octet-stream")], chunk))
}

/// POST /rpc/stop
pub async fn stop(State(state): State<AppState>) -> Json<DataResponse<&'static str>> {
    let reply = state.service.lock().await.stop();
    Json(DataResponse { data: reply })
}
