//! Wire types of the render RPC surface.
//!
//! Every method is a `POST` under `/rpc/`. JSON responses use the
//! `{ "data": ... }` envelope; failures use `{ "error": ..., "code": ... }`.
//! `put` takes and `get` returns raw `application/octet-stream` bodies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{FrameNumber, ImageFormat};

pub const ROUTE_PING: &str = "/rpc/ping";
pub const ROUTE_NEWFILE: &str = "/rpc/newfile";
pub const ROUTE_PUT: &str = "/rpc/put";
pub const ROUTE_ENDFILE: &str = "/rpc/endfile";
pub const ROUTE_RENDER_FRAME: &str = "/rpc/render_frame";
pub const ROUTE_RENDER_PART: &str = "/rpc/render_part";
pub const ROUTE_GET_RESULT: &str = "/rpc/get_result";
pub const ROUTE_GET: &str = "/rpc/get";
pub const ROUTE_STOP: &str = "/rpc/stop";

/// Liveness token returned by `ping`.
pub const PING_REPLY: &str = "I am alive";
/// Status token returned by the render methods.
pub const RENDER_FINISHED: &str = "render finished";
/// Acknowledgement returned by `stop`.
pub const STOP_REQUESTED: &str = "stop requested";

/// Machine-readable error codes carried in error bodies.
pub mod codes {
    pub const RENDER_ERROR: &str = "RENDER_ERROR";
    pub const RESOURCE_ERROR: &str = "RESOURCE_ERROR";
    pub const INVALID_STATE: &str = "INVALID_STATE";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// Error body of a failed RPC.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFileAck {
    pub session_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutAck {
    pub bytes_written: u64,
}

/// Returned by `endfile`; lets the client verify the upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub bytes_written: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderFrameRequest {
    pub scene: String,
    pub frame: FrameNumber,
    #[serde(default)]
    pub image_format: ImageFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderPartRequest {
    pub scene: String,
    pub part_index: u32,
    pub part_count: u32,
    #[serde(default)]
    pub image_format: ImageFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderStatus {
    pub status: String,
    pub artifact: String,
}

/// Request body of `get_result`; without a part index the latest artifact
/// is opened.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetResultRequest {
    #[serde(default)]
    pub part_index: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultHandle {
    /// Server-side artifact path.
    pub name: String,
    pub size: u64,
}
