//! HTTP client for the render server RPC surface.
//!
//! Wraps every RPC method of a single render server using [`reqwest`].

use tessera_core::error::CoreError;
use tessera_core::protocol::{
    DataResponse, ErrorBody, GetResultRequest, NewFileAck, PutAck, RenderFrameRequest,
    RenderPartRequest, RenderStatus, ResultHandle, UploadSummary, ROUTE_ENDFILE, ROUTE_GET,
    ROUTE_GET_RESULT, ROUTE_NEWFILE, ROUTE_PING, ROUTE_PUT, ROUTE_RENDER_FRAME, ROUTE_RENDER_PART,
    ROUTE_STOP,
};
use uuid::Uuid;

/// HTTP client for one render server.
#[derive(Debug, Clone)]
pub struct RenderClient {
    client: reqwest::Client,
    base_url: String,
}

/// Errors from the RPC layer.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The HTTP request itself failed (connect, reset, timeout, bad body).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("RPC fault ({status}, {code}): {message}")]
    Fault {
        status: u16,
        code: String,
        message: String,
    },
}

impl From<RpcError> for CoreError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Request(e) => CoreError::Transport(e.to_string()),
            RpcError::Fault { code, message, .. } => CoreError::RemoteFault { code, message },
        }
    }
}

impl RenderClient {
    /// Create a client for a render server.
    ///
    /// * `base_url` - e.g. `http://192.168.1.5:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn ping(&self) -> Result<String, RpcError> {
        let response = self.post(ROUTE_PING).send().await?;
        Self::parse_data(response).await
    }

    /// Open an upload session.
    pub async fn newfile(&self) -> Result<Uuid, RpcError> {
        let response = self.post(ROUTE_NEWFILE).send().await?;
        let ack: NewFileAck = Self::parse_data(response).await?;
        Ok(ack.session_id)
    }

    /// Append a chunk to the open upload; returns the running byte count.
    pub async fn put(&self, chunk: Vec<u8>) -> Result<u64, RpcError> {
        let response = self
            .post(ROUTE_PUT)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(chunk)
            .send()
            .await?;
        let ack: PutAck = Self::parse_data(response).await?;
        Ok(ack.bytes_written)
    }

    pub async fn endfile(&self) -> Result<UploadSummary, RpcError> {
        let response = self.post(ROUTE_ENDFILE).send().await?;
        Self::parse_data(response).await
    }

    pub async fn render_frame(&self, request: &RenderFrameRequest) -> Result<RenderStatus, RpcError> {
        let response = self.post(ROUTE_RENDER_FRAME).json(request).send().await?;
        Self::parse_data(response).await
    }

    pub async fn render_part(&self, request: &RenderPartRequest) -> Result<RenderStatus, RpcError> {
        let response = self.post(ROUTE_RENDER_PART).json(request).send().await?;
        Self::parse_data(response).await
    }

    /// Open the latest artifact, or the artifact of `part_index`, for download.
    pub async fn get_result(&self, part_index: Option<u32>) -> Result<ResultHandle, RpcError> {
        let response = self
            .post(ROUTE_GET_RESULT)
            .json(&GetResultRequest { part_index })
            .send()
            .await?;
        Self::parse_data(response).await
    }

    /// Next chunk of the open download; empty at the end.
    pub async fn get(&self) -> Result<Vec<u8>, RpcError> {
        let response = self.post(ROUTE_GET).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn stop(&self) -> Result<String, RpcError> {
        let response = self.post(ROUTE_STOP).send().await?;
        Self::parse_data(response).await
    }

    // ---- private helpers ----

    fn post(&self, route: &str) -> reqwest::RequestBuilder {
        self.client.post(format!("{}{}", self.base_url, route))
    }

    /// Ensure the response has a success status code. Error bodies are
    /// decoded as `{error, code}` when possible, otherwise kept as text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RpcError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.code, body.error),
            Err(_) => (format!("HTTP_{}", status.as_u16()), text),
        };
        Err(RpcError::Fault {
            status: status.as_u16(),
            code,
            message,
        })
    }

    /// Parse a successful `{ "data": T }` response body.
    async fn parse_data<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RpcError> {
        let response = Self::ensure_success(response).await?;
        let envelope = response.json::<DataResponse<T>>().await?;
        Ok(envelope.data)
    }
}
