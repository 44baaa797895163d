use std::net::IpAddr;

/// Error kinds shared by the render server and the render client.
///
/// The variants map onto the failure classes of the farm protocol:
/// transport and remote faults are recoverable by handing the job to
/// another worker, resource and state errors are reported to the caller
/// and never retried.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Network-level failure talking to an endpoint.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote service answered with an RPC fault.
    #[error("Remote fault ({code}): {message}")]
    RemoteFault { code: String, message: String },

    /// A local file or handle could not be created or used.
    #[error("Resource error: {0}")]
    Resource(String),

    /// Protocol misuse, e.g. `get` after the download was closed.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The caller's source address is outside the allowed networks.
    #[error("Admission denied for {0}")]
    AdmissionDenied(IpAddr),

    /// The external render capability failed.
    #[error("Render error: {0}")]
    Render(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl CoreError {
    /// Wrap an I/O error as a [`CoreError::Resource`] with some context.
    pub fn resource(context: &str, err: std::io::Error) -> Self {
        Self::Resource(format!("{context}: {err}"))
    }
}
