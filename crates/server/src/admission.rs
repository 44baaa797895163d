//! Connection-level source-address admission.
//!
//! [`AdmissionListener`] wraps the TCP listener handed to `axum::serve` and
//! drops connections from outside the allowed networks before any request
//! is read. This is a reachability filter, not authentication.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::serve::Listener;
use tessera_core::admission::{allowed, AllowedNetworks};
use tessera_core::error::CoreError;
use tokio::net::{TcpListener, TcpStream};

/// Back-off after an accept error such as descriptor exhaustion.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct AdmissionListener {
    inner: TcpListener,
    self_addr: IpAddr,
    networks: Arc<AllowedNetworks>,
}

impl AdmissionListener {
    /// `self_addr` is the server's own reachable address; connections from
    /// it are always admitted.
    pub fn new(inner: TcpListener, self_addr: IpAddr, networks: Arc<AllowedNetworks>) -> Self {
        Self {
            inner,
            self_addr,
            networks,
        }
    }

    /// Fails with [`CoreError::AdmissionDenied`] for peers outside the
    /// allowed networks.
    pub fn admit(&self, peer: IpAddr) -> Result<(), CoreError> {
        if allowed(self.self_addr, peer, &self.networks) {
            Ok(())
        } else {
            Err(CoreError::AdmissionDenied(peer))
        }
    }
}

impl Listener for AdmissionListener {
    type Io = TcpStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok((stream, peer)) => match self.admit(peer.ip()) {
                    Ok(()) => return (stream, peer),
                    Err(e) => {
                        tracing::warn!(peer = %peer, error = %e, "Rejected connection");
                        drop(stream);
                    }
                },
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}
