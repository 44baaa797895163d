//! Server identity and periodic discovery announcements.
//!
//! A server advertises its RPC URI as a plain UTF-8 datagram
//! (`http://ip:port`) to the broadcast address and to every statically
//! mapped peer. Clients listening on the client port collect these URIs.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket as StdUdpSocket};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Public address used only to pick the outbound interface; nothing is sent.
const ROUTE_PROBE: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 80);

/// The address and port clients should use to reach this server, plus the
/// static peers that are told about it directly.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    address: IpAddr,
    port: u16,
    static_peers: BTreeMap<String, String>,
}

impl ServerIdentity {
    pub fn new(address: IpAddr, port: u16, static_map: &str) -> Self {
        let static_peers = parse_static_map(static_map, address, port);
        Self {
            address,
            port,
            static_peers,
        }
    }

    /// Like [`ServerIdentity::new`], resolving a wildcard address with
    /// [`resolve_local_address`] first.
    pub fn resolve(address: IpAddr, port: u16, static_map: &str) -> Self {
        let address = if address.is_unspecified() {
            resolve_local_address()
        } else {
            address
        };
        Self::new(address, port, static_map)
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn uri(&self) -> String {
        format!("http://{}", SocketAddr::new(self.address, self.port))
    }

    /// Client host to server URI.
    pub fn static_peers(&self) -> &BTreeMap<String, String> {
        &self.static_peers
    }
}

/// Parse a static peer map such as `render-01:192.168.1.5,render-02`.
///
/// Each entry names a client host, optionally followed by the server IP that
/// host should use; without one, `default_ip` is used. Blank and malformed
/// entries are skipped.
pub fn parse_static_map(spec: &str, default_ip: IpAddr, port: u16) -> BTreeMap<String, String> {
    let mut peers = BTreeMap::new();

    for entry in spec.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
        let (host, ip) = match parts.as_slice() {
            [host] => (*host, default_ip.to_string()),
            [host, ip] => (*host, ip.to_string()),
            _ => {
                tracing::warn!(entry, "Skipping malformed static map entry");
                continue;
            }
        };
        if host.is_empty() || ip.is_empty() {
            tracing::warn!(entry, "Skipping malformed static map entry");
            continue;
        }
        peers.insert(host.to_string(), format!("http://{ip}:{port}"));
    }

    peers
}

/// A concrete address for this machine.
///
/// The local hostname is resolved first and its first non-loopback address
/// is used. Hosts whose name maps only to loopback (common in `/etc/hosts`)
/// fall back to the address of the interface that routes to the outside
/// world, and finally to loopback.
pub fn resolve_local_address() -> IpAddr {
    if let Some(ip) = hostname_address() {
        return ip;
    }

    let probe = || -> std::io::Result<IpAddr> {
        let socket = StdUdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(ROUTE_PROBE)?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot resolve local address, using loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

fn hostname_address() -> Option<IpAddr> {
    let host = hostname::get().ok()?.into_string().ok()?;
    let addrs = match (host.as_str(), 0).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            tracing::debug!(host, error = %e, "Hostname does not resolve");
            return None;
        }
    };
    usable_address(addrs.map(|a| a.ip()))
}

/// First IPv4 address that is neither loopback nor unspecified, else the
/// first such IPv6 address.
fn usable_address(addrs: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let candidates: Vec<IpAddr> = addrs
        .into_iter()
        .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
        .collect();
    candidates
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
}

/// Periodically announces the server URI over UDP.
pub struct Broadcaster {
    identity: Arc<ServerIdentity>,
    broadcast_addr: Option<String>,
    client_port: u16,
    interval: Duration,
}

impl Broadcaster {
    pub fn new(
        identity: Arc<ServerIdentity>,
        broadcast_addr: Option<String>,
        client_port: u16,
        interval: Duration,
    ) -> Self {
        Self {
            identity,
            broadcast_addr: broadcast_addr.filter(|a| !a.trim().is_empty()),
            client_port,
            interval,
        }
    }

    /// Bind a broadcast-capable socket on an ephemeral port.
    pub async fn bind_socket() -> std::io::Result<UdpSocket> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        Ok(socket)
    }

    /// Send one round of announcements. Returns how many datagrams went out;
    /// failed sends are logged and skipped.
    pub async fn announce_once(&self, socket: &UdpSocket) -> usize {
        let mut sent = 0;

        if let Some(addr) = &self.broadcast_addr {
            let uri = self.identity.uri();
            match socket.send_to(uri.as_bytes(), (addr.as_str(), self.client_port)).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    tracing::warn!(broadcast_addr = %addr, error = %e, "Broadcast announcement failed")
                }
            }
        }

        for (host, uri) in self.identity.static_peers() {
            match socket.send_to(uri.as_bytes(), (host.as_str(), self.client_port)).await {
                Ok(_) => sent += 1,
                Err(e) => tracing::warn!(peer = %host, error = %e, "Static peer announcement failed"),
            }
        }

        sent
    }

    /// Announce every interval until `cancel` is triggered.
    pub async fn run(self, cancel: CancellationToken) {
        let socket = match Self::bind_socket().await {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!(error = %e, "Cannot open discovery socket, announcements disabled");
                return;
            }
        };

        tracing::info!(
            uri = %self.identity.uri(),
            client_port = self.client_port,
            interval_secs = self.interval.as_secs(),
            static_peers = self.identity.static_peers().len(),
            "Discovery broadcaster started"
        );

        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Discovery broadcaster stopping");
                    break;
                }
                _ = interval.tick() => {
                    let sent = self.announce_once(&socket).await;
                    tracing::debug!(sent, "Discovery announcements sent");
                }
            }
        }
    }

    /// Spawn [`Broadcaster::run`] as a background task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
