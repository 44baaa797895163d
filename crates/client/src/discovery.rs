//! Listening for render server announcements.
//!
//! Servers periodically send their RPC URI as a UTF-8 datagram to the
//! client port. The client listens for a fixed window at startup and
//! collects the distinct URIs it heard.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;

/// Listen on `port` for `window` and return the announced server URIs in
/// order of first arrival.
pub async fn discover(port: u16, window: Duration) -> std::io::Result<Vec<String>> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await?;
    tracing::info!(port, window_secs = window.as_secs_f64(), "Listening for render servers");
    Ok(collect_announcements(&socket, window).await)
}

/// Collect announcements arriving on `socket` until `window` has passed.
pub async fn collect_announcements(socket: &UdpSocket, window: Duration) -> Vec<String> {
    let deadline = Instant::now() + window;
    let mut uris: Vec<String> = Vec::new();
    let mut buf = [0u8; 512];

    loop {
        match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Err(_) => break,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Discovery receive failed");
            }
            Ok(Ok((n, from))) => match parse_announcement(&buf[..n]) {
                Some(uri) if !uris.contains(&uri) => {
                    tracing::info!(uri = %uri, from = %from, "Discovered render server");
                    uris.push(uri);
                }
                Some(_) => {}
                None => tracing::debug!(from = %from, "Ignoring malformed announcement"),
            },
        }
    }

    uris
}

/// Accept a datagram only if it is a plain `http://` URI.
pub fn parse_announcement(payload: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(payload).ok()?.trim();
    let rest = text.strip_prefix("http://")?;
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return None;
    }
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announcement_must_be_http_uri() {
        assert_eq!(
            parse_announcement(b"http://192.168.1.5:8080\n"),
            Some("http://192.168.1.5:8080".to_string())
        );
        assert_eq!(parse_announcement(b"hello"), None);
        assert_eq!(parse_announcement(b"http://"), None);
        assert_eq!(parse_announcement(&[0xff, 0xfe]), None);
    }

    #[tokio::test]
    async fn duplicates_are_collapsed() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        for payload in ["http://10.0.0.1:8080", "junk", "http://10.0.0.2:8080", "http://10.0.0.1:8080"] {
            sender.send_to(payload.as_bytes(), addr).await.unwrap();
        }

        let uris = collect_announcements(&listener, Duration::from_millis(200)).await;
        assert_eq!(uris, vec!["http://10.0.0.1:8080", "http://10.0.0.2:8080"]);
    }
}
