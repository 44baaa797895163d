use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use tessera_core::admission::AllowedNetworks;
use tessera_core::config::{env_or, env_parse, env_string, ConfigError};

/// Networks admitted when `TESSERA_SECURE_NETS` is unset: loopback plus the
/// RFC 1918 private ranges.
const DEFAULT_SECURE_NETS: &str = "127.0.0.0/8, 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16";

/// Render server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address advertised to clients; the wildcard address means "resolve
    /// the local address at startup". The listener always binds the wildcard.
    pub advertised_addr: IpAddr,
    pub port: u16,
    /// Broadcast destination for discovery datagrams; `None` disables
    /// broadcasting (static peers are still notified).
    pub broadcast_addr: Option<String>,
    pub broadcast_interval: Duration,
    /// UDP port clients listen on for discovery datagrams.
    pub client_port: u16,
    /// Raw static peer map, e.g. `render-01:192.168.1.5,render-02`.
    pub static_map: String,
    pub secure_nets: AllowedNetworks,
    /// Chunk size for `get` and write buffer size for uploads.
    pub buffer_size: usize,
    /// Upper bound on a single `put` body.
    pub max_chunk_bytes: usize,
    pub render_path: PathBuf,
    pub scratch_dir: PathBuf,
    pub session_idle_timeout: Duration,
    pub render_command: PathBuf,
    pub render_width: u32,
    pub render_height: u32,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default                     |
    /// |-----------------------------------|-----------------------------|
    /// | `TESSERA_SERVER_ADDR`             | `0.0.0.0`                   |
    /// | `TESSERA_SERVER_PORT`             | `8080`                      |
    /// | `TESSERA_BROADCAST_ADDR`          | `255.255.255.255`           |
    /// | `TESSERA_BROADCAST_INTERVAL_SECS` | `10`                        |
    /// | `TESSERA_CLIENT_PORT`             | `8082`                      |
    /// | `TESSERA_STATIC_MAP`              | (empty)                     |
    /// | `TESSERA_SECURE_NETS`             | loopback + private ranges   |
    /// | `TESSERA_BUFFER_SIZE`             | `65536`                     |
    /// | `TESSERA_MAX_CHUNK_BYTES`         | `16777216`                  |
    /// | `TESSERA_RENDER_PATH`             | `$TMPDIR/tessera/renders`   |
    /// | `TESSERA_SCRATCH_DIR`             | `$TMPDIR/tessera/uploads`   |
    /// | `TESSERA_SESSION_IDLE_SECS`       | `300`                       |
    /// | `TESSERA_RENDER_COMMAND`          | `blender`                   |
    /// | `TESSERA_RENDER_WIDTH`            | `1920`                      |
    /// | `TESSERA_RENDER_HEIGHT`           | `1080`                      |
    ///
    /// Malformed entries in `TESSERA_SECURE_NETS` are skipped with a warning.
    pub fn from_env() -> Result<Self, ConfigError> {
        let advertised_addr = env_parse("TESSERA_SERVER_ADDR", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?;
        let port = env_parse("TESSERA_SERVER_PORT", 8080u16)?;

        let broadcast_addr = match env_string("TESSERA_BROADCAST_ADDR") {
            None => Some("255.255.255.255".to_string()),
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(raw.trim().to_string()),
        };
        let broadcast_interval =
            Duration::from_secs(env_parse("TESSERA_BROADCAST_INTERVAL_SECS", 10u64)?.max(1));
        let client_port = env_parse("TESSERA_CLIENT_PORT", 8082u16)?;
        let static_map = env_or("TESSERA_STATIC_MAP", "");

        let (secure_nets, rejected) =
            AllowedNetworks::parse(&env_or("TESSERA_SECURE_NETS", DEFAULT_SECURE_NETS));
        for err in rejected {
            tracing::warn!(error = %err, "Ignoring malformed TESSERA_SECURE_NETS entry");
        }

        let buffer_size = env_parse("TESSERA_BUFFER_SIZE", 65_536usize)?.max(1);
        let max_chunk_bytes = env_parse("TESSERA_MAX_CHUNK_BYTES", 16 * 1024 * 1024usize)?;

        let base = std::env::temp_dir().join("tessera");
        let render_path = env_string("TESSERA_RENDER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join("renders"));
        let scratch_dir = env_string("TESSERA_SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join("uploads"));

        let session_idle_timeout =
            Duration::from_secs(env_parse("TESSERA_SESSION_IDLE_SECS", 300u64)?);
        let render_command = PathBuf::from(env_or("TESSERA_RENDER_COMMAND", "blender"));
        let render_width = env_parse("TESSERA_RENDER_WIDTH", 1920u32)?;
        let render_height = env_parse("TESSERA_RENDER_HEIGHT", 1080u32)?;

        Ok(Self {
            advertised_addr,
            port,
            broadcast_addr,
            broadcast_interval,
            client_port,
            static_map,
            secure_nets,
            buffer_size,
            max_chunk_bytes,
            render_path,
            scratch_dir,
            session_idle_timeout,
            render_command,
            render_width,
            render_height,
        })
    }
}
