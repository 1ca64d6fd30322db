//! Session configuration
//!
//! Every field has a default, so an empty (or missing) TOML file yields the
//! stock low-latency setup: 48 kHz mono, 240-sample frames, 5 ms network
//! loop, port 12345.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::dsp::ProcessingMode;
use crate::error::{Error, NetworkError, Result};
use crate::protocol::HeaderProfile;
use crate::session::pacer::PacingStrategy;

/// Environment variable that overrides the config file location
pub const CONFIG_ENV_VAR: &str = "VOICE_RELAY_CONFIG";

/// Operating mode, fixed for the lifetime of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Capture looped back to playback through the queues, no socket
    LocalEcho,
    /// Relay only: no audio devices, forwards packets between peers
    Server,
    /// Capture and playback against a remote relay
    Client,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::LocalEcho => write!(f, "local-echo"),
            Mode::Server => write!(f, "server"),
            Mode::Client => write!(f, "client"),
        }
    }
}

/// Opus application preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpusApplication {
    Voip,
    Audio,
    LowDelay,
}

/// Opus encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpusConfig {
    pub application: OpusApplication,
    /// Bits per second
    pub bitrate: u32,
    pub vbr: bool,
    /// Constrained VBR, only meaningful with `vbr`
    pub cvbr: bool,
    /// In-band forward error correction
    pub fec: bool,
    /// Expected loss hint for FEC, 0-100
    pub packet_loss_perc: u8,
}

impl OpusConfig {
    /// Speech at minimal bitrate with constant frame sizes
    pub fn voice() -> Self {
        Self {
            application: OpusApplication::Voip,
            bitrate: DEFAULT_BITRATE,
            vbr: false,
            cvbr: false,
            fec: false,
            packet_loss_perc: 0,
        }
    }
}

impl Default for OpusConfig {
    fn default() -> Self {
        Self::voice()
    }
}

/// Configuration for one [`crate::Session`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: Mode,
    pub sample_rate: u32,
    /// Samples per block, fixed for the session lifetime
    pub frame_size: usize,
    /// Server bind port and client destination port
    pub port: u16,
    /// Local interface to bind
    pub bind_address: IpAddr,
    /// Relay host for client mode; `ip` or `ip:port`
    pub remote_address: Option<String>,
    pub header_profile: HeaderProfile,
    pub loop_period_us: u64,
    pub pacing: PacingStrategy,
    pub stats_period_ms: u64,
    pub outbound_capacity: usize,
    pub inbound_capacity: usize,
    pub socket_buffer_bytes: usize,
    /// Relay only: forget peers silent for this long. Unset keeps every
    /// peer for the life of the session.
    pub peer_idle_timeout_ms: Option<u64>,
    /// Run captured PCM through the voice processor before encoding
    pub voice_processing: bool,
    /// Noise suppression strength when `voice_processing` is on
    pub processing_mode: ProcessingMode,
    pub opus: OpusConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: Mode::LocalEcho,
            sample_rate: DEFAULT_SAMPLE_RATE,
            frame_size: DEFAULT_FRAME_SIZE,
            port: DEFAULT_UDP_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            remote_address: None,
            header_profile: HeaderProfile::Timestamped,
            loop_period_us: DEFAULT_LOOP_PERIOD_US,
            pacing: PacingStrategy::default(),
            stats_period_ms: DEFAULT_STATS_PERIOD_MS,
            outbound_capacity: OUTBOUND_QUEUE_CAPACITY,
            inbound_capacity: INBOUND_QUEUE_CAPACITY,
            socket_buffer_bytes: SOCKET_BUFFER_BYTES,
            peer_idle_timeout_ms: None,
            voice_processing: false,
            processing_mode: ProcessingMode::default(),
            opus: OpusConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn local_echo() -> Self {
        Self::default()
    }

    pub fn server() -> Self {
        Self {
            mode: Mode::Server,
            ..Self::default()
        }
    }

    pub fn client(remote: impl Into<String>) -> Self {
        Self {
            mode: Mode::Client,
            remote_address: Some(remote.into()),
            ..Self::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load from `$VOICE_RELAY_CONFIG` or the platform config directory,
    /// falling back to defaults when no file exists
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Where [`SessionConfig::load`] looks for the file
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }
        directories::ProjectDirs::from("", "", "voice-relay")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.frame_size == 0 {
            return Err(Error::Config("frame_size must be non-zero".into()));
        }
        if self.loop_period_us == 0 {
            return Err(Error::Config("loop_period_us must be non-zero".into()));
        }
        if self.stats_period_ms == 0 {
            return Err(Error::Config("stats_period_ms must be non-zero".into()));
        }
        if self.outbound_capacity == 0 || self.inbound_capacity == 0 {
            return Err(Error::Config("queue capacities must be non-zero".into()));
        }
        if self.mode == Mode::Client && self.remote_address.is_none() {
            return Err(crate::error::SessionError::MissingRemote.into());
        }
        Ok(())
    }

    /// Local address the transport binds: the configured port for the
    /// server, an ephemeral port for clients
    pub fn bind_addr(&self) -> SocketAddr {
        match self.mode {
            Mode::Server => SocketAddr::new(self.bind_address, self.port),
            _ => SocketAddr::new(self.bind_address, 0),
        }
    }

    /// Resolve the relay address for client mode
    pub fn peer_addr(&self) -> std::result::Result<SocketAddr, NetworkError> {
        let remote = self
            .remote_address
            .as_deref()
            .ok_or_else(|| NetworkError::InvalidAddress("no remote address".into()))?;

        if let Ok(ip) = remote.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }
        remote
            .parse::<SocketAddr>()
            .map_err(|_| NetworkError::InvalidAddress(remote.to_string()))
    }

    /// Loop period as a duration
    pub fn loop_period(&self) -> std::time::Duration {
        std::time::Duration::from_micros(self.loop_period_us)
    }

    /// Reporter period as a duration
    pub fn stats_period(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.stats_period_ms)
    }

    pub fn peer_idle_timeout(&self) -> Option<std::time::Duration> {
        self.peer_idle_timeout_ms.map(std::time::Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.mode, Mode::LocalEcho);
        assert_eq!(config.frame_size, 240);
        assert_eq!(config.port, 12345);
        assert_eq!(config.outbound_capacity, 3);
        assert_eq!(config.header_profile, HeaderProfile::Timestamped);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = SessionConfig::from_toml_str(
            r#"
            mode = "client"
            remote_address = "10.0.0.7"
            header_profile = "minimal"
            pacing = "spin"
            voice_processing = true
            processing_mode = "aggressive"

            [opus]
            bitrate = 24000
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, Mode::Client);
        assert_eq!(config.header_profile, HeaderProfile::Minimal);
        assert_eq!(config.pacing, PacingStrategy::Spin);
        assert_eq!(config.opus.bitrate, 24000);
        assert!(config.voice_processing);
        assert_eq!(config.processing_mode, ProcessingMode::Aggressive);
        assert_eq!(config.frame_size, DEFAULT_FRAME_SIZE);
        assert_eq!(config.peer_addr().unwrap(), "10.0.0.7:12345".parse().unwrap());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SessionConfig::client("192.168.1.100");
        let text = config.to_toml_string().unwrap();
        let parsed = SessionConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.mode, Mode::Client);
        assert_eq!(parsed.remote_address.as_deref(), Some("192.168.1.100"));
    }

    #[test]
    fn test_client_requires_remote() {
        let config = SessionConfig {
            mode: Mode::Client,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_peer_addr_forms() {
        let mut config = SessionConfig::client("127.0.0.1:4000");
        assert_eq!(config.peer_addr().unwrap().port(), 4000);

        config.remote_address = Some("not an address".into());
        assert!(config.peer_addr().is_err());
    }

    #[test]
    fn test_bind_addr_by_mode() {
        assert_eq!(SessionConfig::server().bind_addr().port(), 12345);
        assert_eq!(SessionConfig::client("1.2.3.4").bind_addr().port(), 0);
    }

    #[test]
    fn test_zero_frame_size_rejected() {
        let config = SessionConfig {
            frame_size: 0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
