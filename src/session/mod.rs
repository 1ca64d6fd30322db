//! Session lifecycle and mode dispatch
//!
//! A [`Session`] owns the transport, the queues, the network loop thread and
//! the audio driver. It moves through `Idle -> Ready -> Running -> Idle`:
//! [`Session::init`] opens resources for the configured [`Mode`],
//! [`Session::start`] spawns the loop and starts audio, [`Session::stop`]
//! tears everything down.

mod engine;
pub mod pacer;
pub mod stats;

pub use pacer::{Pacer, PacingStrategy};
pub use stats::{LatencyReport, SessionStats};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::{AudioDriver, CaptureCallback, CpalDriver, FrameQueues, PlaybackCallback};
use crate::codec::{FrameDecoder, FrameEncoder, OpusDecoder, OpusEncoder};
use crate::config::{Mode, SessionConfig};
use crate::constants::DEFAULT_CHANNELS;
use crate::dsp::{VoicePreprocessor, VoiceProcessor};
use crate::error::{Result, SessionError};
use crate::network::UdpTransport;
use crate::protocol::PacketCodec;
use engine::{Link, NetworkLoop};
use stats::{Counters, LatencyStats};

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Ready,
    Running,
}

/// State shared by the callbacks, the network loop and the reporter
pub(crate) struct SessionShared {
    pub(crate) running: AtomicBool,
    pub(crate) queues: FrameQueues,
    pub(crate) counters: Counters,
    pub(crate) latency: LatencyStats,
    pub(crate) peer_count: AtomicUsize,
}

impl SessionShared {
    pub(crate) fn new(outbound_capacity: usize, inbound_capacity: usize) -> Self {
        Self {
            running: AtomicBool::new(false),
            queues: FrameQueues::new(outbound_capacity, inbound_capacity),
            counters: Counters::default(),
            latency: LatencyStats::default(),
            peer_count: AtomicUsize::new(0),
        }
    }
}

/// Audio and codec components handed to [`Session::init`]
///
/// Client and local-echo sessions need a driver, an encoder and a decoder.
/// The relay needs none of them.
#[derive(Default)]
pub struct Backend {
    driver: Option<Box<dyn AudioDriver>>,
    encoder: Option<Box<dyn FrameEncoder>>,
    decoder: Option<Box<dyn FrameDecoder>>,
    preprocessor: Option<Box<dyn VoicePreprocessor>>,
}

impl Backend {
    /// Empty backend, enough for a relay
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_driver(mut self, driver: impl AudioDriver + 'static) -> Self {
        self.driver = Some(Box::new(driver));
        self
    }

    pub fn with_codec(
        mut self,
        encoder: impl FrameEncoder + 'static,
        decoder: impl FrameDecoder + 'static,
    ) -> Self {
        self.encoder = Some(Box::new(encoder));
        self.decoder = Some(Box::new(decoder));
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: impl VoicePreprocessor + 'static) -> Self {
        self.preprocessor = Some(Box::new(preprocessor));
        self
    }

    /// Default cpal devices and Opus, as the mode requires
    pub fn system(config: &SessionConfig) -> Result<Self> {
        if config.mode == Mode::Server {
            return Ok(Self::new());
        }

        let driver = CpalDriver::open(config.sample_rate, config.frame_size, true, true)?;
        let encoder = OpusEncoder::new(
            config.opus.clone(),
            config.sample_rate,
            DEFAULT_CHANNELS,
            config.frame_size,
        )?;
        let decoder = OpusDecoder::new(config.sample_rate, DEFAULT_CHANNELS, config.frame_size)?;

        let backend = Self::new().with_driver(driver).with_codec(encoder, decoder);
        if config.voice_processing {
            Ok(backend.with_preprocessor(VoiceProcessor::with_mode(config.processing_mode)))
        } else {
            Ok(backend)
        }
    }
}

/// One voice session in a single mode
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    shared: Arc<SessionShared>,
    local_addr: Option<SocketAddr>,

    // Held between init and start
    network: Option<NetworkLoop>,
    encoder: Option<Box<dyn FrameEncoder>>,
    preprocessor: Option<Box<dyn VoicePreprocessor>>,

    driver: Option<Box<dyn AudioDriver>>,
    network_thread: Option<JoinHandle<()>>,
    reporter_thread: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let shared = Arc::new(SessionShared::new(
            config.outbound_capacity,
            config.inbound_capacity,
        ));
        Self {
            config,
            state: SessionState::Idle,
            shared,
            local_addr: None,
            network: None,
            encoder: None,
            preprocessor: None,
            driver: None,
            network_thread: None,
            reporter_thread: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Bound socket address once initialized; `None` in local echo
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Acquire everything the mode needs. Nothing runs until [`Session::start`].
    ///
    /// Fails without side effects if the session is not idle, the
    /// configuration is invalid, the backend lacks a component the mode
    /// needs, or the socket cannot be bound.
    pub fn init(&mut self, backend: Backend) -> Result<()> {
        self.expect_state("init", SessionState::Idle)?;
        self.config.validate()?;

        let Backend {
            driver,
            encoder,
            decoder,
            preprocessor,
        } = backend;

        let needs_audio = self.config.mode != Mode::Server;
        if needs_audio && driver.is_none() {
            return Err(SessionError::MissingBackend("audio driver").into());
        }
        if needs_audio && (encoder.is_none() || decoder.is_none()) {
            return Err(SessionError::MissingBackend("codec").into());
        }

        let link = match self.config.mode {
            Mode::Server => Link::relay(
                UdpTransport::bind(self.config.bind_addr(), self.config.socket_buffer_bytes)?,
                self.config.peer_idle_timeout(),
            ),
            Mode::Client => Link::Client {
                transport: UdpTransport::connect(
                    self.config.bind_addr(),
                    self.config.peer_addr()?,
                    self.config.socket_buffer_bytes,
                )?,
            },
            Mode::LocalEcho => Link::Loopback,
        };

        self.shared = Arc::new(SessionShared::new(
            self.config.outbound_capacity,
            self.config.inbound_capacity,
        ));
        let network = NetworkLoop::new(
            link,
            PacketCodec::new(self.config.header_profile),
            if needs_audio { decoder } else { None },
            self.shared.clone(),
        );

        self.local_addr = network.local_addr();
        self.network = Some(network);
        if needs_audio {
            self.driver = driver;
            self.encoder = encoder;
            self.preprocessor = preprocessor;
        }
        self.state = SessionState::Ready;

        tracing::info!(
            mode = %self.config.mode,
            local_addr = ?self.local_addr,
            profile = ?self.config.header_profile,
            "Session initialized"
        );
        Ok(())
    }

    /// Spawn the network loop, start audio and, for clients, the latency
    /// reporter. On failure everything started so far is torn down and the
    /// session returns to idle.
    pub fn start(&mut self) -> Result<()> {
        self.expect_state("start", SessionState::Ready)?;

        let Some(network) = self.network.take() else {
            return Err(SessionError::InvalidState {
                op: "start",
                state: self.state,
            }
            .into());
        };

        self.shared.running.store(true, Ordering::Release);

        let pacer = Pacer::new(self.config.loop_period(), self.config.pacing);
        let spawned = thread::Builder::new()
            .name("network-loop".into())
            .spawn(move || network.run(pacer));
        match spawned {
            Ok(handle) => self.network_thread = Some(handle),
            Err(e) => {
                self.stop();
                return Err(SessionError::Spawn("network-loop", e.to_string()).into());
            }
        }

        if self.config.mode == Mode::Client {
            let shared = self.shared.clone();
            let period = self.config.stats_period();
            let spawned = thread::Builder::new()
                .name("latency-reporter".into())
                .spawn(move || stats::run_reporter(shared, period));
            match spawned {
                Ok(handle) => self.reporter_thread = Some(handle),
                Err(e) => {
                    self.stop();
                    return Err(SessionError::Spawn("latency-reporter", e.to_string()).into());
                }
            }
        }

        if let Some(driver) = self.driver.as_mut() {
            let capture = self.encoder.take().map(|encoder| {
                capture_callback(
                    self.shared.clone(),
                    encoder,
                    self.preprocessor.take(),
                    self.config.frame_size,
                )
            });
            let playback = playback_callback(self.shared.clone());

            if let Err(e) = driver.start(capture, Some(playback)) {
                self.stop();
                return Err(e.into());
            }
        }

        self.state = SessionState::Running;
        tracing::info!(mode = %self.config.mode, "Session started");
        Ok(())
    }

    /// Join the threads, stop audio and release every resource. Safe to
    /// call in any state, any number of times.
    ///
    /// The network loop is joined before the driver goes away, so a frame
    /// captured during shutdown is never sent.
    pub fn stop(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }

        self.shared.running.store(false, Ordering::Release);

        if let Some(handle) = self.network_thread.take() {
            if handle.join().is_err() {
                tracing::error!("Network loop thread panicked");
            }
        }
        if let Some(handle) = self.reporter_thread.take() {
            if handle.join().is_err() {
                tracing::error!("Latency reporter thread panicked");
            }
        }
        if let Some(mut driver) = self.driver.take() {
            driver.stop();
        }

        self.network = None;
        self.encoder = None;
        self.preprocessor = None;
        self.local_addr = None;
        self.shared.queues.clear();

        let was = self.state;
        self.state = SessionState::Idle;
        tracing::info!(mode = %self.config.mode, from = ?was, "Session stopped");
    }

    /// Counters and queue depths. Counters survive `stop` until the next
    /// `init`.
    pub fn stats(&self) -> SessionStats {
        SessionStats::collect(self.config.mode, self.state, &self.shared)
    }

    fn expect_state(&self, op: &'static str, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(SessionError::InvalidState {
                op,
                state: self.state,
            }
            .into());
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Preprocess, encode, queue. Runs on the audio thread.
fn capture_callback(
    shared: Arc<SessionShared>,
    mut encoder: Box<dyn FrameEncoder>,
    mut preprocessor: Option<Box<dyn VoicePreprocessor>>,
    frame_size: usize,
) -> CaptureCallback {
    let mut scratch: Vec<f32> = Vec::with_capacity(frame_size);

    Box::new(move |frame: &[f32]| {
        Counters::bump(&shared.counters.frames_captured);

        let pcm = match preprocessor.as_mut() {
            Some(preprocessor) => {
                scratch.clear();
                scratch.extend_from_slice(frame);
                preprocessor.process(&mut scratch);
                &scratch[..]
            }
            None => frame,
        };

        match encoder.encode(pcm) {
            Ok(packet) if !packet.is_empty() => {
                shared.queues.outbound.push(packet);
            }
            Ok(_) => {}
            Err(_) => Counters::bump(&shared.counters.encode_failures),
        }
    })
}

/// Fill the device buffer from the playback queue, silence-padded
fn playback_callback(shared: Arc<SessionShared>) -> PlaybackCallback {
    Box::new(move |out: &mut [f32]| {
        shared.queues.inbound.pop_into(out);
    })
}
