//! Benchmark configuration.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::frame::{LENGTH_PREFIX, MIN_BODY_SIZE};

/// Smallest accepted `--size`.
pub const MIN_PAYLOAD_SIZE: usize = 16;

/// Upper bound on frames coalesced into one write.
pub const MAX_SEND_BATCH: usize = 32;

/// The only transport this build can drive.
pub const SUPPORTED_TRANSPORT: &str = "tcp";

/// Benchmark scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scenario {
    /// Single-connection correctness smoke test.
    #[default]
    S0,
    /// Connection scale only.
    S1,
    /// Connection scale plus traffic.
    S2,
}

impl Scenario {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Scenario::S0 => "s0",
            Scenario::S1 => "s1",
            Scenario::S2 => "s2",
        }
    }

    /// Whether the scenario drives request/reply traffic after connecting.
    #[must_use]
    pub const fn with_traffic(&self) -> bool {
        matches!(self, Scenario::S2)
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "s0" => Ok(Scenario::S0),
            "s1" => Ok(Scenario::S1),
            "s2" => Ok(Scenario::S2),
            other => Err(Error::InvalidConfig(format!("unknown scenario '{other}'"))),
        }
    }
}

/// Framing applied on top of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Framing {
    /// Raw byte stream; frames are delimited by their length prefix.
    #[default]
    Stream,
    /// Two-part messages (routing id, payload) with lifecycle markers.
    Message,
}

impl Framing {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Framing::Stream => "stream",
            Framing::Message => "message",
        }
    }
}

impl std::fmt::Display for Framing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framing {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stream" => Ok(Framing::Stream),
            "message" => Ok(Framing::Message),
            other => Err(Error::InvalidConfig(format!("unknown framing '{other}'"))),
        }
    }
}

/// Socket-level tuning applied to every accepted and connected socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOptions {
    /// Listen backlog.
    ///
    /// Default: 32768
    pub backlog: u32,

    /// `SO_SNDBUF` in bytes, 0 leaves the system default.
    ///
    /// Default: 256 KiB
    pub sndbuf: u32,

    /// `SO_RCVBUF` in bytes, 0 leaves the system default.
    ///
    /// Default: 256 KiB
    pub rcvbuf: u32,

    /// Disable Nagle.
    ///
    /// Default: true
    pub no_delay: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            backlog: 32768,
            sndbuf: 256 * 1024,
            rcvbuf: 256 * 1024,
            no_delay: true,
        }
    }
}

/// Full benchmark configuration.
///
/// Build with the `with_*` methods and call [`normalize`](Self::normalize)
/// before use; the runner does this itself.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub scenario: Scenario,
    pub transport: String,
    pub framing: Framing,
    pub role: Role,
    pub bind_host: String,
    pub port: u16,

    /// Target number of concurrent connections.
    ///
    /// Default: 10000
    pub ccu: usize,

    /// Requested frame body size in bytes.
    ///
    /// Default: 1024
    pub size: usize,

    /// Per-connection outstanding request window.
    ///
    /// Default: 30
    pub inflight: usize,

    pub warmup: Duration,
    pub measure: Duration,
    pub drain_timeout: Duration,
    pub connect_concurrency: usize,
    pub connect_timeout: Duration,
    pub socket: SocketOptions,

    /// Runtime worker threads.
    pub io_threads: usize,

    /// Traffic worker tasks; connections are split round-robin across them.
    pub shards: usize,

    /// Maximum frames coalesced into one write.
    pub send_batch: usize,

    /// 1 samples every measured completion, N every Nth, 0 disables.
    pub latency_sample_rate: u32,

    pub scenario_id: Option<String>,
    pub metrics_csv: Option<PathBuf>,
    pub summary_json: Option<PathBuf>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            scenario: Scenario::S0,
            transport: SUPPORTED_TRANSPORT.to_string(),
            framing: Framing::Stream,
            role: Role::Both,
            bind_host: "127.0.0.1".to_string(),
            port: 27110,
            ccu: 10000,
            size: 1024,
            inflight: 30,
            warmup: Duration::from_secs(3),
            measure: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(10),
            connect_concurrency: 256,
            connect_timeout: Duration::from_secs(10),
            socket: SocketOptions::default(),
            io_threads: 1,
            shards: 1,
            send_batch: MAX_SEND_BATCH,
            latency_sample_rate: 1,
            scenario_id: None,
            metrics_csv: None,
            summary_json: None,
        }
    }
}

impl BenchConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenario = scenario;
        self
    }

    #[must_use]
    pub const fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    #[must_use]
    pub const fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.bind_host = host.into();
        self.port = port;
        self
    }

    #[must_use]
    pub const fn with_ccu(mut self, ccu: usize) -> Self {
        self.ccu = ccu;
        self
    }

    #[must_use]
    pub const fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub const fn with_inflight(mut self, inflight: usize) -> Self {
        self.inflight = inflight;
        self
    }

    /// Set warm-up, measured and drain durations in one go.
    #[must_use]
    pub const fn with_phases(
        mut self,
        warmup: Duration,
        measure: Duration,
        drain: Duration,
    ) -> Self {
        self.warmup = warmup;
        self.measure = measure;
        self.drain_timeout = drain;
        self
    }

    #[must_use]
    pub const fn with_connect(mut self, concurrency: usize, timeout: Duration) -> Self {
        self.connect_concurrency = concurrency;
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    #[must_use]
    pub const fn with_latency_sample_rate(mut self, rate: u32) -> Self {
        self.latency_sample_rate = rate;
        self
    }

    /// Apply the lower bounds every run relies on.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        self.ccu = self.ccu.max(1);
        self.size = self.size.max(MIN_PAYLOAD_SIZE);
        self.inflight = self.inflight.max(1);
        self.connect_concurrency = self.connect_concurrency.max(1);
        self.connect_timeout = self.connect_timeout.max(Duration::from_secs(1));
        self.drain_timeout = self.drain_timeout.max(Duration::from_secs(1));
        if self.measure.is_zero() {
            self.measure = Duration::from_secs(1);
        }
        self.io_threads = self.io_threads.max(1);
        self.shards = self.shards.max(1);
        self.send_batch = self.send_batch.clamp(1, MAX_SEND_BATCH);
        self
    }

    /// Effective application body size: header needs 9 bytes.
    #[must_use]
    pub fn body_size(&self) -> usize {
        self.size.max(MIN_BODY_SIZE)
    }

    /// Bytes one frame occupies on the wire, length prefix included.
    #[must_use]
    pub fn packet_size(&self) -> usize {
        LENGTH_PREFIX + self.body_size()
    }

    /// Frames per batch, never more than the window.
    #[must_use]
    pub fn max_batch(&self) -> usize {
        self.send_batch.clamp(1, MAX_SEND_BATCH).min(self.inflight.max(1))
    }

    /// Identifier written into result rows.
    #[must_use]
    pub fn scenario_id(&self) -> &str {
        self.scenario_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(self.scenario.as_str())
    }

    #[must_use]
    pub fn is_supported_transport(&self) -> bool {
        self.transport == SUPPORTED_TRANSPORT
    }

    /// Resolve `bind_host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolve`] if the host does not resolve.
    pub fn endpoint(&self) -> Result<SocketAddr> {
        let target = format!("{}:{}", self.bind_host, self.port);
        target
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(Error::Resolve(target))
    }

    /// Reject combinations the runner cannot execute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.scenario == Scenario::S0 && self.role != Role::Both {
            return Err(Error::InvalidConfig(
                "scenario s0 requires role 'both'".into(),
            ));
        }
        if self.bind_host.is_empty() {
            return Err(Error::InvalidConfig("bind host is empty".into()));
        }
        if self.body_size() > u32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "size {} does not fit the length prefix",
                self.size
            )));
        }
        Ok(())
    }
}
