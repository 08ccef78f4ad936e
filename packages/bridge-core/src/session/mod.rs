//! The session mediator: owns one call's audio contract, AOAI link, and
//! all per-call mutable state. One [`Session`] exists per ACS media
//! WebSocket connection; there is no state shared across sessions.

pub mod ingress;
pub mod protocol;
pub mod pump;

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::aoai::AoaiClient;
use crate::config::Config;
use crate::grounding::GroundingAgent;
use crate::resample::ResamplerState;

pub use protocol::{AcsIncoming, AcsOutgoing, AudioContract};

/// Monotonic milliseconds since process start, used for all of the
/// timestamp comparisons in barge-in and fallback-timer logic. Backed by
/// `Instant` rather than wall-clock time so it is immune to clock skew.
pub fn now_ms() -> i64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    let start = *START.get_or_init(std::time::Instant::now);
    start.elapsed().as_millis() as i64
}

/// Shared handle to the (possibly absent) AOAI connection. The session
/// mediator's ingress/egress paths and the AOAI supervisor all share this
/// handle; only the supervisor ever replaces the client inside it.
pub struct AoaiLink {
    pub client: Mutex<Option<AoaiClient>>,
    ready: Notify,
    is_ready: AtomicBool,
}

impl AoaiLink {
    pub fn new() -> Self {
        Self {
            client: Mutex::new(None),
            ready: Notify::new(),
            is_ready: AtomicBool::new(false),
        }
    }

    pub fn mark_ready(&self) {
        self.is_ready.store(true, Ordering::SeqCst);
        self.ready.notify_waiters();
    }

    pub fn mark_not_ready(&self) {
        self.is_ready.store(false, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }
}

impl Default for AoaiLink {
    fn default() -> Self {
        Self::new()
    }
}

/// All per-call mutable state that isn't a single atomic value.
pub struct SessionBuffers {
    pub audio: Option<AudioContract>,
    pub acs_to_aoai_resampler: Option<ResamplerState>,
    pub aoai_to_acs_resampler: Option<ResamplerState>,
    pub out_buf: Vec<u8>,
    pub transcript: String,
}

impl Default for SessionBuffers {
    fn default() -> Self {
        Self {
            audio: None,
            acs_to_aoai_resampler: None,
            aoai_to_acs_resampler: None,
            out_buf: Vec::new(),
            transcript: String::new(),
        }
    }
}

/// One ACS call's entire mediator state.
pub struct Session {
    pub call_connection_id: String,
    pub correlation_id: String,
    pub config: Arc<Config>,
    pub grounding: Option<Arc<dyn GroundingAgent>>,
    pub aoai: Arc<AoaiLink>,
    pub acs_sink: mpsc::UnboundedSender<AcsOutgoing>,
    pub buffers: Mutex<SessionBuffers>,
    pub bytes_in: AtomicU64,
    pub last_stat_emit_ms: AtomicI64,
    pub aoai_inflight: AtomicBool,
    pub agent_inflight: AtomicBool,
    pub drop_aoai_audio_until_ms: AtomicI64,
    pub closed: CancellationToken,
    pub fallback_timer: Mutex<Option<tokio::task::JoinHandle<()>>>,
    pub supervisor_started: AtomicBool,
}

impl Session {
    pub fn new(
        call_connection_id: String,
        correlation_id: String,
        config: Arc<Config>,
        grounding: Option<Arc<dyn GroundingAgent>>,
        acs_sink: mpsc::UnboundedSender<AcsOutgoing>,
        parent_shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            call_connection_id,
            correlation_id,
            config,
            grounding,
            aoai: Arc::new(AoaiLink::new()),
            acs_sink,
            buffers: Mutex::new(SessionBuffers::default()),
            bytes_in: AtomicU64::new(0),
            last_stat_emit_ms: AtomicI64::new(0),
            aoai_inflight: AtomicBool::new(false),
            agent_inflight: AtomicBool::new(false),
            drop_aoai_audio_until_ms: AtomicI64::new(0),
            closed: parent_shutdown.child_token(),
            fallback_timer: Mutex::new(None),
            supervisor_started: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Cancels any pending fallback-response timer. Called whenever the
    /// condition it was guarding against (a transcription arriving, a new
    /// response starting) is satisfied by some other path.
    pub async fn cancel_fallback_timer(&self) {
        if let Some(handle) = self.fallback_timer.lock().await.take() {
            handle.abort();
        }
    }

    pub fn is_barge_in_gate_open(&self) -> bool {
        now_ms() >= self.drop_aoai_audio_until_ms.load(Ordering::SeqCst)
    }
}
