//! Voice engine
//!
//! Owns the capture pipeline, the peer table and the inbound queue, and
//! exposes the two entry points the audio callbacks drive:
//! [`VoiceEngine::process_capture`] and [`VoiceEngine::process_playback`].
//! Settings live in atomics so any thread can change them without
//! touching the audio locks.

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::audio::buffer::PacketQueue;
use crate::audio::capture::{CaptureControls, CapturePipeline};
use crate::audio::vad::VoiceActivityDetector;
use crate::codec::{opus_decoder_factory, DecoderFactory, FrameEncoder, OpusEncoder};
use crate::config::EngineConfig;
use crate::constants::{MAX_MASTER_VOLUME, MAX_MIC_GAIN};
use crate::error::{ProtocolError, Result};
use crate::mixer::soft_saturate;
use crate::peer::{ConcealPolicy, PeerStatus, PeerTable};
use crate::protocol::{ControlMessage, InboundPacket, PeerId, Pose, Vec3};
use crate::spatial::{geometry::MIN_ROLLOFF, SpatialParams};

/// Receives every serialized outgoing packet
pub type PacketSink = Arc<dyn Fn(Bytes) + Send + Sync>;

/// f32 stored as its bit pattern
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Runtime-tunable settings
struct Settings {
    mic_gain: AtomicF32,
    vad_threshold: AtomicF32,
    hold_time_ms: AtomicF32,
    push_to_talk: AtomicBool,
    ptt_active: AtomicBool,
    muted: AtomicBool,
    master_volume: AtomicF32,
    spatial_enabled: AtomicBool,
    reverb_enabled: AtomicBool,
    reverb_mix: AtomicF32,
    doppler_enabled: AtomicBool,
    inner_radius: AtomicF32,
    outer_radius: AtomicF32,
    rolloff: AtomicF32,
}

impl Settings {
    fn from_config(config: &EngineConfig) -> Self {
        let capture = &config.capture;
        let spatial = &config.spatial;
        Self {
            mic_gain: AtomicF32::new(capture.mic_gain),
            vad_threshold: AtomicF32::new(capture.vad_threshold),
            hold_time_ms: AtomicF32::new(capture.hold_time_ms),
            push_to_talk: AtomicBool::new(capture.push_to_talk),
            ptt_active: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            master_volume: AtomicF32::new(spatial.master_volume),
            spatial_enabled: AtomicBool::new(spatial.enabled),
            reverb_enabled: AtomicBool::new(spatial.reverb_enabled),
            reverb_mix: AtomicF32::new(spatial.reverb_mix),
            doppler_enabled: AtomicBool::new(spatial.doppler_enabled),
            inner_radius: AtomicF32::new(spatial.inner_radius),
            outer_radius: AtomicF32::new(spatial.outer_radius),
            rolloff: AtomicF32::new(spatial.rolloff.max(MIN_ROLLOFF)),
        }
    }

    fn capture_controls(&self) -> CaptureControls {
        CaptureControls {
            mic_gain: self.mic_gain.load(),
            muted: self.muted.load(Ordering::Relaxed),
            push_to_talk: self.push_to_talk.load(Ordering::Relaxed),
            ptt_active: self.ptt_active.load(Ordering::Relaxed),
            vad_threshold: self.vad_threshold.load(),
            hold_time_ms: self.hold_time_ms.load(),
        }
    }

    fn spatial_params(&self, base: &SpatialParams) -> SpatialParams {
        SpatialParams {
            enabled: self.spatial_enabled.load(Ordering::Relaxed),
            inner_radius: self.inner_radius.load(),
            outer_radius: self.outer_radius.load(),
            rolloff: self.rolloff.load(),
            master_volume: self.master_volume.load(),
            reverb_enabled: self.reverb_enabled.load(Ordering::Relaxed),
            reverb_mix: self.reverb_mix.load(),
            doppler_enabled: self.doppler_enabled.load(Ordering::Relaxed),
            ..*base
        }
    }
}

#[derive(Default)]
struct Counters {
    packets_received: AtomicU64,
    packets_malformed: AtomicU64,
    blocks_rendered: AtomicU64,
}

/// Engine-wide statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStats {
    /// Inbound packets accepted into the queue
    pub packets_received: u64,
    /// Inbound byte buffers that failed to parse
    pub packets_malformed: u64,
    /// Inbound packets evicted because the queue was full
    pub packets_dropped: u64,
    pub frames_captured: u64,
    pub frames_encoded: u64,
    pub packets_emitted: u64,
    pub dtx_suppressed: u64,
    pub encode_errors: u64,
    pub blocks_rendered: u64,
    pub peers: usize,
    pub active_peers: usize,
}

/// Real-time voice core shared between capture, playback and control threads
pub struct VoiceEngine {
    settings: Settings,
    base_spatial: SpatialParams,
    policy: ConcealPolicy,
    running: AtomicBool,
    capture: Mutex<CapturePipeline>,
    peers: Mutex<PeerTable>,
    inbound: PacketQueue<InboundPacket>,
    listener: RwLock<Pose>,
    local_position: RwLock<Vec3>,
    sink: RwLock<Option<PacketSink>>,
    last_error: Mutex<Option<String>>,
    input_level: AtomicF32,
    speaking: AtomicBool,
    counters: Counters,
}

impl VoiceEngine {
    /// Build an engine backed by libopus
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let encoder = OpusEncoder::new(config.codec.clone())?;
        Self::with_codecs(config, Box::new(encoder), opus_decoder_factory())
    }

    /// Build an engine with caller-supplied codec implementations
    pub fn with_codecs(
        config: EngineConfig,
        encoder: Box<dyn FrameEncoder>,
        decoder_factory: DecoderFactory,
    ) -> Result<Self> {
        config.validate()?;

        let vad = VoiceActivityDetector::new(config.capture.vad_threshold, config.capture.hold_time_ms);
        let ring_capacity = config.playback.jitter_buffer_samples();

        Ok(Self {
            settings: Settings::from_config(&config),
            base_spatial: SpatialParams::from(&config.spatial),
            policy: ConcealPolicy::from(&config.playback),
            running: AtomicBool::new(false),
            capture: Mutex::new(CapturePipeline::new(encoder, vad)),
            peers: Mutex::new(PeerTable::new(decoder_factory, ring_capacity)),
            inbound: PacketQueue::new(config.playback.inbound_queue_capacity),
            listener: RwLock::new(Pose::default()),
            local_position: RwLock::new(Vec3::ZERO),
            sink: RwLock::new(None),
            last_error: Mutex::new(None),
            input_level: AtomicF32::new(0.0),
            speaking: AtomicBool::new(false),
            counters: Counters::default(),
        })
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            tracing::info!("Voice engine started");
        }
    }

    /// Stop processing; takes effect before this returns
    ///
    /// Waits for any capture or playback call already inside the engine.
    pub fn stop(&self) {
        let mut capture = self.capture.lock();
        let peers = self.peers.lock();
        self.running.store(false, Ordering::SeqCst);
        drop(peers);

        capture.reset();
        self.input_level.store(0.0);
        self.speaking.store(false, Ordering::Relaxed);
        drop(capture);
        tracing::info!("Voice engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Capture side
    // ------------------------------------------------------------------

    /// Install the callback that receives outgoing packets
    pub fn set_packet_sink<F>(&self, sink: F)
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        *self.sink.write() = Some(Arc::new(sink));
    }

    pub fn clear_packet_sink(&self) {
        *self.sink.write() = None;
    }

    /// Feed raw mono microphone samples (48 kHz, any block size)
    ///
    /// Returns the number of packets handed to the sink.
    pub fn process_capture(&self, samples: &[f32]) -> usize {
        if !self.is_running() {
            return 0;
        }

        let controls = self.settings.capture_controls();
        let position = *self.local_position.read();
        let sink = self.sink.read().clone();

        let mut capture = self.capture.lock();
        if !self.is_running() {
            return 0;
        }
        let emitted = capture.process(samples, &controls, position, &mut |packet| {
            if let Some(sink) = &sink {
                sink(packet);
            }
        });

        self.input_level.store(capture.input_level());
        self.speaking.store(capture.is_speaking(), Ordering::Relaxed);
        emitted
    }

    /// RMS of the last complete capture frame
    pub fn input_level(&self) -> f32 {
        self.input_level.load()
    }

    /// Whether the last complete capture frame was transmitted
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }

    pub fn set_local_position(&self, position: Vec3) {
        *self.local_position.write() = position;
    }

    pub fn local_position(&self) -> Vec3 {
        *self.local_position.read()
    }

    // ------------------------------------------------------------------
    // Inbound side
    // ------------------------------------------------------------------

    /// Queue a parsed inbound packet; never blocks
    pub fn feed_packet(&self, packet: InboundPacket) {
        self.counters.packets_received.fetch_add(1, Ordering::Relaxed);
        if self.inbound.push(packet) {
            tracing::debug!("Inbound queue full, dropped oldest packet");
        }
    }

    /// Parse and queue raw inbound bytes
    pub fn feed_bytes(&self, data: &[u8]) -> std::result::Result<(), ProtocolError> {
        match InboundPacket::decode(data) {
            Ok(packet) => {
                self.feed_packet(packet);
                Ok(())
            }
            Err(e) => {
                self.counters.packets_malformed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Dropping malformed packet: {}", e);
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Playback side
    // ------------------------------------------------------------------

    /// Fill `out` with the next interleaved stereo block
    pub fn process_playback(&self, out: &mut [f32]) {
        self.process_playback_at(out, Instant::now());
    }

    /// [`process_playback`](Self::process_playback) with an explicit clock
    pub fn process_playback_at(&self, out: &mut [f32], now: Instant) {
        out.fill(0.0);
        if !self.is_running() {
            return;
        }

        let listener = *self.listener.read();
        let params = self.settings.spatial_params(&self.base_spatial);

        let mut peers = self.peers.lock();
        if !self.is_running() {
            return;
        }
        while let Some(packet) = self.inbound.pop() {
            peers.receive(&packet, &listener, &params, now);
        }
        peers.render_into(out, &listener, &params, &self.policy, now);
        drop(peers);

        soft_saturate(out);
        self.counters.blocks_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_listener_pose(&self, pose: Pose) {
        *self.listener.write() = pose;
    }

    pub fn listener_pose(&self) -> Pose {
        *self.listener.read()
    }

    // ------------------------------------------------------------------
    // Peers and control messages
    // ------------------------------------------------------------------

    pub fn remove_peer(&self, id: PeerId) -> bool {
        self.peers.lock().remove(id)
    }

    pub fn peers(&self) -> Vec<PeerStatus> {
        self.peers.lock().statuses()
    }

    /// React to a control message from the room server
    pub fn handle_control(&self, message: &ControlMessage) {
        match message {
            ControlMessage::PeerLeft { steam_id } => match steam_id.parse::<PeerId>() {
                Ok(id) => {
                    self.remove_peer(id);
                }
                Err(e) => tracing::debug!("Ignoring peer_left: {}", e),
            },
            ControlMessage::Error { message } => {
                tracing::warn!("Server error: {}", message);
                self.record_error(message.clone());
            }
            other => tracing::debug!("Control message ignored by engine: {:?}", other),
        }
    }

    /// Parse a JSON control frame and handle it
    pub fn handle_control_json(&self, text: &str) -> std::result::Result<(), ProtocolError> {
        let message = ControlMessage::from_json(text)?;
        self.handle_control(&message);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Errors and stats
    // ------------------------------------------------------------------

    pub fn record_error(&self, message: impl Into<String>) {
        *self.last_error.lock() = Some(message.into());
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn clear_error(&self) {
        *self.last_error.lock() = None;
    }

    pub fn stats(&self) -> EngineStats {
        let capture = self.capture.lock().stats().clone();
        let (peers, active_peers) = {
            let table = self.peers.lock();
            (table.len(), table.active_count())
        };

        EngineStats {
            packets_received: self.counters.packets_received.load(Ordering::Relaxed),
            packets_malformed: self.counters.packets_malformed.load(Ordering::Relaxed),
            packets_dropped: self.inbound.dropped_count(),
            frames_captured: capture.frames_captured,
            frames_encoded: capture.frames_encoded,
            packets_emitted: capture.packets_emitted,
            dtx_suppressed: capture.dtx_suppressed,
            encode_errors: capture.encode_errors,
            blocks_rendered: self.counters.blocks_rendered.load(Ordering::Relaxed),
            peers,
            active_peers,
        }
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn set_mic_gain(&self, gain: f32) {
        self.settings.mic_gain.store(gain.clamp(0.0, MAX_MIC_GAIN));
    }

    pub fn mic_gain(&self) -> f32 {
        self.settings.mic_gain.load()
    }

    pub fn set_vad_threshold(&self, threshold: f32) {
        self.settings.vad_threshold.store(threshold.clamp(0.0, 1.0));
    }

    pub fn set_hold_time_ms(&self, hold_ms: f32) {
        self.settings.hold_time_ms.store(hold_ms.max(0.0));
    }

    pub fn set_push_to_talk(&self, enabled: bool) {
        self.settings.push_to_talk.store(enabled, Ordering::Relaxed);
    }

    /// Push-to-talk key state
    pub fn set_ptt_active(&self, active: bool) {
        self.settings.ptt_active.store(active, Ordering::Relaxed);
    }

    pub fn set_muted(&self, muted: bool) {
        self.settings.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.settings.muted.load(Ordering::Relaxed)
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.settings.master_volume.store(volume.clamp(0.0, MAX_MASTER_VOLUME));
    }

    pub fn master_volume(&self) -> f32 {
        self.settings.master_volume.load()
    }

    pub fn set_spatial_enabled(&self, enabled: bool) {
        self.settings.spatial_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_reverb_enabled(&self, enabled: bool) {
        self.settings.reverb_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_reverb_mix(&self, mix: f32) {
        self.settings.reverb_mix.store(mix.clamp(0.0, 1.0));
    }

    pub fn set_doppler_enabled(&self, enabled: bool) {
        self.settings.doppler_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Ignored unless `0 <= inner < outer`
    pub fn set_distance_params(&self, inner: f32, outer: f32, rolloff: f32) {
        if inner < 0.0 || outer <= inner {
            tracing::warn!("Ignoring invalid distance params: inner {} outer {}", inner, outer);
            return;
        }
        self.settings.inner_radius.store(inner);
        self.settings.outer_radius.store(outer);
        self.settings.rolloff.store(rolloff.max(MIN_ROLLOFF));
    }

    /// Current rendering parameters
    pub fn spatial_params(&self) -> SpatialParams {
        self.settings.spatial_params(&self.base_spatial)
    }
}
