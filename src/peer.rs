//! Remote peers: decode, jitter buffering and loss concealment
//!
//! Each peer owns a decoder, a spatializer and a ring of already
//! spatialized stereo samples. Packets are rendered as they arrive; the
//! playback cycle then drains the ring and conceals whatever is missing.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::audio::buffer::SampleRing;
use crate::codec::{DecoderFactory, FrameDecoder};
use crate::config::PlaybackConfig;
use crate::constants::{FRAME_SIZE, OUTPUT_CHANNELS};
use crate::error::CodecError;
use crate::mixer::mix_into;
use crate::protocol::{InboundPacket, PeerId, Pose, Vec3};
use crate::spatial::{SpatialParams, Spatializer};

/// When to synthesize audio for a starved peer and when to give up on it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcealPolicy {
    /// Concealment only while the last real packet is younger than this
    pub window: Duration,
    /// Concealment frames allowed between two real packets
    pub max_attempts: u32,
    /// Silence longer than this marks the peer inactive
    pub inactive_after: Duration,
}

impl From<&PlaybackConfig> for ConcealPolicy {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            window: Duration::from_millis(config.conceal_window_ms),
            max_attempts: config.max_conceal_frames,
            inactive_after: Duration::from_millis(config.inactive_after_ms),
        }
    }
}

impl Default for ConcealPolicy {
    fn default() -> Self {
        Self::from(&PlaybackConfig::default())
    }
}

/// Snapshot of one peer for hosts and diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct PeerStatus {
    pub id: PeerId,
    pub active: bool,
    pub position: Vec3,
    /// Stereo samples waiting in the jitter ring
    pub buffered_samples: usize,
    pub conceal_attempts: u32,
    pub frames_decoded: u64,
    pub frames_concealed: u64,
    pub decode_errors: u64,
    /// Stereo samples dropped because the ring was full
    pub overflow_samples: u64,
}

/// Everything the engine keeps for one remote speaker
pub struct PeerState {
    id: PeerId,
    decoder: Box<dyn FrameDecoder>,
    spatializer: Spatializer,
    ring: SampleRing,
    position: Vec3,
    last_packet: Instant,
    conceal_attempts: u32,
    active: bool,
    mono: Vec<f32>,
    stereo: Vec<f32>,
    scratch: Vec<f32>,
    frames_decoded: u64,
    frames_concealed: u64,
    decode_errors: u64,
}

impl PeerState {
    pub fn new(id: PeerId, decoder: Box<dyn FrameDecoder>, ring_capacity: usize, now: Instant) -> Self {
        Self {
            id,
            decoder,
            spatializer: Spatializer::new(),
            ring: SampleRing::new(ring_capacity),
            position: Vec3::ZERO,
            last_packet: now,
            conceal_attempts: 0,
            active: false,
            mono: vec![0.0; FRAME_SIZE],
            stereo: vec![0.0; FRAME_SIZE * OUTPUT_CHANNELS],
            scratch: Vec::new(),
            frames_decoded: 0,
            frames_concealed: 0,
            decode_errors: 0,
        }
    }

    /// Decode, spatialize and buffer one packet
    ///
    /// Returns false when the payload could not be decoded; the peer's
    /// liveness is left untouched in that case.
    pub fn receive(
        &mut self,
        packet: &InboundPacket,
        listener: &Pose,
        params: &SpatialParams,
        now: Instant,
    ) -> bool {
        let decoded = match self.decoder.decode_frame(&packet.payload, &mut self.mono) {
            Ok(n) if n > 0 => n,
            Ok(_) => {
                self.decode_errors += 1;
                return false;
            }
            Err(e) => {
                self.decode_errors += 1;
                tracing::debug!("Peer {} decode failed: {}", self.id, e);
                return false;
            }
        };

        self.position = packet.position;
        self.last_packet = now;
        self.conceal_attempts = 0;
        if !self.active {
            tracing::debug!("Peer {} active", self.id);
        }
        self.active = true;
        self.frames_decoded += 1;

        let stereo_len = decoded * OUTPUT_CHANNELS;
        self.spatializer.process(
            &self.mono[..decoded],
            listener,
            self.position,
            params,
            &mut self.stereo[..stereo_len],
        );
        self.ring.write(&self.stereo[..stereo_len]);
        true
    }

    /// Mix this peer's next `out.len()` stereo samples into `out`
    ///
    /// Buffered audio is used first; a shortfall is concealed or, after a
    /// long silence, the peer is deactivated. Returns the samples mixed.
    pub fn render_into(
        &mut self,
        out: &mut [f32],
        listener: &Pose,
        params: &SpatialParams,
        policy: &ConcealPolicy,
        now: Instant,
    ) -> usize {
        if !self.active {
            return 0;
        }

        let needed = out.len();
        if self.scratch.len() < needed {
            self.scratch.resize(needed, 0.0);
        }
        let got = self.ring.read(&mut self.scratch[..needed]);
        mix_into(&mut out[..got], &self.scratch[..got]);
        if got == needed {
            return got;
        }

        let elapsed = now.saturating_duration_since(self.last_packet);
        if elapsed < policy.window && self.conceal_attempts < policy.max_attempts {
            match self.conceal(listener, params) {
                Ok(concealed) => got + mix_into(&mut out[got..], &self.stereo[..concealed]),
                Err(e) => {
                    tracing::debug!("Peer {} concealment failed: {}", self.id, e);
                    got
                }
            }
        } else {
            if elapsed > policy.inactive_after {
                tracing::debug!("Peer {} inactive after {:?} of silence", self.id, elapsed);
                self.active = false;
            }
            got
        }
    }

    /// Synthesize one frame into `self.stereo`, returning stereo samples produced
    fn conceal(&mut self, listener: &Pose, params: &SpatialParams) -> Result<usize, CodecError> {
        let n = self.decoder.conceal_frame(&mut self.mono)?;
        self.conceal_attempts += 1;
        if n == 0 {
            return Ok(0);
        }
        self.frames_concealed += 1;

        let stereo_len = n * OUTPUT_CHANNELS;
        self.spatializer.process(
            &self.mono[..n],
            listener,
            self.position,
            params,
            &mut self.stereo[..stereo_len],
        );
        Ok(stereo_len)
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn conceal_attempts(&self) -> u32 {
        self.conceal_attempts
    }

    pub fn buffered_samples(&self) -> usize {
        self.ring.len()
    }

    pub fn status(&self) -> PeerStatus {
        PeerStatus {
            id: self.id,
            active: self.active,
            position: self.position,
            buffered_samples: self.ring.len(),
            conceal_attempts: self.conceal_attempts,
            frames_decoded: self.frames_decoded,
            frames_concealed: self.frames_concealed,
            decode_errors: self.decode_errors,
            overflow_samples: self.ring.overflow_count(),
        }
    }
}

/// Peer identity to owned state
///
/// Peers are created lazily on their first packet and only removed on an
/// explicit leave.
pub struct PeerTable {
    peers: HashMap<PeerId, PeerState>,
    decoder_factory: DecoderFactory,
    ring_capacity: usize,
}

impl PeerTable {
    pub fn new(decoder_factory: DecoderFactory, ring_capacity: usize) -> Self {
        Self {
            peers: HashMap::new(),
            decoder_factory,
            ring_capacity,
        }
    }

    /// Route a packet to its sender's state, creating it if unseen
    pub fn receive(
        &mut self,
        packet: &InboundPacket,
        listener: &Pose,
        params: &SpatialParams,
        now: Instant,
    ) -> bool {
        let peer = match self.peers.entry(packet.sender) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let decoder = match (self.decoder_factory)() {
                    Ok(decoder) => decoder,
                    Err(e) => {
                        tracing::warn!("Cannot create decoder for peer {}: {}", packet.sender, e);
                        return false;
                    }
                };
                tracing::info!("New peer {}", packet.sender);
                entry.insert(PeerState::new(packet.sender, decoder, self.ring_capacity, now))
            }
        };
        peer.receive(packet, listener, params, now)
    }

    /// Mix every active peer into `out`; returns how many contributed
    pub fn render_into(
        &mut self,
        out: &mut [f32],
        listener: &Pose,
        params: &SpatialParams,
        policy: &ConcealPolicy,
        now: Instant,
    ) -> usize {
        let mut contributing = 0;
        for peer in self.peers.values_mut() {
            if peer.render_into(out, listener, params, policy, now) > 0 {
                contributing += 1;
            }
        }
        contributing
    }

    pub fn remove(&mut self, id: PeerId) -> bool {
        let removed = self.peers.remove(&id).is_some();
        if removed {
            tracing::info!("Removed peer {}", id);
        }
        removed
    }

    pub fn get(&self, id: PeerId) -> Option<&PeerState> {
        self.peers.get(&id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.peers.values().filter(|p| p.is_active()).count()
    }

    /// Status of every peer, sorted by id
    pub fn statuses(&self) -> Vec<PeerStatus> {
        let mut statuses: Vec<_> = self.peers.values().map(PeerState::status).collect();
        statuses.sort_by_key(|s| s.id);
        statuses
    }
}
