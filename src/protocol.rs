//! Wire protocol shared with the transport
//!
//! Binary audio packets (little-endian):
//!
//! ```text
//! Outgoing (engine → transport):
//!   [0x03][x:f32][y:f32][z:f32][opus payload ...]              13-byte header
//!
//! Inbound (transport → engine):
//!   [0x03][sender:u64][x:f32][y:f32][z:f32][opus payload ...]  21-byte header
//! ```
//!
//! Text frames on the same connection carry [`ControlMessage`] as JSON.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Sub;
use std::str::FromStr;

use crate::error::ProtocolError;

/// Outgoing header: type tag + three floats
pub const OUTGOING_HEADER_SIZE: usize = 1 + 12;

/// Inbound header: type tag + sender id + three floats
pub const INBOUND_HEADER_SIZE: usize = 1 + 8 + 12;

/// Largest Opus payload we ever put on the wire
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// Message type byte of binary packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Audio = 0x03,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x03 => Ok(MessageType::Audio),
            other => Err(ProtocolError::UnexpectedType(other)),
        }
    }
}

/// 3D position in world units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn length_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Listener pose: position plus yaw in radians.
///
/// Yaw 0 faces +X; increasing yaw turns toward +Y.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub yaw: f32,
}

impl Pose {
    pub fn new(position: Vec3, yaw: f32) -> Self {
        Self { position, yaw }
    }

    /// Build a pose from an Unreal rotator yaw (65536 units per turn).
    pub fn from_unreal_yaw(position: Vec3, yaw_units: i32) -> Self {
        let yaw = yaw_units as f32 * (std::f32::consts::TAU / 65536.0);
        Self { position, yaw }
    }
}

/// Identity of a remote speaker (a 64-bit platform id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PeerId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(PeerId)
            .map_err(|_| ProtocolError::InvalidPeerId(s.to_string()))
    }
}

/// Encoded voice frame tagged with the local speaker position
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingPacket {
    pub position: Vec3,
    pub payload: Bytes,
}

impl OutgoingPacket {
    pub fn new(position: Vec3, payload: Bytes) -> Self {
        Self { position, payload }
    }

    /// Serialize to wire format
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(OUTGOING_HEADER_SIZE + self.payload.len());
        buf.put_u8(MessageType::Audio as u8);
        put_position(&mut buf, self.position);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse from wire format
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < OUTGOING_HEADER_SIZE {
            return Err(ProtocolError::TooShort(data.len()));
        }
        let mut buf = data;
        MessageType::try_from(buf.get_u8())?;
        let position = get_position(&mut buf)?;
        Ok(Self {
            position,
            payload: Bytes::copy_from_slice(buf),
        })
    }
}

/// Voice frame received from a remote speaker
#[derive(Debug, Clone, PartialEq)]
pub struct InboundPacket {
    pub sender: PeerId,
    pub position: Vec3,
    pub payload: Bytes,
}

impl InboundPacket {
    pub fn new(sender: PeerId, position: Vec3, payload: Bytes) -> Self {
        Self {
            sender,
            position,
            payload,
        }
    }

    /// Serialize to wire format
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(INBOUND_HEADER_SIZE + self.payload.len());
        buf.put_u8(MessageType::Audio as u8);
        buf.put_u64_le(self.sender.0);
        put_position(&mut buf, self.position);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Parse from wire format.
    ///
    /// An empty payload is accepted; the decoder treats it as a failed frame.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < INBOUND_HEADER_SIZE {
            return Err(ProtocolError::TooShort(data.len()));
        }
        let mut buf = data;
        MessageType::try_from(buf.get_u8())?;
        let sender = PeerId(buf.get_u64_le());
        let position = get_position(&mut buf)?;
        Ok(Self {
            sender,
            position,
            payload: Bytes::copy_from_slice(buf),
        })
    }

    /// What a relay does with an outgoing packet: stamp it with its sender.
    pub fn relay(outgoing: &[u8], sender: PeerId) -> Result<Bytes, ProtocolError> {
        let packet = OutgoingPacket::decode(outgoing)?;
        Ok(InboundPacket::new(sender, packet.position, packet.payload).encode())
    }
}

fn put_position(buf: &mut BytesMut, position: Vec3) {
    buf.put_f32_le(position.x);
    buf.put_f32_le(position.y);
    buf.put_f32_le(position.z);
}

/// Non-finite coordinates are rejected
fn get_position(buf: &mut &[u8]) -> Result<Vec3, ProtocolError> {
    let x = buf.get_f32_le();
    let y = buf.get_f32_le();
    let z = buf.get_f32_le();
    let position = Vec3::new(x, y, z);
    if position.is_finite() {
        Ok(position)
    } else {
        Err(ProtocolError::NonFinitePosition)
    }
}

/// Peer listing entry in a `welcome` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub steam_id: String,
    #[serde(default = "unknown_player")]
    pub player_name: String,
}

fn unknown_player() -> String {
    "Unknown".to_string()
}

/// Text control messages exchanged with the room server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    #[serde(rename_all = "camelCase")]
    Join {
        match_id: String,
        player_name: String,
        steam_id: String,
    },
    Leave,
    Position {
        x: f32,
        y: f32,
        z: f32,
        yaw: i32,
        pitch: i32,
    },
    Welcome {
        #[serde(default)]
        peers: Vec<PeerInfo>,
    },
    #[serde(rename_all = "camelCase")]
    PeerJoined {
        steam_id: String,
        #[serde(default = "unknown_player")]
        player_name: String,
    },
    #[serde(rename_all = "camelCase")]
    PeerLeft { steam_id: String },
    #[serde(rename_all = "camelCase")]
    PeerPosition {
        steam_id: String,
        x: f32,
        y: f32,
        z: f32,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    Pong,
}

impl ControlMessage {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedControl(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::MalformedControl(e.to_string()))
    }

    /// Peer the message is about, if any
    pub fn peer_id(&self) -> Option<Result<PeerId, ProtocolError>> {
        match self {
            ControlMessage::PeerJoined { steam_id, .. }
            | ControlMessage::PeerLeft { steam_id }
            | ControlMessage::PeerPosition { steam_id, .. } => Some(steam_id.parse()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_outgoing_layout() {
        let packet = OutgoingPacket::new(Vec3::new(1.0, -2.0, 3.5), Bytes::from_static(&[9, 8, 7]));
        let bytes = packet.encode();

        assert_eq!(bytes.len(), OUTGOING_HEADER_SIZE + 3);
        assert_eq!(bytes[0], 0x03);
        assert_eq!(&bytes[1..5], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[5..9], &(-2.0f32).to_le_bytes());
        assert_eq!(&bytes[9..13], &3.5f32.to_le_bytes());
        assert_eq!(&bytes[13..], &[9, 8, 7]);
    }

    #[test]
    fn test_inbound_rejects_short_and_wrong_tag() {
        assert_eq!(
            InboundPacket::decode(&[0x03; 20]),
            Err(ProtocolError::TooShort(20))
        );

        let mut data = vec![0u8; INBOUND_HEADER_SIZE + 4];
        data[0] = 0x07;
        assert_eq!(
            InboundPacket::decode(&data),
            Err(ProtocolError::UnexpectedType(0x07))
        );
    }

    #[test]
    fn test_non_finite_position_rejected() {
        for bad in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let inbound = InboundPacket::new(PeerId(2), Vec3::new(bad, 0.0, 0.0), Bytes::from_static(&[1]));
            assert_eq!(
                InboundPacket::decode(&inbound.encode()),
                Err(ProtocolError::NonFinitePosition)
            );

            let outgoing = OutgoingPacket::new(Vec3::new(0.0, 0.0, bad), Bytes::from_static(&[1]));
            assert_eq!(
                InboundPacket::relay(&outgoing.encode(), PeerId(2)),
                Err(ProtocolError::NonFinitePosition)
            );
        }
    }

    #[test]
    fn test_inbound_header_only_has_empty_payload() {
        let packet = InboundPacket::new(PeerId(5), Vec3::ZERO, Bytes::new());
        let parsed = InboundPacket::decode(&packet.encode()).unwrap();
        assert!(parsed.payload.is_empty());
        assert_eq!(parsed.sender, PeerId(5));
    }

    #[test]
    fn test_unreal_yaw_quarter_turn() {
        let pose = Pose::from_unreal_yaw(Vec3::ZERO, 16384);
        assert!((pose.yaw - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_control_messages_parse_by_tag() {
        let msg = ControlMessage::from_json(r#"{"type":"peer_left","steamId":"76561198000000001"}"#)
            .unwrap();
        assert_eq!(
            msg,
            ControlMessage::PeerLeft {
                steam_id: "76561198000000001".into()
            }
        );
        assert_eq!(msg.peer_id(), Some(Ok(PeerId(76_561_198_000_000_001))));

        let welcome = ControlMessage::from_json(
            r#"{"type":"welcome","peers":[{"steamId":"1","playerName":"a"},{"steamId":"2"}]}"#,
        )
        .unwrap();
        match welcome {
            ControlMessage::Welcome { peers } => {
                assert_eq!(peers.len(), 2);
                assert_eq!(peers[1].player_name, "Unknown");
            }
            other => panic!("unexpected message {:?}", other),
        }

        assert_eq!(ControlMessage::from_json(r#"{"type":"pong"}"#).unwrap(), ControlMessage::Pong);
        assert!(ControlMessage::from_json(r#"{"type":"bogus"}"#).is_err());
    }

    #[test]
    fn test_join_serializes_camel_case() {
        let json = ControlMessage::Join {
            match_id: "m1".into(),
            player_name: "p".into(),
            steam_id: "42".into(),
        }
        .to_json()
        .unwrap();
        assert!(json.contains(r#""type":"join""#));
        assert!(json.contains(r#""matchId":"m1""#));
        assert!(json.contains(r#""steamId":"42""#));
    }

    proptest! {
        #[test]
        fn relay_preserves_payload_and_position(
            x in -1.0e6f32..1.0e6,
            y in -1.0e6f32..1.0e6,
            z in -1.0e6f32..1.0e6,
            sender in any::<u64>(),
            payload in proptest::collection::vec(any::<u8>(), 0..MAX_PAYLOAD_SIZE),
        ) {
            let outgoing = OutgoingPacket::new(Vec3::new(x, y, z), Bytes::from(payload.clone())).encode();
            let inbound = InboundPacket::relay(&outgoing, PeerId(sender)).unwrap();
            let parsed = InboundPacket::decode(&inbound).unwrap();

            prop_assert_eq!(parsed.sender, PeerId(sender));
            prop_assert_eq!(parsed.payload.as_ref(), payload.as_slice());
            prop_assert_eq!(parsed.position, Vec3::new(x, y, z));
        }
    }
}
