/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Deterministic, version-tagged serialization of every PBFT message.
//!
//! ## Wire format
//!
//! Every frame is `{version: u8, packet_type: u8, body}`, where `body` is the borsh serialization
//! of the message struct (borsh length-prefixes every variable-length field, so the frame is
//! self-delimiting given an outer transport frame). Unknown versions are rejected with
//! [`CodecError::VersionMismatch`], unknown packet types with [`CodecError::UnknownPacketType`],
//! and bodies that fail deserialization (or whose shape disagrees with the packet tag) with
//! [`CodecError::MalformedMessage`].
//!
//! Signatures cover the canonical byte form of all fields except the signature itself; see
//! [`SignedMessage`](crate::messages::SignedMessage).

use borsh::{BorshDeserialize, BorshSerialize};

use crate::messages::{PacketType, PbftMessage};

/// The wire format version this build speaks. Bumped on every incompatible change to any message
/// body.
pub const CODEC_VERSION: u8 = 1;

/// The different ways decoding an inbound frame can fail.
#[derive(Debug, PartialEq, Eq)]
pub enum CodecError {
    /// The frame is truncated, or its body does not deserialize into the shape its packet tag
    /// promises.
    MalformedMessage,

    /// The frame's version byte is not a version this build speaks.
    VersionMismatch { received: u8 },

    /// The frame's packet tag is not a known [`PacketType`].
    UnknownPacketType { received: u8 },
}

/// Encode `msg` into its wire frame under the given `version`.
pub fn encode(msg: &PbftMessage, version: u8) -> Vec<u8> {
    let body = match msg {
        PbftMessage::PrePrepare(m) => m.try_to_vec(),
        PbftMessage::Prepare(m) => m.try_to_vec(),
        PbftMessage::Commit(m) => m.try_to_vec(),
        PbftMessage::ViewChange(m) => m.try_to_vec(),
        PbftMessage::NewView(m) => m.try_to_vec(),
        PbftMessage::CommittedProposalRequest(m) => m.try_to_vec(),
        PbftMessage::PreparedProposalRequest(m) => m.try_to_vec(),
        PbftMessage::CommittedProposalResponse(m) => m.try_to_vec(),
        PbftMessage::PreparedProposalResponse(m) => m.try_to_vec(),
    }
    .unwrap();

    let mut frame = Vec::with_capacity(2 + body.len());
    frame.push(version);
    frame.push(msg.packet_type() as u8);
    frame.extend_from_slice(&body);
    frame
}

/// Decode an inbound wire frame into a typed message.
pub fn decode(bytes: &[u8]) -> Result<PbftMessage, CodecError> {
    if bytes.len() < 2 {
        return Err(CodecError::MalformedMessage);
    }

    let version = bytes[0];
    if version != CODEC_VERSION {
        return Err(CodecError::VersionMismatch { received: version });
    }

    let packet_type =
        PacketType::try_from(bytes[1]).map_err(|tag| CodecError::UnknownPacketType { received: tag })?;

    let body = &bytes[2..];
    let msg = match packet_type {
        PacketType::PrePrepare => PbftMessage::PrePrepare(deserialize_body(body)?),
        PacketType::Prepare => PbftMessage::Prepare(deserialize_body(body)?),
        PacketType::Commit => PbftMessage::Commit(deserialize_body(body)?),
        PacketType::ViewChange => PbftMessage::ViewChange(deserialize_body(body)?),
        PacketType::NewView => PbftMessage::NewView(deserialize_body(body)?),
        PacketType::CommittedProposalRequest => {
            PbftMessage::CommittedProposalRequest(deserialize_body(body)?)
        }
        PacketType::PreparedProposalRequest => {
            PbftMessage::PreparedProposalRequest(deserialize_body(body)?)
        }
        PacketType::CommittedProposalResponse => {
            PbftMessage::CommittedProposalResponse(deserialize_body(body)?)
        }
        PacketType::PreparedProposalResponse => {
            PbftMessage::PreparedProposalResponse(deserialize_body(body)?)
        }
    };
    Ok(msg)
}

fn deserialize_body<T: BorshDeserialize>(body: &[u8]) -> Result<T, CodecError> {
    T::try_from_slice(body).map_err(|_| CodecError::MalformedMessage)
}
