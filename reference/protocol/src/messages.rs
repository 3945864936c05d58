//! Protocol message types.
//!
//! Two messages cross domain boundaries: a DISPATCH_REQUEST from the origin
//! coordinator to a remote worker, and a COMPLETION_NOTICE back. Both travel
//! inside an [`Envelope`] carrying the operation they belong to. On the wire
//! everything is protobuf; amounts are decimal strings so no precision is
//! lost between domains.

use std::str::FromStr;

use prost::Message;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use omnisweep_common::{
    DispatchInstruction, DomainId, OperationId, Result, SweepError, Value,
};

/// Version stamped into every envelope.
pub const PROTOCOL_VERSION: u32 = 1;

/// Message type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    DispatchRequest,
    CompletionNotice,
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolMessage {
    /// Origin asks a remote domain to convert and forward its assets.
    DispatchRequest {
        operation_id: OperationId,
        instructions: Vec<DispatchInstruction>,
    },
    /// Remote domain reports that it converted and bridged `amount`.
    CompletionNotice {
        operation_id: OperationId,
        amount: Value,
        instruction_count: u32,
        bridge_reference: String,
    },
}

impl ProtocolMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ProtocolMessage::DispatchRequest { .. } => MessageKind::DispatchRequest,
            ProtocolMessage::CompletionNotice { .. } => MessageKind::CompletionNotice,
        }
    }

    pub fn operation_id(&self) -> OperationId {
        match self {
            ProtocolMessage::DispatchRequest { operation_id, .. }
            | ProtocolMessage::CompletionNotice { operation_id, .. } => *operation_id,
        }
    }
}

/// A message plus its routing header.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Domain the sender claims to be on; checked against the transport's
    /// authenticated source on receipt.
    pub source_domain: DomainId,
    pub destination_domain: DomainId,
    pub message: ProtocolMessage,
}

impl Envelope {
    pub fn new(
        source_domain: DomainId,
        destination_domain: DomainId,
        message: ProtocolMessage,
    ) -> Self {
        Self {
            source_domain,
            destination_domain,
            message,
        }
    }

    /// Build a dispatch request envelope.
    pub fn dispatch(
        source_domain: DomainId,
        destination_domain: DomainId,
        operation_id: OperationId,
        instructions: Vec<DispatchInstruction>,
    ) -> Self {
        Self::new(
            source_domain,
            destination_domain,
            ProtocolMessage::DispatchRequest {
                operation_id,
                instructions,
            },
        )
    }

    /// Build a completion notice envelope.
    pub fn completion(
        source_domain: DomainId,
        destination_domain: DomainId,
        operation_id: OperationId,
        amount: Value,
        instruction_count: u32,
        bridge_reference: impl Into<String>,
    ) -> Self {
        Self::new(
            source_domain,
            destination_domain,
            ProtocolMessage::CompletionNotice {
                operation_id,
                amount,
                instruction_count,
                bridge_reference: bridge_reference.into(),
            },
        )
    }

    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    pub fn operation_id(&self) -> OperationId {
        self.message.operation_id()
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let (kind, payload) = match &self.message {
            ProtocolMessage::DispatchRequest { instructions, .. } => (
                WireKind::DispatchRequest,
                WireDispatchRequest {
                    instructions: instructions.iter().map(WireInstruction::from).collect(),
                }
                .encode_to_vec(),
            ),
            ProtocolMessage::CompletionNotice {
                amount,
                instruction_count,
                bridge_reference,
                ..
            } => (
                WireKind::CompletionNotice,
                WireCompletionNotice {
                    amount: amount.to_string(),
                    instruction_count: *instruction_count,
                    bridge_reference: bridge_reference.clone(),
                }
                .encode_to_vec(),
            ),
        };

        WireEnvelope {
            version: PROTOCOL_VERSION,
            kind: kind as i32,
            source_domain: self.source_domain.get(),
            destination_domain: self.destination_domain.get(),
            operation_id: self.operation_id().to_bytes().to_vec(),
            payload,
        }
        .encode_to_vec()
    }

    /// Decode from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let wire = WireEnvelope::decode(bytes).map_err(codec_error)?;

        if wire.version != PROTOCOL_VERSION {
            return Err(SweepError::Codec(format!(
                "unsupported protocol version {}, expected {}",
                wire.version, PROTOCOL_VERSION
            )));
        }

        let operation_id = OperationId::from_slice(&wire.operation_id)
            .map_err(|e| SweepError::Codec(format!("operation id: {}", e)))?;

        let kind = WireKind::try_from(wire.kind)
            .map_err(|_| SweepError::Codec(format!("unknown message kind {}", wire.kind)))?;

        let message = match kind {
            WireKind::DispatchRequest => {
                let payload =
                    WireDispatchRequest::decode(wire.payload.as_slice()).map_err(codec_error)?;
                let instructions = payload
                    .instructions
                    .into_iter()
                    .map(DispatchInstruction::try_from)
                    .collect::<Result<Vec<_>>>()?;
                ProtocolMessage::DispatchRequest {
                    operation_id,
                    instructions,
                }
            }
            WireKind::CompletionNotice => {
                let payload =
                    WireCompletionNotice::decode(wire.payload.as_slice()).map_err(codec_error)?;
                let amount = Value::from_str(&payload.amount)
                    .map_err(|e| SweepError::Codec(format!("amount: {}", e)))?;
                ProtocolMessage::CompletionNotice {
                    operation_id,
                    amount,
                    instruction_count: payload.instruction_count,
                    bridge_reference: payload.bridge_reference,
                }
            }
            WireKind::Unspecified => {
                return Err(SweepError::Codec("message kind not set".to_string()));
            }
        };

        Ok(Self {
            source_domain: DomainId::new(wire.source_domain),
            destination_domain: DomainId::new(wire.destination_domain),
            message,
        })
    }
}

fn codec_error(err: prost::DecodeError) -> SweepError {
    SweepError::Codec(err.to_string())
}

// --- Wire types ---

/// Message kind on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum WireKind {
    Unspecified = 0,
    DispatchRequest = 1,
    CompletionNotice = 2,
}

/// Routing header plus an encoded payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct WireEnvelope {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(enumeration = "WireKind", tag = "2")]
    pub kind: i32,
    #[prost(uint32, tag = "3")]
    pub source_domain: u32,
    #[prost(uint32, tag = "4")]
    pub destination_domain: u32,
    #[prost(bytes = "vec", tag = "5")]
    pub operation_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub payload: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WireInstruction {
    #[prost(string, tag = "1")]
    pub venue: String,
    #[prost(string, tag = "2")]
    pub asset: String,
    #[prost(string, tag = "3")]
    pub amount: String,
    #[prost(bytes = "vec", tag = "4")]
    pub venue_calldata: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WireDispatchRequest {
    #[prost(message, repeated, tag = "1")]
    pub instructions: Vec<WireInstruction>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WireCompletionNotice {
    #[prost(string, tag = "1")]
    pub amount: String,
    #[prost(uint32, tag = "2")]
    pub instruction_count: u32,
    #[prost(string, tag = "3")]
    pub bridge_reference: String,
}

impl From<&DispatchInstruction> for WireInstruction {
    fn from(instruction: &DispatchInstruction) -> Self {
        Self {
            venue: instruction.venue.to_string(),
            asset: instruction.asset.to_string(),
            amount: instruction.amount.to_string(),
            venue_calldata: instruction.venue_calldata.clone(),
        }
    }
}

impl TryFrom<WireInstruction> for DispatchInstruction {
    type Error = SweepError;

    fn try_from(wire: WireInstruction) -> Result<Self> {
        let amount = Decimal::from_str(&wire.amount)
            .map_err(|e| SweepError::Codec(format!("instruction amount: {}", e)))?;
        Ok(DispatchInstruction::new(wire.venue.as_str(), wire.asset.as_str(), amount)
            .with_calldata(wire.venue_calldata))
    }
}
