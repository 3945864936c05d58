//! Message transport interface.
//!
//! The transport is one-way and at-least-once: a message may be delivered
//! more than once, and there is no ordering between different domain pairs.
//! Handlers must tolerate both.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use omnisweep_common::{Address, DomainId, MessageId, Result, Value};

/// Receipt for an accepted outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReceipt {
    pub message_id: MessageId,
    pub nonce: u64,
    pub fee: Value,
}

/// Outbound side of the cross-domain messaging service.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Quote the fee for sending `payload` to `destination`.
    async fn quote(&self, destination: DomainId, payload: &[u8]) -> Result<Value>;

    /// Send `payload`, paying `fee`; any overpayment goes to `refund_to`.
    async fn send(
        &self,
        destination: DomainId,
        payload: Vec<u8>,
        fee: Value,
        refund_to: Address,
    ) -> Result<TransportReceipt>;
}

/// A message as delivered by the transport.
///
/// `source_domain` and `sender` are authenticated by the transport; the
/// payload is untrusted until decoded and checked against them.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: MessageId,
    pub source_domain: DomainId,
    pub sender: Address,
    pub payload: Vec<u8>,
}

/// What a handler did with a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// The message changed state.
    Processed,
    /// A redelivery; acknowledged without side effects.
    Duplicate,
}

/// Inbound side: the component a transport delivers to.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle_inbound(&self, message: InboundMessage) -> Result<InboundOutcome>;
}

/// Derive the identifier a transport assigns to a message.
pub fn derive_message_id(
    source: DomainId,
    destination: DomainId,
    nonce: u64,
    payload: &[u8],
) -> MessageId {
    let mut hasher = Sha256::new();
    hasher.update(source.get().to_be_bytes());
    hasher.update(destination.get().to_be_bytes());
    hasher.update(nonce.to_be_bytes());
    hasher.update(payload);
    MessageId::from_bytes(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_depends_on_every_field() {
        let base = derive_message_id(DomainId::new(1), DomainId::new(2), 7, b"payload");

        assert_eq!(
            base,
            derive_message_id(DomainId::new(1), DomainId::new(2), 7, b"payload")
        );
        assert_ne!(
            base,
            derive_message_id(DomainId::new(2), DomainId::new(1), 7, b"payload")
        );
        assert_ne!(
            base,
            derive_message_id(DomainId::new(1), DomainId::new(2), 8, b"payload")
        );
        assert_ne!(
            base,
            derive_message_id(DomainId::new(1), DomainId::new(2), 7, b"other")
        );
    }

    #[test]
    fn test_message_id_display_is_hex() {
        let id = derive_message_id(DomainId::new(1), DomainId::new(2), 0, b"");
        let shown = id.to_string();
        assert!(shown.starts_with("0x"));
        assert_eq!(shown.len(), 66);
    }
}
