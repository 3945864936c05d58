//! Omnisweep Protocol
//!
//! Wire envelope and payload codec for dispatch requests and completion
//! notices, plus the interfaces of the external collaborators the core
//! drives: the message transport, conversion venues, value bridges,
//! custody, and the privacy hook.

pub mod bridge;
pub mod custody;
pub mod memory;
pub mod messages;
pub mod transport;
pub mod venue;

pub use bridge::{
    BridgeConfig, BridgeEndpoint, BridgeFlavor, BridgeReceipt, BridgeRouter,
    GenericBridgeEndpoint, LegacyBridgeEndpoint, ValueBridge,
};
pub use custody::{Custody, PrivacyHook};
pub use messages::*;
pub use transport::{
    derive_message_id, InboundHandler, InboundMessage, InboundOutcome, MessageTransport,
    TransportReceipt,
};
pub use venue::{convert_batch, unwind_batch, BatchConversion, ConversionAdapter, ConversionReceipt};
