//! Omnisweep Common Types
//!
//! Shared types for the omnisweep protocol: domain and operation
//! identifiers, canonical value amounts, dispatch instructions, the
//! sweep operation state machine, and the error taxonomy used by both
//! the origin coordinator and the remote workers.

pub mod identifiers;
pub mod monetary;
pub mod operation;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use operation::*;
pub use error::*;
pub use time::*;
