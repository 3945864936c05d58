//! Omnisweep Coordinator
//!
//! The origin coordinator owns every sweep operation: it dispatches
//! conversion requests to remote domains, converts its own domain's assets
//! synchronously, counts completion notices, and forwards the accumulated
//! value once every listed domain has reported.

pub mod book;
pub mod config;
pub mod coordinator;
pub mod metrics;
pub mod remotes;
pub mod settler;
pub mod state;

pub use config::CoordinatorConfig;
pub use coordinator::{
    Collaborators, DispatchRecord, OperationReceipt, SweepCoordinator, SweepRequest,
};
pub use metrics::{Metrics, MetricsSnapshot};
pub use settler::Disbursement;
pub use state::CoordinatorState;
