//! Omnisweep Remote Worker
//!
//! Runs on each remote domain. Accepts dispatch requests from the origin
//! coordinator, converts the listed assets, bridges the proceeds home and
//! reports completion.

pub mod config;
pub mod reserve;
pub mod worker;

pub use config::WorkerConfig;
pub use reserve::FeeReserve;
pub use worker::{
    CompletedDispatch, RemoteWorker, WorkerCollaborators, WorkerStats, WorkerStatsSnapshot,
    MAX_BRIDGE_REFERENCE_LEN,
};
