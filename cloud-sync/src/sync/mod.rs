//! Account inventory synchronization

pub mod orchestrator;
pub mod worker;

pub use orchestrator::{
    SkipReason, SlotResult, SweepReport, SyncOrchestrator, SyncSettings, SyncTicket,
};
pub use worker::SyncWorker;
