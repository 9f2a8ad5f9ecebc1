//! Sync queue, interval gate, drainer and full-resync orchestration.

mod full_resync;
mod interval_gate;
mod queue_drainer;
mod sync_model;
mod sync_queue;
mod sync_runtime;
mod sync_scheduler;
mod sync_service;
mod sync_traits;

pub use full_resync::*;
pub use interval_gate::*;
pub use queue_drainer::*;
pub use sync_model::*;
pub use sync_queue::*;
pub use sync_runtime::*;
pub use sync_scheduler::*;
pub use sync_service::*;
pub use sync_traits::*;
