mod model;
mod repository;

pub use model::{NewSyncQueueItemDB, SyncQueueItemDB};
pub use repository::SyncQueueRepository;
