mod model;
mod repository;

pub use model::SnapshotCacheDB;
pub use repository::SnapshotCacheRepository;
