mod model;
mod repository;

pub use model::OfflineRecordDB;
pub use repository::OfflineRecordRepository;
