//! Local durable store domain: records, known stores, merge policy.

mod merge;
mod offline_model;
mod offline_traits;

pub use merge::*;
pub use offline_model::*;
pub use offline_traits::*;
