mod observation_consumer_service;
mod topic;

pub use observation_consumer_service::*;
pub use topic::*;
