pub mod amqp;
pub mod domain;
pub mod observation_aggregator;

pub use amqp::*;
pub use domain::*;
pub use observation_aggregator::*;
