pub mod amqp;
pub mod domain;
pub mod postgres;
pub mod retry;
pub mod telemetry;

pub use amqp::*;
pub use domain::*;
pub use postgres::*;
pub use retry::*;
pub use telemetry::*;

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use amqp::MockAmqpChannel;
#[cfg(any(test, feature = "testing"))]
pub use amqp::MockAmqpConnection;
#[cfg(any(test, feature = "testing"))]
pub use amqp::MockAmqpConnector;
#[cfg(any(test, feature = "testing"))]
pub use amqp::MockDeliveryAcker;
#[cfg(any(test, feature = "testing"))]
pub use domain::MockObservationRepository;
