mod error;
mod observation_decoder;
mod observation_service;

pub use error::*;
pub use observation_decoder::*;
pub use observation_service::*;
