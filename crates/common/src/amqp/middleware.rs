mod consumer_types;

pub use consumer_types::*;
