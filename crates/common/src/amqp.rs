mod client;
mod consumer;
mod middleware;
mod subscriber;
mod traits;

pub use client::*;
pub use consumer::*;
pub use middleware::*;
pub use subscriber::*;
pub use traits::*;
