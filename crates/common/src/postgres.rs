mod client;
mod config;
mod observation_repository;

pub use client::*;
pub use config::*;
pub use observation_repository::*;
