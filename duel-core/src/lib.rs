#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod coordinator;
pub mod events;
pub mod matches;
pub mod pool;
pub mod precommit;
pub mod processors;
pub mod registry;
pub mod rules;
pub mod utils;
