pub mod deadline;

pub use deadline::{DeadlineQueue, TimerHandle};
