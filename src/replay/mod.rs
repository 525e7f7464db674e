mod replay_driver;

pub use replay_driver::{ReplayDriver, ReplayError};
