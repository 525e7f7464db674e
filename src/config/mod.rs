mod restamp_config;

pub use restamp_config::{ConfigCreationError, RestampConfig};
