pub mod types;

pub use types::{ServerSnapshot, SietchReading};
