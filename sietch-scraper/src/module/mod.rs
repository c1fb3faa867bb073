pub mod scheduled;
pub mod sietch;
