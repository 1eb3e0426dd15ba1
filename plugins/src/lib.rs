pub mod factory;
pub mod progress;
pub mod runner;
