pub mod bar;
pub mod jsonl;
pub mod log;

pub use bar::BarReporter;
pub use jsonl::JsonlReporter;
pub use log::LogReporter;
