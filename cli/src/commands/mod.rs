pub mod cli;
pub mod joblist;
