//! procpool-cli library: exposes the front end modules for tests.

pub mod app;
pub mod commands;
