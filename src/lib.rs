pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod remote;
pub mod report;
pub mod rotation;
pub mod staging;
pub mod store;
pub mod util;
