pub mod config;
pub mod error;
pub mod event;
pub mod fs;
pub mod protocol;
pub mod session;
