//! CLI command implementations

pub mod config;
pub mod init;
pub mod new;
pub mod status;
pub mod sync;
pub mod watch;
