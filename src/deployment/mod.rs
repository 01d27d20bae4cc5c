pub mod artifacts;
pub mod deployment;
pub mod flash;
pub mod ssh;
pub mod target;
pub mod transport;
