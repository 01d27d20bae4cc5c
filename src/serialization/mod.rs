pub mod config;
pub mod deploy_target;
pub mod project;
