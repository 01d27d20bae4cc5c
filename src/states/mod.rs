pub mod deploy_state;
