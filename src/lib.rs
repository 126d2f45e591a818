pub mod batch;
pub mod build_config;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod logging;
pub mod orchestrator;
pub mod runner;
pub mod session;
pub mod stage;
pub mod ui;
pub mod vimeo_folders;
