pub mod client;
pub mod install;
pub mod list;
pub mod shutdown;
pub mod status;
pub mod uninstall;
pub mod values;
