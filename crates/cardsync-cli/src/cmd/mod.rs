pub mod card;
pub mod config;
pub mod init;
pub mod reconcile;
