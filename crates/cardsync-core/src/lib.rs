pub mod checklist;
pub mod config;
pub mod document;
pub mod error;
pub mod hierarchy;
pub mod io;
pub mod lock;
pub mod merge;
pub mod paths;
pub mod reconcile;
pub mod section;
pub mod status;
pub mod store;
pub mod tracker;

pub use error::{CardError, Result, TransportError};
