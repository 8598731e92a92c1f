pub mod config;
pub mod context_config;
pub mod error;
pub mod events;
pub mod gate;
pub mod gates;
pub mod git;
pub mod guard;
pub mod hook;
pub mod identifiers;
pub mod io;
pub mod markdown;
pub mod messages;
pub mod paths;
pub mod rate_limit;
pub mod reports;
pub mod snapshot;
pub mod working_set;

pub use error::{AiddError, Result};
