//! Newsdesk core: the mention record, scan windows, configuration and errors.

pub mod config;
pub mod error;
pub mod mention;
pub mod types;
pub mod window;

pub use config::NewsdeskConfig;
pub use error::{NdError, Result};
pub use mention::{mention_id, Mention, Origin, StoredMention};
pub use types::FlaggedArticle;
pub use window::{ScanWindow, Window};
