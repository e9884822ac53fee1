pub mod client;
pub mod config;
pub mod error;
pub mod frontmatter;
pub mod sync;

pub use error::{Result, SyncError};
