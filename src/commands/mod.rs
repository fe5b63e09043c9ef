//! CLI commands implementation

pub mod docs;
pub mod init;
pub mod reap;
pub mod search;
pub mod status;

pub use docs::*;
pub use init::*;
pub use reap::*;
pub use search::*;
pub use status::*;
