//! CLI command implementations for docsync

mod common;
mod scan;
mod search;
mod stats;
mod status;
mod watch;

pub use scan::scan;
pub use search::search;
pub use stats::stats;
pub use status::status;
pub use watch::watch;
