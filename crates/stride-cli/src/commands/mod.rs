pub mod collections;
pub mod common;
pub mod completions;
pub mod conflicts;
pub mod runs;
pub mod shoes;
pub mod status;
pub mod sync;
