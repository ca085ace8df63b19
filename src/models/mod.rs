//! Normalized record types produced by the data sources.
//!
//! Every wire variant decodes into these shapes, and they are the only types the
//! domain collectors depend on. Records are created fresh on every scrape and
//! dropped once the snapshot is rendered.

mod spending;
mod team;
mod usage;

pub use spending::*;
pub use team::*;
pub use usage::*;
