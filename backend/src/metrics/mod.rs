//! Metrics pipeline.
//!
//! - Grouper: fold rows into per-key running sums
//! - Rollups: the derived tables built on those sums
//! - Pipeline: ingestion + computation entry points

pub mod grouper;
pub mod pipeline;
pub mod rollups;

pub use grouper::{collect_by, group_by, GroupBuilder};
pub use pipeline::*;
pub use rollups::{derive_tables, ratio, top_channels, TOP_CHANNELS};
