//! The extract–transform–load engine.
//!
//! ```text
//! source table ──fetch_all──▶ [window::filter] ──transform──▶ rows
//!                                                               │
//!                                              [csv_export] ◀───┤
//!                                                               ▼
//! target table ──fetch_all──▶ [window::filter] ──▶ ExistingKeys ─ select_new ─▶ Loader::write
//! ```
//!
//! Incremental runs apply the same window to both tables so that the dedup
//! index covers exactly the dates the candidate rows can have.

pub mod csv_export;
pub mod fields;
pub mod load;
pub mod pipeline;
pub mod timestamp;
pub mod transform;
pub mod window;

pub use load::{select_new, DedupKey, ExistingKeys, Loader, WriteSummary};
pub use pipeline::{Pipeline, PipelineReport, PipelineSettings, SyncMode};
pub use timestamp::{TimestampError, TimestampNormalizer};
pub use transform::{transform, SkipStats, TargetRow, TransformOutcome};
pub use window::{ExecutionWindow, WindowOutcome};
