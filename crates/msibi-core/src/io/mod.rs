//! File formats consumed and produced by the optimizer: trajectory reading,
//! engine-facing potential tables, and distribution snapshots.

pub mod table;
pub mod traits;
pub mod xyz;
