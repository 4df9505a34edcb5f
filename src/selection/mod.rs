//! Embedding-space sample selection: fixed-center k-means, nearest-neighbor
//! snapping, and the round-based selection engine that grows the pool.

pub mod engine;
pub mod kmeans;
pub mod neighbors;

pub use engine::{ActiveSelectionEngine, SelectionOutcome};
pub use kmeans::{FixedCenterKMeans, InitStrategy, KMeansFit};
pub use neighbors::NearestNeighbors;
