//! docrag-vector
//!
//! Exhaustive nearest-neighbour search over unit-normalized embeddings and the
//! two-file artifact (`index.bin` + `chunks.json`) it is persisted as.

pub mod artifact;
pub mod codec;
pub mod flat;

pub use artifact::{IndexArtifact, CHUNKS_FILE, CURRENT_FILE, INDEX_FILE};
pub use flat::{euclidean_distance_squared, l2_normalize, magnitude, FlatIndex, Neighbor};
