//! docrag-retrieve
//!
//! Query-time retrieval over a persisted index, context assembly for a
//! generator, and the build pipeline that produces the index.

pub mod context;
pub mod pipeline;
pub mod retriever;
pub mod shared;

pub use context::ContextAssembler;
pub use pipeline::{build_index, user_prompt, Answer, BuildSummary, RagPipeline, UsedDocument};
pub use retriever::Retriever;
pub use shared::SharedIndex;
