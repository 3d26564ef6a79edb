pub mod base;
pub mod cache;
pub mod index;
pub mod retriever;

pub use base::KnowledgeBase;
pub use cache::{CachedIndex, IndexCache};
pub use index::FlatIndex;
pub use retriever::RetrievalEngine;
