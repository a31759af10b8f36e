pub mod cache;
pub mod errors;
pub mod masses;
pub mod matching;
pub mod tree;

pub use cache::BoundedCache;
pub use errors::{
    Result,
    SeqTreeError,
};
pub use matching::{
    MatchingKind,
    SequenceMatching,
};
pub use tree::{
    Occurrence,
    SequenceTree,
    TreeConfig,
};
