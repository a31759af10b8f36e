use seqtree::SeqTreeError;
use std::fmt::Display;
use std::path::PathBuf;

#[derive(Debug)]
pub enum TagMapError {
    /// An identification algorithm id with no registered advocate.
    UnknownAdvocate {
        id: i32,
    },
    /// A recognized advocate for which modification remapping is not
    /// implemented.
    ModificationMappingNotImplemented {
        advocate: String,
    },
    /// A modification code that cannot be resolved in the destination
    /// profile.
    UnknownModification {
        advocate: String,
        modification: String,
    },
    /// A modification targeting more than one residue cannot be rewritten
    /// onto a single tag position.
    AmbiguousModificationTarget {
        modification: String,
    },
    /// Category maps are keyed by integers; anything else is a caller bug.
    InvalidCategoryKey {
        input: String,
    },
    MissingSpectrum {
        key: String,
    },
    SeqTree(SeqTreeError),
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },
    Parse {
        msg: String,
    },
    ThreadPool {
        msg: String,
    },
}

impl Display for TagMapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownAdvocate { id } => {
                write!(f, "Advocate of id {} not recognized", id)
            }
            Self::ModificationMappingNotImplemented { advocate } => {
                write!(f, "Modification mapping not implemented for {}", advocate)
            }
            Self::UnknownModification {
                advocate,
                modification,
            } => {
                write!(f, "{} modification {} not recognized", advocate, modification)
            }
            Self::AmbiguousModificationTarget { modification } => {
                write!(
                    f,
                    "More than one amino acid can be targeted by the modification {}",
                    modification
                )
            }
            Self::InvalidCategoryKey { input } => {
                write!(f, "Category maps are indexed by charge. Input: {}", input)
            }
            Self::MissingSpectrum { key } => {
                write!(f, "No spectrum found for key {}", key)
            }
            other => write!(f, "{:?}", other),
        }
    }
}

impl std::error::Error for TagMapError {}

impl From<SeqTreeError> for TagMapError {
    fn from(x: SeqTreeError) -> Self {
        Self::SeqTree(x)
    }
}

impl From<std::io::Error> for TagMapError {
    fn from(x: std::io::Error) -> Self {
        Self::Io {
            source: x,
            path: None,
        }
    }
}

impl From<serde_json::Error> for TagMapError {
    fn from(x: serde_json::Error) -> Self {
        Self::Parse { msg: x.to_string() }
    }
}

impl From<rayon::ThreadPoolBuildError> for TagMapError {
    fn from(x: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool { msg: x.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, TagMapError>;
