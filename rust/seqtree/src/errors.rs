use std::fmt::Display;

#[derive(Debug)]
pub enum SeqTreeError {
    EmptyDatabase,
    InvalidResidue {
        accession: String,
        residue: char,
        position: usize,
    },
    Other(String),
}

impl Display for SeqTreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyDatabase => write!(f, "Cannot build an index over an empty database"),
            Self::InvalidResidue {
                accession,
                residue,
                position,
            } => {
                write!(
                    f,
                    "Invalid residue '{}' at position {} of protein {}",
                    residue, position, accession
                )
            }
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SeqTreeError {}

impl SeqTreeError {
    pub fn custom(msg: impl Display) -> Self {
        Self::Other(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SeqTreeError>;
