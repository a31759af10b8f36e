//! Identification algorithms whose output gets integrated.

use crate::errors::{
    Result,
    TagMapError,
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Advocate {
    Pepnovo,
    DirecTag,
    Novor,
}

impl Advocate {
    pub fn id(&self) -> i32 {
        match self {
            Self::Pepnovo => 1,
            Self::DirecTag => 2,
            Self::Novor => 3,
        }
    }

    /// Resolves a raw algorithm id; unknown ids fail with an
    /// invalid-argument error naming the id.
    pub fn from_id(id: i32) -> Result<Self> {
        match id {
            1 => Ok(Self::Pepnovo),
            2 => Ok(Self::DirecTag),
            3 => Ok(Self::Novor),
            _ => Err(TagMapError::UnknownAdvocate { id }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pepnovo => "PepNovo+",
            Self::DirecTag => "DirecTag",
            Self::Novor => "Novor",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_round_trip() {
        for advocate in [Advocate::Pepnovo, Advocate::DirecTag, Advocate::Novor] {
            assert_eq!(Advocate::from_id(advocate.id()).unwrap(), advocate);
        }
    }

    #[test]
    fn test_unknown_id_names_the_id() {
        let err = Advocate::from_id(99).unwrap_err();
        match err {
            TagMapError::UnknownAdvocate { id } => assert_eq!(id, 99),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
