pub mod advocate;
pub mod assumption;
pub mod modification;
pub mod params;
pub mod spectrum;
pub mod tag;

pub use advocate::Advocate;
pub use assumption::{
    Peptide,
    PeptideAssumption,
    TagAssumption,
};
pub use modification::{
    AdvocateParams,
    ModificationDefinition,
    ModificationMatch,
    ModificationProfile,
    ModificationRegistry,
};
pub use params::SearchParameters;
pub use spectrum::{
    InMemorySpectra,
    Peak,
    Spectrum,
    SpectrumMatch,
    SpectrumSource,
};
pub use tag::{
    AminoAcidPattern,
    AminoAcidSequence,
    Tag,
    TagComponent,
};
