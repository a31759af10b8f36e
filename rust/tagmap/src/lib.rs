pub mod config;
pub mod errors;
pub mod mapping;
pub mod memory;
pub mod models;
pub mod progress;
pub mod scoring;
pub mod validation;

pub use config::{
    Config,
    MappingConfig,
    PartitionStrategy,
    ValidationConfig,
};
pub use errors::{
    Result,
    TagMapError,
};
pub use mapping::{
    MapperContext,
    TagMappingScheduler,
    TagsMap,
};
pub use memory::{
    BudgetProbe,
    MemoryProbe,
};
pub use progress::{
    ProgressHandler,
    ProgressReporter,
    SilentProgress,
};
pub use scoring::{
    CategoryDecoyMaps,
    TargetDecoyMap,
};
pub use validation::MatchValidationLevel;
