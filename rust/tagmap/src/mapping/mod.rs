pub mod annotate;
pub mod matcher;
pub mod remap;
pub mod scheduler;

pub use annotate::count_terminal_ions;
pub use matcher::TagMatcher;
pub use remap::remap_modifications;
pub use scheduler::{
    group_by_composition_key,
    MapperContext,
    TagMappingScheduler,
    TagsMap,
};
