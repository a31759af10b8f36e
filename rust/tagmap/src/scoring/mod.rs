pub mod category_maps;
pub mod target_decoy;

pub use category_maps::CategoryDecoyMaps;
pub use target_decoy::TargetDecoyMap;
