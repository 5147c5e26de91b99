pub mod name_cache;
pub mod rwoption;

pub use name_cache::NameCache;
pub use rwoption::RwOption;
