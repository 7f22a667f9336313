pub mod catalog;
pub mod merge;
pub mod store;

pub use catalog::Catalog;
pub use merge::{apply_merge_strategy, entity_type_from, merge_entity, MergeResult};
pub use store::{
    load_elements, load_series_config, load_series_memory, save_series_config, save_series_memory,
    set_elements, with_locked_catalog, with_locked_catalog_async, with_locked_series_memory, CatalogStoreError,
};
