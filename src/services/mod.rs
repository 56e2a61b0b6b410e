pub mod json_extract;
pub mod model_catalog;

pub use json_extract::extract_json;
pub use model_catalog::{ModelCatalogService, PREFERRED_MODELS};
