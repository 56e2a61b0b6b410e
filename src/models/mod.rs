pub mod catalog;
pub mod request;

pub use catalog::{CatalogEntry, ModelDescriptor};
pub use request::{GenerationOutput, GenerationParams, GenerationRequest, GenerationResult};
