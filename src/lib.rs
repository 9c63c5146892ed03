pub mod config;
pub mod error;
pub mod features;
pub mod model;
pub mod server;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AppConfig;
pub use error::ServiceError;
pub use model::{BatchResult, MediaType, ModelRegistry, PredictionResult, RegistryCell};
pub use server::build_router;
pub use service::{BatchItem, InferenceService, PredictionService};
