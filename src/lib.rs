pub mod cli;
pub mod config;
pub mod error;
pub mod ml;
pub mod model;
pub mod predict_resolver;
pub mod predict_service;
pub mod response;
pub mod services;
pub mod validation;

pub use config::AppConfig;
pub use error::{AppError, ErrorKind, PredictError, Result};
pub use model::{LoadedModel, ModelCache, ModelDescriptor, ModelLoader};
pub use predict_resolver::{predict, PredictResolver};
pub use predict_service::InvocationResult;
pub use response::PredictionResponse;
pub use validation::{FeatureValue, PredictionRequest};
