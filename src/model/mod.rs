//! Model resolution: artifact format, store access, loading and caching.

pub mod artifact;
pub mod cache;
pub mod handle;
pub mod loader;
pub mod schema;
pub mod store;

pub use artifact::{ArtifactFormat, ModelArtifact, OutputSpec, OutputTask};
pub use cache::ModelCache;
pub use handle::{LoadedModel, ModelDescriptor};
pub use loader::ModelLoader;
pub use schema::{FeatureSchema, FeatureSpec, FeatureType};
pub use store::{ArtifactReference, HttpStore, LocalStore, ModelStore, RoutingStore, StoreAccessor};
