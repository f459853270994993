pub mod clustering;
pub mod embeddings;
pub mod models;

pub use clustering::{Assignment, ClusterAssigner, ClusterModel, ClusterModelLoader, FileClusterModelLoader};
pub use embeddings::{preprocess, EmbeddingGenerator};
pub use models::create_model;

pub mod prelude {
    pub use super::clustering::{ClusterAssigner, ClusterModel, ClusterModelLoader};
    pub use super::embeddings::EmbeddingGenerator;
    pub use super::models::create_model;
    pub use nd_core::{EmbeddingProvider, Error, Result};
}
