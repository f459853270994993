//! Read-only cluster model and nearest-centroid assignment.
//!
//! Centroids come from an offline training job and are never modified here;
//! a retrained model only takes effect on the next run that loads it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use nd_core::{cosine_similarity, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Ordered centroids, one per cluster id `0..K`, plus the optional
/// human-readable names the training job gave them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterModel {
    centroids: Vec<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    names: Option<Vec<String>>,
}

impl ClusterModel {
    pub fn new(centroids: Vec<Vec<f32>>) -> Result<Self> {
        let model = Self { centroids, names: None };
        model.validate()?;
        Ok(model)
    }

    /// Attaches one name per cluster, in id order.
    pub fn with_names(mut self, names: Vec<String>) -> Result<Self> {
        self.names = Some(names);
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        let Some(first) = self.centroids.first() else {
            return Err(Error::Config("cluster model has no centroids".into()));
        };
        let dims = first.len();
        if dims == 0 {
            return Err(Error::Config("cluster model centroids are empty".into()));
        }
        for (id, centroid) in self.centroids.iter().enumerate() {
            if centroid.len() != dims {
                return Err(Error::Config(format!(
                    "centroid {} has {} dimensions, expected {}",
                    id,
                    centroid.len(),
                    dims
                )));
            }
            if centroid.iter().any(|x| !x.is_finite()) {
                return Err(Error::Config(format!("centroid {} has non-finite values", id)));
            }
        }
        if let Some(names) = &self.names {
            if names.len() != self.centroids.len() {
                return Err(Error::Config(format!(
                    "cluster model has {} names for {} centroids",
                    names.len(),
                    self.centroids.len()
                )));
            }
        }
        Ok(())
    }

    pub fn num_clusters(&self) -> usize {
        self.centroids.len()
    }

    pub fn dimensions(&self) -> usize {
        self.centroids.first().map_or(0, Vec::len)
    }

    pub fn centroid(&self, cluster: usize) -> Option<&[f32]> {
        self.centroids.get(cluster).map(Vec::as_slice)
    }

    pub fn name(&self, cluster: usize) -> Option<&str> {
        self.names.as_ref()?.get(cluster).map(String::as_str)
    }

    /// Cluster names in id order; empty when the model carries none.
    pub fn names(&self) -> &[String] {
        self.names.as_deref().unwrap_or_default()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(text)?;
        model.validate()?;
        Ok(model)
    }
}

/// Source of the cluster model for one run.
#[async_trait]
pub trait ClusterModelLoader: Send + Sync {
    async fn load(&self) -> Result<ClusterModel>;
}

/// Loads `{"centroids": [[..], ..], "names": [..]}` from disk. `names` is
/// optional.
#[derive(Debug, Clone)]
pub struct FileClusterModelLoader {
    path: PathBuf,
}

impl FileClusterModelLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ClusterModelLoader for FileClusterModelLoader {
    async fn load(&self) -> Result<ClusterModel> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Config(format!("cannot read cluster model {}: {}", self.path.display(), e))
        })?;
        let model = ClusterModel::from_json(&text)?;
        info!(
            path = %self.path.display(),
            clusters = model.num_clusters(),
            dimensions = model.dimensions(),
            named = model.names.is_some(),
            "cluster model loaded"
        );
        Ok(model)
    }
}

/// An already-built model, for tests and embedding callers.
#[async_trait]
impl ClusterModelLoader for ClusterModel {
    async fn load(&self) -> Result<ClusterModel> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub cluster: usize,
    /// Cosine similarity to the chosen centroid.
    pub similarity: f64,
}

#[derive(Debug, Clone)]
pub struct ClusterAssigner {
    model: Arc<ClusterModel>,
}

impl ClusterAssigner {
    pub fn new(model: Arc<ClusterModel>) -> Result<Self> {
        if model.num_clusters() == 0 {
            return Err(Error::Config("cannot assign clusters with zero centroids".into()));
        }
        Ok(Self { model })
    }

    pub fn model(&self) -> &ClusterModel {
        &self.model
    }

    /// Nearest centroid by cosine similarity. On exact ties the lower cluster
    /// id wins. Non-finite embeddings are rejected; a NaN similarity would
    /// otherwise land silently in cluster 0.
    pub fn assign(&self, embedding: &[f32]) -> Result<Assignment> {
        if embedding.iter().any(|x| !x.is_finite()) {
            return Err(Error::Inference("embedding has non-finite values".into()));
        }
        if embedding.len() != self.model.dimensions() {
            return Err(Error::Config(format!(
                "embedding has {} dimensions, cluster model expects {}",
                embedding.len(),
                self.model.dimensions()
            )));
        }
        let mut best = Assignment {
            cluster: 0,
            similarity: cosine_similarity(embedding, &self.model.centroids[0]),
        };
        for (cluster, centroid) in self.model.centroids.iter().enumerate().skip(1) {
            let similarity = cosine_similarity(embedding, centroid);
            // strict comparison keeps the earlier id on ties
            if similarity > best.similarity {
                best = Assignment { cluster, similarity };
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn model() -> Arc<ClusterModel> {
        Arc::new(ClusterModel::new(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]]).unwrap())
    }

    #[test]
    fn test_assigns_nearest_centroid() {
        let assigner = ClusterAssigner::new(model()).unwrap();
        let a = assigner.assign(&[0.1, 0.9]).unwrap();
        assert_eq!(a.cluster, 1);
        assert_eq!(a.similarity, cosine_similarity(&[0.1, 0.9], &[0.0, 1.0]));
    }

    #[test]
    fn test_tie_breaks_to_lower_id() {
        let assigner = ClusterAssigner::new(model()).unwrap();
        let a = assigner.assign(&[1.0, 1.0]).unwrap();
        assert_eq!(a.cluster, 0);

        let duplicated = ClusterModel::new(vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]]).unwrap();
        let assigner = ClusterAssigner::new(Arc::new(duplicated)).unwrap();
        assert_eq!(assigner.assign(&[2.0, 0.0]).unwrap().cluster, 1);
    }

    #[test]
    fn test_assignment_is_deterministic() {
        let assigner = ClusterAssigner::new(model()).unwrap();
        let first = assigner.assign(&[0.3, -0.7]).unwrap();
        for _ in 0..10 {
            assert_eq!(assigner.assign(&[0.3, -0.7]).unwrap(), first);
        }
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let assigner = ClusterAssigner::new(model()).unwrap();
        let err = assigner.assign(&[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_non_finite_embedding_rejected() {
        let assigner = ClusterAssigner::new(model()).unwrap();
        let err = assigner.assign(&[f32::NAN, 1.0]).unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
        assert!(assigner.assign(&[f32::INFINITY, 0.0]).is_err());
    }

    #[test]
    fn test_cluster_names() {
        let named = ClusterModel::new(vec![vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap()
            .with_names(vec!["Robotics".into(), "Policy".into()])
            .unwrap();
        assert_eq!(named.name(1), Some("Policy"));
        assert_eq!(named.name(2), None);
        assert_eq!(named.names().len(), 2);

        let unnamed = ClusterModel::new(vec![vec![1.0]]).unwrap();
        assert_eq!(unnamed.name(0), None);
        assert!(unnamed.names().is_empty());

        let short = ClusterModel::new(vec![vec![1.0], vec![0.5]]).unwrap().with_names(vec!["only".into()]);
        assert!(matches!(short, Err(Error::Config(_))));
        assert!(ClusterModel::from_json(r#"{"centroids": [[1.0]], "names": ["a", "b"]}"#).is_err());
    }

    #[test]
    fn test_invalid_models_rejected() {
        assert!(ClusterModel::new(vec![]).is_err());
        assert!(ClusterModel::new(vec![vec![]]).is_err());
        assert!(ClusterModel::new(vec![vec![1.0], vec![1.0, 2.0]]).is_err());
        assert!(ClusterModel::new(vec![vec![f32::NAN]]).is_err());
        assert!(ClusterModel::from_json(r#"{"centroids": []}"#).is_err());
    }

    #[tokio::test]
    async fn test_file_loader() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"centroids": [[1.0, 0.0], [0.0, 1.0]]}"#).unwrap();
        let model = FileClusterModelLoader::new(file.path()).load().await.unwrap();
        assert_eq!(model.num_clusters(), 2);
        assert_eq!(model.dimensions(), 2);
        assert!(model.names().is_empty());

        let missing = FileClusterModelLoader::new("/no/such/model.json").load().await;
        assert!(matches!(missing, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_file_loader_reads_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"centroids": [[1.0, 0.0], [0.0, 1.0]], "names": ["Robotics", "Policy"]}"#)
            .unwrap();
        let model = FileClusterModelLoader::new(file.path()).load().await.unwrap();
        assert_eq!(model.name(0), Some("Robotics"));
    }
}
