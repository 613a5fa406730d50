use std::path::Path;

use hnsw_rs::anndists::dist::DistCosine;
use hnsw_rs::api::AnnT;
use hnsw_rs::hnsw::Hnsw;
use hnsw_rs::hnswio::{HnswIo, ReloadOptions};
use parking_lot::RwLock;

use crate::core::error::{Error, Result};

/// The contract the core expects from an approximate-nearest-neighbor
/// collaborator (spec §6): bulk insertion, k-nearest-neighbor query sorted
/// ascending by distance, and byte-level persistence. Internal graph
/// construction is an implementation detail the core never inspects.
///
/// All operations take `&self` — per spec §5, "the ANN collaborator's
/// add/query operations must themselves be thread-safe; the Index does not
/// serialize them." `HnswAnn` meets this with an internal lock rather than
/// requiring callers to synchronize around it.
pub trait AnnCollaborator: Send + Sync {
    fn add_items(&self, vectors: &[Vec<f32>], labels: &[u64]) -> Result<()>;
    fn knn_query(&self, vector: &[f32], k: usize) -> Result<Vec<(u64, f32)>>;
    fn persist(&self, path: &Path) -> Result<()>;
    fn restore(&self, path: &Path) -> Result<()>;
}

/// `hnsw_rs`-backed nearest-neighbor index over cosine distance, used to
/// rerank natural-language queries (spec §4.6 `natural`). The graph itself
/// (`hnsw_rs::Hnsw::parallel_insert`/`search`) is already safe to call
/// concurrently through a shared reference; the `RwLock` only serializes the
/// rare whole-graph swap done by `restore`.
pub struct HnswAnn {
    hnsw: RwLock<Hnsw<'static, f32, DistCosine>>,
    dimensions: usize,
}

const MAX_NB_CONNECTION: usize = 24;
const MAX_LAYER: usize = 16;
const EF_CONSTRUCTION: usize = 200;
const EF_SEARCH: usize = 64;
const DUMP_BASENAME: &str = "index";

impl HnswAnn {
    pub fn new(capacity: usize, dimensions: usize) -> Self {
        HnswAnn {
            hnsw: RwLock::new(Hnsw::new(
                MAX_NB_CONNECTION,
                capacity,
                MAX_LAYER,
                EF_CONSTRUCTION,
                DistCosine {},
            )),
            dimensions,
        }
    }
}

impl AnnCollaborator for HnswAnn {
    fn add_items(&self, vectors: &[Vec<f32>], labels: &[u64]) -> Result<()> {
        if vectors.len() != labels.len() {
            return Err(Error::search("vectors and labels must have equal length"));
        }
        for vector in vectors {
            if vector.len() != self.dimensions {
                return Err(Error::search(format!(
                    "vector dimensionality {} does not match configured {}",
                    vector.len(),
                    self.dimensions
                )));
            }
        }

        let data: Vec<(&Vec<f32>, usize)> = vectors
            .iter()
            .zip(labels.iter())
            .map(|(v, id)| (v, *id as usize))
            .collect();
        self.hnsw.read().parallel_insert(&data);
        Ok(())
    }

    fn knn_query(&self, vector: &[f32], k: usize) -> Result<Vec<(u64, f32)>> {
        let neighbours = self.hnsw.read().search(vector, k, EF_SEARCH);
        let mut results: Vec<(u64, f32)> = neighbours
            .into_iter()
            .map(|n| (n.d_id as u64, n.distance))
            .collect();
        results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(results)
    }

    fn persist(&self, path: &Path) -> Result<()> {
        let directory = path
            .to_str()
            .ok_or_else(|| Error::search("persist path is not valid UTF-8"))?;
        self.hnsw
            .read()
            .file_dump(Path::new(directory), DUMP_BASENAME)
            .map_err(|e| Error::search(format!("ANN persist failed: {e}")))?;
        Ok(())
    }

    fn restore(&self, path: &Path) -> Result<()> {
        let mut reloader = HnswIo::new_with_options(path, DUMP_BASENAME, ReloadOptions::default());
        let reloaded: Hnsw<f32, DistCosine> = reloader
            .load_hnsw_with_dist(DistCosine {})
            .map_err(|e| Error::search(format!("ANN restore failed: {e}")))?;
        *self.hnsw.write() = reloaded;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_neighbor_is_the_identical_vector() {
        let ann = HnswAnn::new(100, 4);
        ann.add_items(
            &[vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
            &[1, 2],
        )
        .unwrap();
        let results = ann.knn_query(&[1.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(results[0].0, 1);
    }

    #[test]
    fn rejects_mismatched_dimensionality() {
        let ann = HnswAnn::new(100, 4);
        let result = ann.add_items(&[vec![1.0, 0.0]], &[1]);
        assert!(result.is_err());
    }
}
