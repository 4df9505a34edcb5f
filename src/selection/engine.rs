//! Active Selection Engine
//!
//! Grows the pool by `k` samples per round using embedding-space diversity:
//! fixed-center k-means pinned at the current pool embeddings, a 1-NN snap of
//! the free centers onto actual samples, then deduplication with random
//! backfill so the round always adds exactly `k` unique unpooled indices.

use ndarray::{Array2, Axis};
use rand::seq::index;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::SelectionConfig;
use crate::dataset::registry::SampleRegistry;
use crate::selection::kmeans::FixedCenterKMeans;
use crate::selection::neighbors::NearestNeighbors;
use crate::utils::error::{ActiveSslError, Result};

/// What one selection round did
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    /// The `k` indices added to the pool, in selection order
    pub added: Vec<usize>,
    /// Raw nearest-sample snaps of the free centers, before deduplication
    pub snapped: Vec<usize>,
    /// How many snaps were dropped (already pooled or repeated) and replaced
    /// by random unpooled draws
    pub duplicates_replaced: usize,
}

/// Runs selection rounds against a sample registry
#[derive(Debug, Clone)]
pub struct ActiveSelectionEngine {
    config: SelectionConfig,
}

impl ActiveSelectionEngine {
    pub fn new(config: SelectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// One selection round: cluster, snap, deduplicate, backfill, grow.
    ///
    /// `embeddings` must hold one row per train sample, aligned to registry
    /// indices. On success the registry's pool has grown by exactly
    /// `clusters_per_round` indices.
    pub fn select(
        &self,
        embeddings: &Array2<f32>,
        registry: &mut SampleRegistry,
        rng: &mut ChaCha8Rng,
    ) -> Result<SelectionOutcome> {
        let k = self.config.clusters_per_round;

        if embeddings.nrows() != registry.train_set_size() {
            return Err(ActiveSslError::ShapeMismatch {
                expected: (registry.train_set_size(), embeddings.ncols()),
                actual: embeddings.dim(),
            });
        }
        if k > registry.unpool_size() {
            return Err(ActiveSslError::InsufficientSamples {
                requested: k,
                available: registry.unpool_size(),
            });
        }

        let pool = registry.pool_indices();
        let fixed_centers = embeddings.select(Axis(0), &pool);

        let kmeans = FixedCenterKMeans::new(
            k,
            self.config.init,
            self.config.max_iter,
            self.config.tol,
            rng.gen(),
        );
        let fit = kmeans.fit_predict_centers(embeddings, &fixed_centers)?;
        info!(
            "k-means over {} samples with {} pinned + {} free centers ran {} iterations (converged: {})",
            embeddings.nrows(),
            pool.len(),
            k,
            fit.n_iter,
            fit.converged
        );

        let free_centers = fit
            .centers
            .slice(ndarray::s![pool.len().., ..])
            .to_owned();

        // Snap each free center to its single nearest sample over the whole
        // train set, pooled samples included.
        let nn = NearestNeighbors::fit(embeddings.to_owned())?;
        let snapped = nn.nearest(&free_centers)?;

        // Deduplicate into a separate accumulation list; the snapped list
        // itself is never mutated while we walk it.
        let mut fresh: Vec<usize> = Vec::with_capacity(k);
        let mut duplicates_replaced = 0;
        for &candidate in &snapped {
            if registry.is_pooled(candidate) || fresh.contains(&candidate) {
                info!(
                    "removing snapped index {} because it already exists in the pool or this round",
                    candidate
                );
                duplicates_replaced += 1;
            } else {
                fresh.push(candidate);
            }
        }
        if duplicates_replaced > 0 {
            info!(
                "{} snapped indices were duplicates, drawing random replacements",
                duplicates_replaced
            );
        }

        // Backfill from the unpooled indices not picked this round.
        if fresh.len() < k {
            let available: Vec<usize> = registry
                .unpool_indices()
                .into_iter()
                .filter(|idx| !fresh.contains(idx))
                .collect();
            let need = k - fresh.len();
            let drawn = index::sample(rng, available.len(), need);
            fresh.extend(drawn.iter().map(|i| available[i]));
        }

        registry.grow_pool(&fresh)?;
        info!(
            "pool grew by {} to {} samples ({} unpooled remain)",
            fresh.len(),
            registry.pool_size(),
            registry.unpool_size()
        );

        Ok(SelectionOutcome {
            added: fresh,
            snapped,
            duplicates_replaced,
        })
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }
}
