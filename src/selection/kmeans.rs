//! Fixed-Center K-Means
//!
//! Lloyd iteration where a prefix of the centers is pinned: the fixed centers
//! take part in every assignment step (they can absorb points) but are never
//! recomputed. Free centers are seeded by k-means++ or uniformly at random and
//! move as usual. Seeding new clusters around an already-pooled set of samples
//! is the whole point of the variant.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::utils::error::{ActiveSslError, Result};

/// Initialization strategy for the free centers
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitStrategy {
    /// Weighted seeding away from all existing centers (fixed ones included)
    KMeansPlusPlus,
    /// Uniform draws from the data points
    Random,
}

/// Result of one clustering run
#[derive(Debug, Clone)]
pub struct KMeansFit {
    /// `[n_fixed + n_free, dim]`; the first `n_fixed` rows are the supplied
    /// fixed centers, unchanged
    pub centers: Array2<f32>,
    /// Nearest-center assignment for every data row
    pub labels: Array1<usize>,
    /// Iterations actually run
    pub n_iter: usize,
    /// Whether the free centers moved less than `tol` before `max_iter`
    pub converged: bool,
}

/// K-means with a pinned center prefix
#[derive(Debug, Clone)]
pub struct FixedCenterKMeans {
    n_free_clusters: usize,
    init: InitStrategy,
    max_iter: usize,
    tol: f32,
    seed: u64,
}

impl FixedCenterKMeans {
    pub fn new(n_free_clusters: usize, init: InitStrategy, max_iter: usize, tol: f32, seed: u64) -> Self {
        Self {
            n_free_clusters,
            init,
            max_iter,
            tol,
            seed,
        }
    }

    /// Cluster `data` around `fixed_centers` plus `n_free_clusters` free ones.
    ///
    /// `fixed_centers` may be empty, which degenerates to standard k-means.
    pub fn fit_predict_centers(
        &self,
        data: &Array2<f32>,
        fixed_centers: &Array2<f32>,
    ) -> Result<KMeansFit> {
        if data.nrows() == 0 {
            return Err(ActiveSslError::Config(
                "k-means input data is empty".to_string(),
            ));
        }
        if self.n_free_clusters == 0 {
            return Err(ActiveSslError::Config(
                "k-means needs at least one free cluster".to_string(),
            ));
        }
        if fixed_centers.nrows() > 0 && fixed_centers.ncols() != data.ncols() {
            return Err(ActiveSslError::Config(format!(
                "fixed centers have dim {} but data has dim {}",
                fixed_centers.ncols(),
                data.ncols()
            )));
        }

        let n_fixed = fixed_centers.nrows();
        let n_total = n_fixed + self.n_free_clusters;
        let dim = data.ncols();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let mut centers = Array2::zeros((n_total, dim));
        centers
            .slice_mut(ndarray::s![..n_fixed, ..])
            .assign(fixed_centers);
        self.init_free_centers(data, &mut centers, n_fixed, &mut rng);

        let mut labels = vec![0usize; data.nrows()];
        let mut n_iter = 0;
        let mut converged = false;

        for iter in 0..self.max_iter {
            n_iter = iter + 1;

            assign_points(data, &centers, &mut labels);

            let (new_free, counts) =
                mean_free_centers(data, &labels, n_fixed, self.n_free_clusters, dim);
            let mut new_centers = centers.clone();
            new_centers
                .slice_mut(ndarray::s![n_fixed.., ..])
                .assign(&new_free);
            reseed_empty_clusters(&mut new_centers, &counts, n_fixed, data, &mut rng);

            let delta = free_center_delta(&new_centers, &centers, n_fixed);
            centers = new_centers;

            if delta < self.tol {
                debug!("k-means converged at iteration {} (delta {:.6})", n_iter, delta);
                converged = true;
                break;
            }
        }

        // Assignments must match the centers we return.
        assign_points(data, &centers, &mut labels);

        Ok(KMeansFit {
            centers,
            labels: Array1::from_vec(labels),
            n_iter,
            converged,
        })
    }

    fn init_free_centers(
        &self,
        data: &Array2<f32>,
        centers: &mut Array2<f32>,
        n_fixed: usize,
        rng: &mut ChaCha8Rng,
    ) {
        let n = data.nrows();
        match self.init {
            InitStrategy::Random => {
                for c in n_fixed..centers.nrows() {
                    let pick = rng.gen_range(0..n);
                    centers.row_mut(c).assign(&data.row(pick));
                }
            }
            InitStrategy::KMeansPlusPlus => {
                // Seed proportionally to the squared distance from every
                // center placed so far, so free centers land away from the
                // pinned ones as well as from each other.
                let mut min_distances = vec![f32::INFINITY; n];
                for c in 0..n_fixed {
                    update_min_distances(data, &centers.row(c), &mut min_distances);
                }

                for c in n_fixed..centers.nrows() {
                    let pick = if c == 0 {
                        rng.gen_range(0..n)
                    } else {
                        let weights: Vec<f32> =
                            min_distances.iter().map(|&d| d * d).collect();
                        match WeightedIndex::new(&weights) {
                            Ok(dist) => dist.sample(rng),
                            // All mass sits on already-chosen points.
                            Err(_) => rng.gen_range(0..n),
                        }
                    };
                    centers.row_mut(c).assign(&data.row(pick));
                    update_min_distances(data, &centers.row(c), &mut min_distances);
                }
            }
        }
    }
}

/// Lower each point's distance-to-nearest-center given one more center
fn update_min_distances(
    data: &Array2<f32>,
    center: &ArrayView1<f32>,
    min_distances: &mut [f32],
) {
    for (i, point) in data.axis_iter(Axis(0)).enumerate() {
        let dist = squared_distance(&point, center);
        if dist < min_distances[i] {
            min_distances[i] = dist;
        }
    }
}

/// Squared Euclidean distance between two vectors
pub(crate) fn squared_distance(a: &ArrayView1<f32>, b: &ArrayView1<f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Index and squared distance of the nearest row of `centers` to `point`
pub(crate) fn find_nearest_center(
    point: &ArrayView1<f32>,
    centers: &Array2<f32>,
) -> (usize, f32) {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (c, center) in centers.axis_iter(Axis(0)).enumerate() {
        let dist = squared_distance(point, &center);
        if dist < best_dist {
            best_dist = dist;
            best = c;
        }
    }
    (best, best_dist)
}

fn assign_points(data: &Array2<f32>, centers: &Array2<f32>, labels: &mut [usize]) {
    for (i, point) in data.axis_iter(Axis(0)).enumerate() {
        labels[i] = find_nearest_center(&point, centers).0;
    }
}

/// Mean of the points assigned to each free cluster, plus assignment counts.
/// A free cluster with no points keeps a zero row; the caller reseeds it.
fn mean_free_centers(
    data: &Array2<f32>,
    labels: &[usize],
    n_fixed: usize,
    n_free: usize,
    dim: usize,
) -> (Array2<f32>, Vec<usize>) {
    let mut sums = Array2::<f32>::zeros((n_free, dim));
    let mut counts = vec![0usize; n_free];

    for (i, &label) in labels.iter().enumerate() {
        if label >= n_fixed {
            let c = label - n_fixed;
            counts[c] += 1;
            let row = data.row(i);
            let mut sum = sums.row_mut(c);
            sum += &row;
        }
    }

    for (c, &count) in counts.iter().enumerate() {
        if count > 0 {
            sums.row_mut(c).mapv_inplace(|v| v / count as f32);
        }
    }

    (sums, counts)
}

/// Reinitialize empty free clusters from a random data point
fn reseed_empty_clusters(
    centers: &mut Array2<f32>,
    counts: &[usize],
    n_fixed: usize,
    data: &Array2<f32>,
    rng: &mut ChaCha8Rng,
) {
    for (c, &count) in counts.iter().enumerate() {
        if count == 0 {
            let pick = rng.gen_range(0..data.nrows());
            centers.row_mut(n_fixed + c).assign(&data.row(pick));
        }
    }
}

/// RMS movement of the free centers between iterations
fn free_center_delta(curr: &Array2<f32>, prev: &Array2<f32>, n_fixed: usize) -> f32 {
    let free = curr.nrows() - n_fixed;
    if free == 0 {
        return 0.0;
    }
    let delta_squared: f32 = (n_fixed..curr.nrows())
        .map(|c| squared_distance(&curr.row(c), &prev.row(c)))
        .sum();
    (delta_squared / (free * curr.ncols()) as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Tight blob of `n` points around (cx, cy)
    fn blob(cx: f32, cy: f32, n: usize, seed: u64) -> Vec<[f32; 2]> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                [
                    cx + rng.gen_range(-0.5..0.5),
                    cy + rng.gen_range(-0.5..0.5),
                ]
            })
            .collect()
    }

    fn four_blobs() -> Array2<f32> {
        let mut points = Vec::new();
        points.extend(blob(0.0, 0.0, 50, 1));
        points.extend(blob(10.0, 10.0, 50, 2));
        points.extend(blob(0.0, 10.0, 50, 3));
        points.extend(blob(10.0, 0.0, 50, 4));

        let mut data = Array2::zeros((points.len(), 2));
        for (i, p) in points.iter().enumerate() {
            data[(i, 0)] = p[0];
            data[(i, 1)] = p[1];
        }
        data
    }

    #[test]
    fn test_fixed_centers_stay_pinned() {
        let data = four_blobs();
        let fixed = array![[0.0, 0.0], [10.0, 10.0]];

        let km = FixedCenterKMeans::new(2, InitStrategy::KMeansPlusPlus, 300, 1e-4, 42);
        let fit = km.fit_predict_centers(&data, &fixed).unwrap();

        assert_eq!(fit.centers.nrows(), 4);
        assert_eq!(fit.centers.row(0), fixed.row(0));
        assert_eq!(fit.centers.row(1), fixed.row(1));
    }

    #[test]
    fn test_free_centers_find_free_blobs() {
        let data = four_blobs();
        let fixed = array![[0.0, 0.0], [10.0, 10.0]];

        let km = FixedCenterKMeans::new(2, InitStrategy::KMeansPlusPlus, 300, 1e-4, 42);
        let fit = km.fit_predict_centers(&data, &fixed).unwrap();
        assert!(fit.converged);

        // The two free centers should settle near (0,10) and (10,0), in
        // either order.
        let free: Vec<(f32, f32)> = (2..4)
            .map(|c| (fit.centers[(c, 0)], fit.centers[(c, 1)]))
            .collect();
        let near = |center: (f32, f32), target: (f32, f32)| {
            (center.0 - target.0).abs() < 1.0 && (center.1 - target.1).abs() < 1.0
        };
        assert!(
            (near(free[0], (0.0, 10.0)) && near(free[1], (10.0, 0.0)))
                || (near(free[0], (10.0, 0.0)) && near(free[1], (0.0, 10.0))),
            "free centers ended up at {:?}",
            free
        );
    }

    #[test]
    fn test_fixed_centers_absorb_points() {
        let data = four_blobs();
        let fixed = array![[0.0, 0.0], [10.0, 10.0]];

        let km = FixedCenterKMeans::new(2, InitStrategy::KMeansPlusPlus, 300, 1e-4, 7);
        let fit = km.fit_predict_centers(&data, &fixed).unwrap();

        // The blobs around the pinned centers assign to them even though the
        // pinned centers never moved.
        let absorbed = fit.labels.iter().filter(|&&l| l < 2).count();
        assert!(absorbed >= 90, "only {} points assigned to fixed centers", absorbed);
    }

    #[test]
    fn test_deterministic_given_seed() {
        let data = four_blobs();
        let fixed = array![[0.0, 0.0]];

        let km = FixedCenterKMeans::new(3, InitStrategy::KMeansPlusPlus, 300, 1e-4, 11);
        let a = km.fit_predict_centers(&data, &fixed).unwrap();
        let b = km.fit_predict_centers(&data, &fixed).unwrap();
        assert_eq!(a.centers, b.centers);
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn test_no_fixed_centers_is_plain_kmeans() {
        let data = four_blobs();
        let fixed = Array2::zeros((0, 2));

        let km = FixedCenterKMeans::new(4, InitStrategy::KMeansPlusPlus, 300, 1e-4, 5);
        let fit = km.fit_predict_centers(&data, &fixed).unwrap();
        assert_eq!(fit.centers.nrows(), 4);
        assert!(fit.converged);
    }

    #[test]
    fn test_random_init_converges_too() {
        let data = four_blobs();
        let fixed = array![[0.0, 0.0], [10.0, 10.0]];

        let km = FixedCenterKMeans::new(2, InitStrategy::Random, 300, 1e-4, 42);
        let fit = km.fit_predict_centers(&data, &fixed).unwrap();
        assert_eq!(fit.centers.row(0), fixed.row(0));
        assert!(fit.converged);
    }

    #[test]
    fn test_rejects_empty_data() {
        let data = Array2::zeros((0, 2));
        let km = FixedCenterKMeans::new(2, InitStrategy::Random, 10, 1e-4, 0);
        assert!(matches!(
            km.fit_predict_centers(&data, &Array2::zeros((0, 2))),
            Err(ActiveSslError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_dim_mismatch() {
        let data = four_blobs();
        let fixed = Array2::zeros((1, 3));
        let km = FixedCenterKMeans::new(2, InitStrategy::Random, 10, 1e-4, 0);
        assert!(matches!(
            km.fit_predict_centers(&data, &fixed),
            Err(ActiveSslError::Config(_))
        ));
    }
}
