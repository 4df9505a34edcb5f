//! Batch Fetcher
//!
//! Draws index-aligned mini-batches from the current pool/unpool split: a
//! pool half with true labels and an unpool half whose indices are enough to
//! look up soft labels. Training batches also carry augmented image variants
//! (random horizontal flip plus a shifted zero-padded crop, the standard
//! CIFAR-style recipe); evaluation fetches are deterministic and raw.

use ndarray::{Array2, Axis};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::BatchSizes;
use crate::dataset::registry::SampleRegistry;
use crate::utils::error::{ActiveSslError, Result};

/// Image dimensions for the flat per-sample vectors (CHW layout)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageShape {
    /// Flattened length of one sample
    pub fn len(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One half of a training batch (pool or unpool)
#[derive(Debug, Clone)]
pub struct BatchHalf {
    /// Absolute train indices, in draw order
    pub indices: Vec<usize>,
    /// Raw images `[len, c*h*w]`
    pub images: Array2<f32>,
    /// True labels (meaningful for the pool half; carried for the unpool
    /// half only for evaluation bookkeeping)
    pub labels: Vec<usize>,
    /// Augmented image variants, index-aligned to `images`
    pub images_aug: Array2<f32>,
}

/// A full training mini-batch: pool half plus unpool half
#[derive(Debug, Clone)]
pub struct TrainBatch {
    pub pool: BatchHalf,
    pub unpool: BatchHalf,
}

/// Fetches pool/unpool mini-batches from in-memory image data
#[derive(Debug, Clone)]
pub struct BatchFetcher {
    /// `[n_samples, c*h*w]` flat image data, row per train sample
    images: Array2<f32>,
    labels: Vec<usize>,
    shape: ImageShape,
    batch_sizes: BatchSizes,
    /// Maximum crop shift in pixels (0 disables the shifted crop)
    crop_pad: usize,
    rng: ChaCha8Rng,
}

impl BatchFetcher {
    /// Default crop shift used for 32x32-class images
    pub const DEFAULT_CROP_PAD: usize = 4;

    pub fn new(
        images: Array2<f32>,
        labels: Vec<usize>,
        shape: ImageShape,
        batch_sizes: BatchSizes,
        seed: u64,
    ) -> Result<Self> {
        if images.ncols() != shape.len() {
            return Err(ActiveSslError::Config(format!(
                "image row length {} does not match shape {}x{}x{}",
                images.ncols(),
                shape.channels,
                shape.height,
                shape.width
            )));
        }
        if labels.len() != images.nrows() {
            return Err(ActiveSslError::LengthMismatch {
                expected: images.nrows(),
                actual: labels.len(),
            });
        }

        Ok(Self {
            images,
            labels,
            shape,
            batch_sizes,
            crop_pad: Self::DEFAULT_CROP_PAD,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// Override the crop shift (0 disables shifting)
    pub fn with_crop_pad(mut self, crop_pad: usize) -> Self {
        self.crop_pad = crop_pad;
        self
    }

    /// Draw one training batch from the current split
    pub fn fetch(&mut self, registry: &SampleRegistry) -> Result<TrainBatch> {
        let pool_indices = registry.pool_indices();
        let unpool_indices = registry.unpool_indices();

        let pool = self.fetch_half(&pool_indices, self.batch_sizes.pool_batch_size)?;
        let unpool = self.fetch_half(&unpool_indices, self.batch_sizes.unpool_batch_size)?;

        Ok(TrainBatch { pool, unpool })
    }

    fn fetch_half(&mut self, from: &[usize], count: usize) -> Result<BatchHalf> {
        if count > from.len() {
            return Err(ActiveSslError::InsufficientSamples {
                requested: count,
                available: from.len(),
            });
        }

        let drawn: Vec<usize> = index::sample(&mut self.rng, from.len(), count)
            .iter()
            .map(|i| from[i])
            .collect();

        let (images, labels) = self.gather(&drawn)?;
        let mut images_aug = Array2::zeros(images.dim());
        for (i, row) in images.axis_iter(Axis(0)).enumerate() {
            let augmented =
                augment_sample(&row.to_vec(), self.shape, self.crop_pad, &mut self.rng);
            images_aug
                .row_mut(i)
                .assign(&ndarray::ArrayView1::from(&augmented));
        }

        Ok(BatchHalf {
            indices: drawn,
            images,
            labels,
            images_aug,
        })
    }

    /// Deterministic fetch of raw images and labels for an explicit index
    /// list, used by the full-set embedding sweep
    pub fn fetch_eval(&self, indices: &[usize]) -> Result<(Array2<f32>, Vec<usize>)> {
        self.gather(indices)
    }

    fn gather(&self, indices: &[usize]) -> Result<(Array2<f32>, Vec<usize>)> {
        for &idx in indices {
            if idx >= self.images.nrows() {
                return Err(ActiveSslError::InvariantViolation(format!(
                    "sample index {} is out of range (have {} samples)",
                    idx,
                    self.images.nrows()
                )));
            }
        }

        let images = self.images.select(Axis(0), indices);
        let labels = indices.iter().map(|&i| self.labels[i]).collect();
        Ok((images, labels))
    }

    /// Number of samples backing this fetcher
    pub fn num_samples(&self) -> usize {
        self.images.nrows()
    }

    /// Configured batch split
    pub fn batch_sizes(&self) -> BatchSizes {
        self.batch_sizes
    }
}

/// Random horizontal flip plus a random shifted crop with zero padding
fn augment_sample(
    image: &[f32],
    shape: ImageShape,
    crop_pad: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<f32> {
    let mut out = image.to_vec();

    if rng.gen::<bool>() {
        flip_horizontal(&mut out, shape);
    }

    if crop_pad > 0 {
        let pad = crop_pad as isize;
        let dx = rng.gen_range(-pad..=pad);
        let dy = rng.gen_range(-pad..=pad);
        out = shift(&out, shape, dx, dy);
    }

    out
}

fn flip_horizontal(image: &mut [f32], shape: ImageShape) {
    let (h, w) = (shape.height, shape.width);
    for c in 0..shape.channels {
        let plane = &mut image[c * h * w..(c + 1) * h * w];
        for y in 0..h {
            plane[y * w..(y + 1) * w].reverse();
        }
    }
}

fn shift(image: &[f32], shape: ImageShape, dx: isize, dy: isize) -> Vec<f32> {
    let (h, w) = (shape.height as isize, shape.width as isize);
    let mut out = vec![0.0; image.len()];

    for c in 0..shape.channels {
        let offset = c * (h * w) as usize;
        for y in 0..h {
            let src_y = y - dy;
            if src_y < 0 || src_y >= h {
                continue;
            }
            for x in 0..w {
                let src_x = x - dx;
                if src_x < 0 || src_x >= w {
                    continue;
                }
                out[offset + (y * w + x) as usize] = image[offset + (src_y * w + src_x) as usize];
            }
        }
    }

    out
}
