//! Parameter initialization.
//!
//! Every initializer draws from a caller-supplied RNG so that a seeded
//! `StdRng` reproduces the exact same weights across runs.

use mlx_core::{DType, Result, Shape, Tensor};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Deterministic RNG for module construction.
pub fn seeded(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Parameter with elements drawn uniformly from `[low, high)`.
pub fn uniform(rng: &mut impl Rng, shape: &Shape, low: f32, high: f32) -> Result<Tensor> {
    let n = shape.numel() as usize;
    let data: Vec<f32> = (0..n).map(|_| rng.random_range(low..high)).collect();
    Tensor::new_parameter(data, shape, DType::F32)
}

/// Parameter filled with a constant.
pub fn constant(shape: &Shape, value: f32) -> Result<Tensor> {
    let n = shape.numel() as usize;
    Tensor::new_parameter(vec![value; n], shape, DType::F32)
}
