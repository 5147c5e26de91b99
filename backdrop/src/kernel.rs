//! CPU reference of the Gaussian kernel evaluated by `blur.wgsl`.
//!
//! The shader samples a square of `(2·steps+1)²` texels at offsets `(x·size, y·size)` and
//! weights each with the 2D Gaussian density for `σ = 5`. The weights are not normalized, so
//! small kernels come out slightly darker than the source.

use crate::settings::BlurParameters;

pub const SIGMA: f32 = 5.0;

/// Largest kernel half-width evaluated. `blur.wgsl` clamps the same way.
pub const MAX_STEPS: i32 = 64;

/// Output alpha is `ALPHA_HEADROOM - darkness`. Values above `1.0` are clamped by the blend
/// stage.
pub const ALPHA_HEADROOM: f32 = 1.1;

pub fn gaussian_weight(x: i32, y: i32) -> f32 {
    let (x, y) = (x as f32, y as f32);
    let two_sigma_sq = 2.0 * SIGMA * SIGMA;
    (-(x * x + y * y) / two_sigma_sq).exp() / (std::f32::consts::PI * two_sigma_sq)
}

/// Half-width actually evaluated: at most [`MAX_STEPS`], and any negative value takes no
/// samples.
pub fn effective_steps(steps: i32) -> i32 {
    steps.clamp(-1, MAX_STEPS)
}

/// Number of texture samples per pixel. Zero for negative `steps`.
pub fn sample_count(steps: i32) -> usize {
    let steps = effective_steps(steps);
    if steps < 0 {
        return 0;
    }
    let side = 2 * steps as usize + 1;
    side * side
}

pub fn kernel_weight_sum(steps: i32) -> f32 {
    let steps = effective_steps(steps);
    (-steps..=steps)
        .flat_map(|x| (-steps..=steps).map(move |y| gaussian_weight(x, y)))
        .sum()
}

pub fn output_alpha(darkness: f32) -> f32 {
    ALPHA_HEADROOM - darkness
}

/// Evaluates one output pixel the way the fragment shader does.
pub fn blur_sample<F>(sample: F, uv: [f32; 2], params: &BlurParameters) -> [f32; 4]
where
    F: Fn([f32; 2]) -> [f32; 4],
{
    let mut sum = [0.0f32; 4];
    let steps = effective_steps(params.steps);

    for x in -steps..=steps {
        for y in -steps..=steps {
            let texel = sample([
                uv[0] + x as f32 * params.size,
                uv[1] + y as f32 * params.size,
            ]);
            let weight = gaussian_weight(x, y);
            for (acc, c) in sum.iter_mut().zip(texel) {
                *acc += c * weight;
            }
        }
    }

    sum[3] = output_alpha(params.darkness);
    sum
}
