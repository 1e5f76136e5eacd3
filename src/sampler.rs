//! Random samplers built on a single uniform stream.
//!
//! Every function draws its entropy from `rng.random::<f64>()` only, so the
//! whole simulation is reproducible from the state of one generator.

use anyhow::{Result, bail};
use rand::Rng;
use std::f64::consts::PI;

/// Maximum number of Marsaglia-Tsang proposals per gamma draw.
///
/// Each proposal is accepted with probability above 0.95, so running out of
/// tries has probability below `0.05^1000`.
pub const MAX_GAMMA_TRIES: usize = 1000;

/// Sample a normal variate with the Box-Muller transform.
///
/// Two fresh uniforms are consumed on every call.
pub fn sample_normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    // Map [0, 1) to (0, 1] to keep the logarithm finite.
    let u_1 = 1.0 - rng.random::<f64>();
    let u_2 = rng.random::<f64>();
    let z = (-2.0 * u_1.ln()).sqrt() * (2.0 * PI * u_2).cos();
    z * std_dev + mean
}

#[allow(dead_code)]
pub fn sample_log_normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    sample_normal(rng, mean, std_dev).exp()
}

/// Sample an exponential variate by inversion. `rate` must be positive.
pub fn sample_exponential<R: Rng + ?Sized>(rng: &mut R, rate: f64) -> f64 {
    -(1.0 - rng.random::<f64>()).ln() / rate
}

/// Return `true` with probability `p`.
///
/// `p` is not clamped: values below 0 never succeed and values above 1 always do.
pub fn sample_bernoulli<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
    rng.random::<f64>() < p
}

/// Sample a gamma variate with shape `alpha` and rate `beta`.
///
/// Uses the Marsaglia-Tsang method. Shapes below one are boosted by one and
/// the result rescaled by `U^(1/alpha)`.
///
/// # Errors
/// Returns an error if no proposal is accepted within [`MAX_GAMMA_TRIES`].
pub fn sample_gamma<R: Rng + ?Sized>(rng: &mut R, alpha: f64, beta: f64) -> Result<f64> {
    if alpha < 1.0 {
        let u = rng.random::<f64>();
        let boosted = sample_gamma_unit(rng, alpha + 1.0)?;
        return Ok(boosted / beta * u.powf(1.0 / alpha));
    }
    Ok(sample_gamma_unit(rng, alpha)? / beta)
}

fn sample_gamma_unit<R: Rng + ?Sized>(rng: &mut R, alpha: f64) -> Result<f64> {
    let d = alpha - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();

    for _ in 0..MAX_GAMMA_TRIES {
        let x = sample_normal(rng, 0.0, 1.0);
        let v = (1.0 + c * x).powi(3);
        if v <= 0.0 {
            continue;
        }

        let u = rng.random::<f64>();
        let x_2 = x * x;
        if u < 1.0 - 0.0331 * x_2 * x_2 || u.ln() < 0.5 * x_2 + d * (1.0 - v + v.ln()) {
            return Ok(d * v);
        }
    }

    bail!("gamma sampling with shape {alpha} rejected {MAX_GAMMA_TRIES} proposals");
}
