//! Radio signal calculations.
//!
//! Contains helpers for:
//! - Signal-to-noise ratio and the MAC decisions built on it
//! - Static (per link) and dynamic (per transmission) Gaussian fading
//! - MAC waiting and backoff times
//!
//! Units:
//! - Signal and noise: linear, relative to a transmit power of 1.0
//! - Time: simulator ticks

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::config::MacConfig;
use crate::scheduler::SimTime;

/// Signal-to-noise ratio seen by a receiver.
///
/// # Formula
///
/// ```text
/// SNR = signal / (noise_floor_variance + noise)
/// ```
///
/// The receiver's own noise floor keeps the ratio finite on a silent
/// channel.
pub fn calculate_snr(config: &MacConfig, signal: f64, noise: f64) -> f64 {
    signal / (config.noise_floor_variance + noise)
}

/// Whether an ongoing reception is lost to the current noise level.
pub fn is_message_corrupted(config: &MacConfig, signal: f64, noise: f64) -> bool {
    calculate_snr(config, signal, noise) < config.corruption_threshold
}

/// Whether a new signal is strong enough to start a reception.
pub fn is_receivable(config: &MacConfig, signal: f64, noise: f64) -> bool {
    calculate_snr(config, signal, noise) > config.receive_start_threshold
}

/// Carrier sense: the channel is free while the noise stays below
/// `noise_multiplier × noise_floor_variance`.
pub fn is_channel_free(config: &MacConfig, noise: f64) -> bool {
    noise < config.noise_multiplier * config.noise_floor_variance
}

/// Wait before the first channel probe of a send.
pub fn generate_waiting_time<R: Rng + ?Sized>(config: &MacConfig, rng: &mut R) -> SimTime {
    config.min_waiting_time + random_part(config.random_waiting_time, rng)
}

/// Wait before probing a busy channel again.
pub fn generate_backoff_time<R: Rng + ?Sized>(config: &MacConfig, rng: &mut R) -> SimTime {
    config.min_backoff_time + random_part(config.random_backoff_time, rng)
}

/// Uniform integer in `[0, range)`, or 0 for an empty range.
pub fn random_part<R: Rng + ?Sized>(range: SimTime, rng: &mut R) -> SimTime {
    (rng.gen_range(0.0..1.0) * range as f64) as SimTime
}

/// Static fading of a link at `distance`.
///
/// # Formula
///
/// ```text
/// F = 1 / (1 + (d / d_unit)^falloff) × (1 + σ_static × N(0, 1))
/// ```
///
/// Sampled once per ordered node pair when neighborhoods are computed, so
/// the same link keeps its quality for the whole run. The result is
/// clamped at zero.
pub fn calculate_static_fading<R: Rng + ?Sized>(distance: f64, distance_unit: f64, falloff: f64, static_random_factor: f64, rng: &mut R) -> f64 {
    let attenuation = 1.0 / (1.0 + (distance / distance_unit).powf(falloff));
    let gaussian: f64 = StandardNormal.sample(rng);
    (attenuation * (1.0 + static_random_factor * gaussian)).max(0.0)
}

/// Signal strength of one transmission over a link with the given static
/// fading, including a fresh dynamic fading sample.
pub fn calculate_dynamic_strength<R: Rng + ?Sized>(power: f64, static_fading: f64, dynamic_random_factor: f64, rng: &mut R) -> f64 {
    let gaussian: f64 = StandardNormal.sample(rng);
    (power * static_fading * (1.0 + dynamic_random_factor * gaussian)).max(0.0)
}
