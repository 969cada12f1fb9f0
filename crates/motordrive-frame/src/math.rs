//! Small numeric helpers shared by the codec and the session.

/// Clamp `value` into `[min, max]`. NaN passes through unchanged.
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Map a fraction in `[0, 1]` onto `[min, max]`.
pub fn interpolate(fraction: f32, min: f32, max: f32) -> f32 {
    fraction * max + (1.0 - fraction) * min
}

/// Inverse of [`interpolate`]. A zero-width range yields a non-finite value.
pub fn deinterpolate(value: f32, min: f32, max: f32) -> f32 {
    (value - min) / (max - min)
}

/// Exponential moving average; `gamma` weights the new sample.
pub fn exp_average(value: f64, last: f64, gamma: f64) -> f64 {
    value * gamma + last * (1.0 - gamma)
}

/// Ticks elapsed from `earlier` to `later` on a counter that wraps at 2^32.
pub fn wrapping_diff(earlier: u32, later: u32) -> u32 {
    later.wrapping_sub(earlier)
}
