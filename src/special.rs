//! Special functions needed by the likelihoods that `statrs` does not cover

pub use statrs::function::gamma::ln_gamma;

const SERIES_MAX_TERMS: usize = 100_000;
const SERIES_EPSILON: f64 = 1e-15;

/// `ln(e^a + e^b)` without overflow
pub fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Logistic function
pub fn expit(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Gauss hypergeometric function ₂F₁(a, b; c; z) by its power series.
///
/// Only valid for `0 <= z < 1` and `c` not a non-positive integer. The
/// result may overflow to infinity; see [`ln_hyp2f1`].
pub fn hyp2f1(a: f64, b: f64, c: f64, z: f64) -> f64 {
    let mut term = 1.0;
    let mut sum = 1.0;
    for n in 0..SERIES_MAX_TERMS {
        let n = n as f64;
        term *= (a + n) * (b + n) / ((c + n) * (n + 1.0)) * z;
        sum += term;
        if !sum.is_finite() || term.abs() <= SERIES_EPSILON * sum.abs() {
            break;
        }
    }
    sum
}

/// `ln ₂F₁(a, b; c; z)`, falling back to Euler's transformation
/// `₂F₁(a,b;c;z) = (1-z)^(c-a-b) ₂F₁(c-a, c-b; c; z)` when the direct
/// series overflows or loses its sign.
pub fn ln_hyp2f1(a: f64, b: f64, c: f64, z: f64) -> f64 {
    let direct = hyp2f1(a, b, c, z);
    if direct.is_finite() && direct > 0.0 {
        return direct.ln();
    }
    hyp2f1(c - a, c - b, c, z).ln() + (c - a - b) * (1.0 - z).ln()
}
