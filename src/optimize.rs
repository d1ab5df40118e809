//! Derivative-free minimisation (Nelder–Mead simplex)

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;
/// Converged runs are restarted from their best vertex this many times to
/// guard against a collapsed simplex.
const RESTARTS: usize = 2;

/// Nelder–Mead settings
#[derive(Debug, Clone, Copy)]
pub struct NelderMead {
    pub max_iters: usize,
    /// Spread of objective values across the simplex at which the search
    /// stops, relative to their magnitude (absolute near zero)
    pub tolerance: f64,
    /// Offset of the initial simplex vertices along each axis
    pub initial_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iters: 5_000,
            tolerance: 1e-10,
            initial_step: 0.5,
        }
    }
}

/// Outcome of a minimisation
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl NelderMead {
    /// Minimise `objective` starting from `x0`. NaN objective values are
    /// treated as +inf so the simplex steps away from them.
    pub fn minimize<F>(&self, objective: F, x0: &[f64]) -> Minimum
    where
        F: Fn(&[f64]) -> f64,
    {
        let eval = |x: &[f64]| {
            let v = objective(x);
            if v.is_nan() {
                f64::INFINITY
            } else {
                v
            }
        };

        let mut best = self.run(&eval, x0, self.max_iters);
        for _ in 0..RESTARTS {
            if !best.converged || best.iterations >= self.max_iters {
                break;
            }
            let budget = self.max_iters - best.iterations;
            let restarted = self.run(&eval, &best.x, budget);
            let improved = !self.within_tolerance(restarted.value, best.value);
            best = Minimum {
                iterations: best.iterations + restarted.iterations,
                ..restarted
            };
            if !improved {
                break;
            }
        }
        best
    }

    /// Mixed absolute/relative closeness of two objective values
    fn within_tolerance(&self, low: f64, high: f64) -> bool {
        let spread = high - low;
        spread.is_finite() && spread <= self.tolerance * (1.0 + 0.5 * (low.abs() + high.abs()))
    }

    fn run<F>(&self, eval: &F, x0: &[f64], budget: usize) -> Minimum
    where
        F: Fn(&[f64]) -> f64,
    {
        let n = x0.len();
        let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
        simplex.push((x0.to_vec(), eval(x0)));
        for i in 0..n {
            let mut vertex = x0.to_vec();
            vertex[i] += self.initial_step;
            let value = eval(&vertex);
            simplex.push((vertex, value));
        }

        let mut iterations = 0;
        let mut converged = false;
        loop {
            simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
            let best = simplex[0].1;
            let worst = simplex[n].1;
            if self.within_tolerance(best, worst) {
                converged = true;
                break;
            }
            if iterations >= budget {
                break;
            }
            iterations += 1;

            let centroid = centroid(&simplex[..n]);
            let worst_point = simplex[n].0.clone();

            let reflected = along(&centroid, &worst_point, -REFLECTION);
            let f_reflected = eval(&reflected);

            if f_reflected < best {
                let expanded = along(&centroid, &worst_point, -REFLECTION * EXPANSION);
                let f_expanded = eval(&expanded);
                simplex[n] = if f_expanded < f_reflected {
                    (expanded, f_expanded)
                } else {
                    (reflected, f_reflected)
                };
                continue;
            }
            if f_reflected < simplex[n - 1].1 {
                simplex[n] = (reflected, f_reflected);
                continue;
            }

            let (contracted, f_contracted) = if f_reflected < worst {
                let point = along(&centroid, &worst_point, -REFLECTION * CONTRACTION);
                let value = eval(&point);
                (point, value)
            } else {
                let point = along(&centroid, &worst_point, CONTRACTION);
                let value = eval(&point);
                (point, value)
            };
            if f_contracted < worst.min(f_reflected) {
                simplex[n] = (contracted, f_contracted);
                continue;
            }

            let anchor = simplex[0].0.clone();
            for vertex in simplex.iter_mut().skip(1) {
                let shrunk: Vec<f64> = anchor
                    .iter()
                    .zip(&vertex.0)
                    .map(|(a, v)| a + SHRINK * (v - a))
                    .collect();
                let value = eval(&shrunk);
                *vertex = (shrunk, value);
            }
        }

        let (x, value) = simplex.swap_remove(0);
        Minimum {
            x,
            value,
            iterations,
            converged,
        }
    }
}

fn centroid(points: &[(Vec<f64>, f64)]) -> Vec<f64> {
    let dim = points[0].0.len();
    let mut c = vec![0.0; dim];
    for (p, _) in points {
        for (ci, pi) in c.iter_mut().zip(p) {
            *ci += pi;
        }
    }
    let count = points.len() as f64;
    c.iter_mut().for_each(|ci| *ci /= count);
    c
}

/// `centroid + coef * (point - centroid)`
fn along(centroid: &[f64], point: &[f64], coef: f64) -> Vec<f64> {
    centroid
        .iter()
        .zip(point)
        .map(|(c, p)| c + coef * (p - c))
        .collect()
}
