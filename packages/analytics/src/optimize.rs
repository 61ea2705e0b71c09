//! One-dimensional bounded maximisation (Brent's method).

use crate::AnalyticsError;

/// Location and value of a maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Optimum {
    /// Argument at the maximum.
    pub x: f64,
    /// Function value at `x`.
    pub value: f64,
    /// Iterations used.
    pub iterations: usize,
}

/// Maximises `f` on the open interval `(lower, upper)` by golden-section
/// search with parabolic interpolation. `f` is never evaluated at the
/// end points.
///
/// # Errors
///
/// Returns [`AnalyticsError::NonConvergence`] if the bracket has not
/// shrunk to `tolerance` within `max_iterations` steps.
#[allow(clippy::float_cmp, clippy::many_single_char_names)]
pub fn maximize<F>(
    mut f: F,
    lower: f64,
    upper: f64,
    tolerance: f64,
    max_iterations: usize,
) -> Result<Optimum, AnalyticsError>
where
    F: FnMut(f64) -> f64,
{
    let golden = (3.0 - 5.0f64.sqrt()) * 0.5;
    let eps = f64::EPSILON.sqrt();
    let tol3 = tolerance / 3.0;

    let mut objective = |x: f64| -f(x);

    let (mut a, mut b) = (lower, upper);
    let mut x = golden.mul_add(b - a, a);
    let (mut v, mut w) = (x, x);
    let mut fx = objective(x);
    let (mut fv, mut fw) = (fx, fx);
    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;

    for iteration in 0..max_iterations {
        let xm = (a + b) * 0.5;
        let tol1 = eps.mul_add(x.abs(), tol3);
        let t2 = tol1 * 2.0;

        if (x - xm).abs() <= t2 - (b - a) * 0.5 {
            return Ok(Optimum {
                x,
                value: -fx,
                iterations: iteration,
            });
        }

        let mut p = 0.0;
        let mut q = 0.0;
        let mut r = 0.0;
        if e.abs() > tol1 {
            r = (x - w) * (fx - fv);
            q = (x - v) * (fx - fw);
            p = (x - v).mul_add(q, -(x - w) * r);
            q = (q - r) * 2.0;
            if q > 0.0 {
                p = -p;
            } else {
                q = -q;
            }
            r = e;
            e = d;
        }

        if p.abs() >= (0.5 * q * r).abs() || p <= q * (a - x) || p >= q * (b - x) {
            e = if x < xm { b - x } else { a - x };
            d = golden * e;
        } else {
            d = p / q;
            let u = x + d;
            if u - a < t2 || b - u < t2 {
                d = if x < xm { tol1 } else { -tol1 };
            }
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else if d > 0.0 {
            x + tol1
        } else {
            x - tol1
        };
        let fu = objective(u);

        if fu <= fx {
            if u < x {
                b = x;
            } else {
                a = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    Err(AnalyticsError::NonConvergence {
        iterations: max_iterations,
        tolerance,
    })
}
