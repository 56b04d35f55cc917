//! Closed-form proximal maps and ball projections
//!
//! Everything a seminorm family needs: soft-thresholding for L1, clipping
//! for the sup-norm ball, the sort-based L1-ball projection, and Euclidean
//! shrinkage. Each function solves a one-shot separable problem; no
//! iteration is involved.

use ndarray::prelude::*;

use crate::Float;

/// `prox_{t ||.||_1}(x)`: elementwise `sign(x) * max(|x| - t, 0)`.
pub fn soft_threshold<S: Float>(x: ArrayView1<S>, t: S) -> Array1<S> {
    x.mapv(|v| {
        if v > t {
            v - t
        } else if v < -t {
            v + t
        } else {
            S::zero()
        }
    })
}

/// Projection onto the sup-norm ball `{u : ||u||_inf <= r}`.
pub fn clip<S: Float>(x: ArrayView1<S>, r: S) -> Array1<S> {
    x.mapv(|v| v.max(-r).min(r))
}

/// Projection onto the L1 ball `{u : ||u||_1 <= r}` (sort-based).
pub fn project_l1_ball<S: Float>(x: ArrayView1<S>, r: S) -> Array1<S> {
    if r <= S::zero() {
        return Array1::zeros(x.len());
    }
    let l1: S = x.iter().map(|v| v.abs()).sum();
    if l1 <= r {
        return x.to_owned();
    }
    // find the threshold theta with sum(max(|x| - theta, 0)) == r
    let mut mags: Vec<S> = x.iter().map(|v| v.abs()).collect();
    mags.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap());
    let mut cumsum = S::zero();
    let mut theta = S::zero();
    for (j, &m) in mags.iter().enumerate() {
        cumsum += m;
        let candidate = (cumsum - r) / S::from(j + 1).unwrap();
        if m > candidate {
            theta = candidate;
        } else {
            break;
        }
    }
    soft_threshold(x, theta)
}

/// `prox_{t ||.||_inf}(x)` via the Moreau decomposition
/// `x = prox(x) + P_{t B_1}(x)`.
pub fn prox_supnorm<S: Float>(x: ArrayView1<S>, t: S) -> Array1<S> {
    let p = project_l1_ball(x, t);
    &x - &p
}

/// `prox_{t ||.||_2}(x)`: shrink the whole vector toward the origin.
pub fn prox_l2<S: Float>(x: ArrayView1<S>, t: S) -> Array1<S> {
    let norm = x.dot(&x).sqrt();
    if norm <= t {
        Array1::zeros(x.len())
    } else {
        let scale = S::one() - t / norm;
        x.mapv(|v| v * scale)
    }
}

/// Projection onto the Euclidean ball `{u : ||u||_2 <= r}`.
pub fn project_l2_ball<S: Float>(x: ArrayView1<S>, r: S) -> Array1<S> {
    let norm = x.dot(&x).sqrt();
    if norm <= r {
        x.to_owned()
    } else {
        let scale = r / norm;
        x.mapv(|v| v * scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn soft_threshold_known_values() {
        let x = array![3., -0.5, 0., -2.];
        assert_abs_diff_eq!(soft_threshold(x.view(), 1.), array![2., 0., 0., -1.]);
        assert_abs_diff_eq!(soft_threshold(x.view(), 0.), x);
    }

    #[test]
    fn clip_known_values() {
        let x = array![3., -0.5, 0., -2.];
        assert_abs_diff_eq!(clip(x.view(), 1.), array![1., -0.5, 0., -1.]);
    }

    #[test]
    fn l1_projection_inside_is_identity() {
        let x = array![0.2, -0.3, 0.1];
        assert_abs_diff_eq!(project_l1_ball(x.view(), 1.), x);
    }

    #[test]
    fn l1_projection_lands_on_sphere() {
        let x = array![3., -4., 1., 0.5];
        let p = project_l1_ball(x.view(), 2.);
        let l1: f64 = p.iter().map(|v: &f64| v.abs()).sum();
        assert_abs_diff_eq!(l1, 2.0, epsilon = 1e-12);
        // idempotent
        assert_abs_diff_eq!(project_l1_ball(p.view(), 2.), p, epsilon = 1e-12);
    }

    #[test]
    fn l1_projection_simple_case() {
        // projection of (2, 0) onto the unit L1 ball is (1, 0)
        let p = project_l1_ball(array![2., 0.].view(), 1.);
        assert_abs_diff_eq!(p, array![1., 0.], epsilon = 1e-12);
        // projection of (1, 1) onto the unit L1 ball is (0.5, 0.5)
        let p = project_l1_ball(array![1., 1.].view(), 1.);
        assert_abs_diff_eq!(p, array![0.5, 0.5], epsilon = 1e-12);
    }

    #[test]
    fn supnorm_prox_moreau_identity() {
        let x = array![3., -4., 1., 0.5];
        let t = 2.;
        let recomposed = prox_supnorm(x.view(), t) + project_l1_ball(x.view(), t);
        assert_abs_diff_eq!(recomposed, x, epsilon = 1e-12);
    }

    #[test]
    fn l2_prox_shrinks_or_kills() {
        let x = array![3., 4.];
        assert_abs_diff_eq!(prox_l2(x.view(), 5.), array![0., 0.]);
        let p = prox_l2(x.view(), 1.);
        assert_abs_diff_eq!(p, array![3. * 0.8, 4. * 0.8], epsilon = 1e-12);
    }

    #[test]
    fn l2_projection_rescales() {
        let x = array![3.0_f64, 4.];
        let p = project_l2_ball(x.view(), 1.);
        assert_abs_diff_eq!(p.dot(&p).sqrt(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(project_l2_ball(p.view(), 1.), p, epsilon = 1e-12);
    }
}
