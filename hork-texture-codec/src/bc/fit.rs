//! Endpoint fitting shared by the block encoders
//!
//! All helpers work on small fixed-size point sets (at most 16 texels) with
//! `N` channels, and never allocate.

/// Power iterations used to find the principal axis
const POWER_ITERATIONS: usize = 8;

#[inline]
pub(crate) fn dot<const N: usize>(a: &[f32; N], b: &[f32; N]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn mean<const N: usize>(points: &[[f32; N]]) -> [f32; N] {
    let mut mean = [0.0f32; N];
    if points.is_empty() {
        return mean;
    }
    for p in points {
        for c in 0..N {
            mean[c] += p[c];
        }
    }
    let inv = 1.0 / points.len() as f32;
    mean.map(|v| v * inv)
}

fn covariance<const N: usize>(points: &[[f32; N]], mean: &[f32; N]) -> [[f32; N]; N] {
    let mut cov = [[0.0f32; N]; N];
    for p in points {
        let d: [f32; N] = std::array::from_fn(|c| p[c] - mean[c]);
        for i in 0..N {
            for j in i..N {
                cov[i][j] += d[i] * d[j];
            }
        }
    }
    for i in 0..N {
        for j in 0..i {
            cov[i][j] = cov[j][i];
        }
    }
    cov
}

/// Unit length principal axis of the point set
///
/// Returns a zero vector when all points coincide.
pub(crate) fn principal_axis<const N: usize>(points: &[[f32; N]], mean: &[f32; N]) -> [f32; N] {
    let cov = covariance(points, mean);

    // Seed with the row of the largest diagonal entry
    let mut seed = 0;
    for c in 1..N {
        if cov[c][c] > cov[seed][seed] {
            seed = c;
        }
    }
    if cov[seed][seed] <= f32::EPSILON {
        return [0.0; N];
    }

    let mut axis = cov[seed];
    for _ in 0..POWER_ITERATIONS {
        let next: [f32; N] = std::array::from_fn(|i| dot(&cov[i], &axis));
        let scale = next.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        if scale <= f32::EPSILON {
            break;
        }
        axis = next.map(|v| v / scale);
    }

    let len = dot(&axis, &axis).sqrt();
    if len <= f32::EPSILON {
        return [0.0; N];
    }
    axis.map(|v| v / len)
}

/// Endpoints spanning the projection of `points` onto the line `mean + t * axis`
pub(crate) fn line_endpoints<const N: usize>(
    points: &[[f32; N]],
    mean: &[f32; N],
    axis: &[f32; N],
) -> ([f32; N], [f32; N]) {
    let mut t_min = 0.0f32;
    let mut t_max = 0.0f32;
    for p in points {
        let d: [f32; N] = std::array::from_fn(|c| p[c] - mean[c]);
        let t = dot(&d, axis);
        t_min = t_min.min(t);
        t_max = t_max.max(t);
    }
    let a = std::array::from_fn(|c| mean[c] + axis[c] * t_min);
    let b = std::array::from_fn(|c| mean[c] + axis[c] * t_max);
    (a, b)
}

/// Per channel bounding box
pub(crate) fn bounding_box<const N: usize>(points: &[[f32; N]]) -> ([f32; N], [f32; N]) {
    let mut lo = [f32::MAX; N];
    let mut hi = [f32::MIN; N];
    for p in points {
        for c in 0..N {
            lo[c] = lo[c].min(p[c]);
            hi[c] = hi[c].max(p[c]);
        }
    }
    (lo, hi)
}

/// Squared distance of the points from their best fitting line
pub(crate) fn line_residual<const N: usize>(points: &[[f32; N]]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    let mean = mean(points);
    let axis = principal_axis(points, &mean);
    points
        .iter()
        .map(|p| {
            let d: [f32; N] = std::array::from_fn(|c| p[c] - mean[c]);
            let t = dot(&d, &axis);
            dot(&d, &d) - t * t
        })
        .sum()
}

/// Least squares endpoints `(a, b)` for fixed interpolation weights
///
/// Each point is modelled as `a * (1 - w) + b * w`. Returns `None` when the
/// weights do not constrain both endpoints.
pub(crate) fn least_squares_endpoints<const N: usize>(
    points: &[[f32; N]],
    weights: &[f32],
) -> Option<([f32; N], [f32; N])> {
    let mut aa = 0.0f32;
    let mut ab = 0.0f32;
    let mut bb = 0.0f32;
    let mut ax = [0.0f32; N];
    let mut bx = [0.0f32; N];

    for (p, &w) in points.iter().zip(weights) {
        let iw = 1.0 - w;
        aa += iw * iw;
        ab += iw * w;
        bb += w * w;
        for c in 0..N {
            ax[c] += iw * p[c];
            bx[c] += w * p[c];
        }
    }

    let det = aa * bb - ab * ab;
    if det.abs() < 1e-6 {
        return None;
    }
    let inv = 1.0 / det;
    let a = std::array::from_fn(|c| (bb * ax[c] - ab * bx[c]) * inv);
    let b = std::array::from_fn(|c| (aa * bx[c] - ab * ax[c]) * inv);
    Some((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_axis_of_diagonal() {
        let points = [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]];
        let m = mean(&points);
        let axis = principal_axis(&points, &m);
        let expected = 1.0 / 3.0f32.sqrt();
        for v in axis {
            assert!((v.abs() - expected).abs() < 1e-4);
        }
        assert!(line_residual(&points) < 1e-4);
    }

    #[test]
    fn test_degenerate_axis() {
        let points = [[5.0, 5.0]; 4];
        let m = mean(&points);
        assert_eq!(principal_axis(&points, &m), [0.0, 0.0]);
        let (a, b) = line_endpoints(&points, &m, &[0.0, 0.0]);
        assert_eq!(a, [5.0, 5.0]);
        assert_eq!(b, [5.0, 5.0]);
    }

    #[test]
    fn test_least_squares_recovers_endpoints() {
        let weights = [0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0];
        let points: Vec<[f32; 1]> = weights.iter().map(|w| [10.0 + 90.0 * w]).collect();
        let (a, b) = least_squares_endpoints(&points, &weights).unwrap();
        assert!((a[0] - 10.0).abs() < 1e-3);
        assert!((b[0] - 100.0).abs() < 1e-3);
        assert!(least_squares_endpoints(&points, &[0.5; 4]).is_none());
    }
}
