//! Reference separable Gaussian-family kernels.
//!
//! Inputs are dense C-ordered `f32` arrays over one to three spatial axes.
//! Borders are clamp-to-edge. Each convolution pass visits the kernel taps in
//! a fixed order, so a voxel whose neighbourhood lies inside two differently
//! sized inputs gets bit-identical results from both.

/// Window size (in sigmas) used when none is configured.
pub const DEFAULT_WINDOW_SIZE: f32 = 3.0;

/// Kernel radius in pixels for `sigma` truncated at `window_size` sigmas.
pub fn kernel_radius(sigma: f32, window_size: f32) -> usize {
    let window = if window_size > 0.0 {
        window_size
    } else {
        DEFAULT_WINDOW_SIZE
    };
    (window * sigma).ceil().max(1.0) as usize
}

fn debug_check_dims(data: &[f32], dims: &[usize]) {
    debug_assert_eq!(
        data.len(),
        dims.iter().product::<usize>(),
        "kernel input of {} values does not match dims {:?}",
        data.len(),
        dims
    );
}

/// Sampled Gaussian derivative of the given order (0, 1 or 2).
fn gaussian_weights(sigma: f32, radius: usize, order: u8) -> Vec<f32> {
    let sigma = f64::from(sigma.max(1e-3));
    let r = radius as i64;
    let base: Vec<f64> = (-r..=r)
        .map(|x| (-((x * x) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let norm: f64 = base.iter().sum();
    let gauss: Vec<f64> = base.iter().map(|g| g / norm).collect();

    let weights: Vec<f64> = match order {
        0 => gauss,
        1 => (-r..=r)
            .zip(&gauss)
            .map(|(x, g)| x as f64 / (sigma * sigma) * g)
            .collect(),
        _ => {
            let raw: Vec<f64> = (-r..=r)
                .zip(&gauss)
                .map(|(x, g)| ((x * x) as f64 / sigma.powi(4) - 1.0 / (sigma * sigma)) * g)
                .collect();
            let mean = raw.iter().sum::<f64>() / raw.len() as f64;
            raw.iter().map(|w| w - mean).collect()
        }
    };
    weights.into_iter().map(|w| w as f32).collect()
}

/// Convolve one axis of a C-ordered array with clamp-to-edge borders.
fn convolve_axis(data: &[f32], dims: &[usize], axis: usize, weights: &[f32]) -> Vec<f32> {
    let n = dims[axis];
    let inner: usize = dims[axis + 1..].iter().product();
    let outer: usize = dims[..axis].iter().product();
    let radius = (weights.len() / 2) as isize;
    let last = n as isize - 1;

    let mut out = vec![0.0f32; data.len()];
    for o in 0..outer {
        let base = o * n * inner;
        for i in 0..n {
            for k in 0..inner {
                let mut acc = 0.0f32;
                for (tap, w) in weights.iter().enumerate() {
                    let j = (i as isize + tap as isize - radius).clamp(0, last) as usize;
                    acc += w * data[base + j * inner + k];
                }
                out[base + i * inner + k] = acc;
            }
        }
    }
    out
}

/// Apply a separable Gaussian derivative; `orders[a]` is the derivative order
/// along axis `a`.
fn gaussian_derivative(data: &[f32], dims: &[usize], sigma: f32, window: f32, orders: &[u8]) -> Vec<f32> {
    let radius = kernel_radius(sigma, window);
    let mut result = data.to_vec();
    for (axis, &order) in orders.iter().enumerate() {
        let weights = gaussian_weights(sigma, radius, order);
        result = convolve_axis(&result, dims, axis, &weights);
    }
    result
}

fn unit_orders(ndim: usize, axes: &[usize]) -> Vec<u8> {
    let mut orders = vec![0u8; ndim];
    for &axis in axes {
        orders[axis] += 1;
    }
    orders
}

/// Gaussian smoothing.
pub fn gaussian_smoothing(data: &[f32], dims: &[usize], sigma: f32, window: f32) -> Vec<f32> {
    debug_check_dims(data, dims);
    gaussian_derivative(data, dims, sigma, window, &vec![0; dims.len()])
}

fn gradients(data: &[f32], dims: &[usize], sigma: f32, window: f32) -> Vec<Vec<f32>> {
    (0..dims.len())
        .map(|axis| gaussian_derivative(data, dims, sigma, window, &unit_orders(dims.len(), &[axis])))
        .collect()
}

/// Magnitude of the Gaussian gradient.
pub fn gaussian_gradient_magnitude(data: &[f32], dims: &[usize], sigma: f32, window: f32) -> Vec<f32> {
    debug_check_dims(data, dims);
    let grads = gradients(data, dims, sigma, window);
    (0..data.len())
        .map(|i| grads.iter().map(|g| g[i] * g[i]).sum::<f32>().sqrt())
        .collect()
}

/// Laplacian of Gaussian: the sum of second derivatives along every axis.
pub fn laplacian_of_gaussian(data: &[f32], dims: &[usize], scale: f32, window: f32) -> Vec<f32> {
    debug_check_dims(data, dims);
    let mut result = vec![0.0f32; data.len()];
    for axis in 0..dims.len() {
        let second = gaussian_derivative(data, dims, scale, window, &unit_orders(dims.len(), &[axis, axis]));
        for (acc, v) in result.iter_mut().zip(second) {
            *acc += v;
        }
    }
    result
}

/// Difference of two Gaussian smoothings.
pub fn difference_of_gaussians(data: &[f32], dims: &[usize], sigma0: f32, sigma1: f32, window: f32) -> Vec<f32> {
    debug_check_dims(data, dims);
    let a = gaussian_smoothing(data, dims, sigma0, window);
    let b = gaussian_smoothing(data, dims, sigma1, window);
    a.iter().zip(&b).map(|(x, y)| x - y).collect()
}

/// Index of `(a, b)` in the packed upper triangle of an `n x n` matrix.
fn packed(n: usize, a: usize, b: usize) -> usize {
    let (a, b) = if a <= b { (a, b) } else { (b, a) };
    a * n - a * (a + 1) / 2 + b
}

/// Eigenvalues of per-voxel symmetric tensors, channel-last, descending.
fn tensor_eigenvalues(components: &[Vec<f32>], ndim: usize, len: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(len * ndim);
    for i in 0..len {
        let m = |a: usize, b: usize| f64::from(components[packed(ndim, a, b)][i]);
        let values = match ndim {
            1 => vec![m(0, 0)],
            2 => symmetric_eigenvalues_2d(m(0, 0), m(0, 1), m(1, 1)).to_vec(),
            _ => symmetric_eigenvalues_3d([m(0, 0), m(0, 1), m(0, 2), m(1, 1), m(1, 2), m(2, 2)]).to_vec(),
        };
        out.extend(values.into_iter().map(|v| v as f32));
    }
    out
}

/// Eigenvalues of `[[a, b], [b, d]]`, descending.
pub fn symmetric_eigenvalues_2d(a: f64, b: f64, d: f64) -> [f64; 2] {
    let mean = 0.5 * (a + d);
    let radius = (0.25 * (a - d) * (a - d) + b * b).sqrt();
    [mean + radius, mean - radius]
}

/// Eigenvalues of a symmetric 3x3 matrix given as
/// `[m00, m01, m02, m11, m12, m22]`, descending.
pub fn symmetric_eigenvalues_3d(m: [f64; 6]) -> [f64; 3] {
    let [a, b, c, d, e, f] = m;
    let off = b * b + c * c + e * e;
    if off == 0.0 {
        let mut diag = [a, d, f];
        diag.sort_by(|x, y| y.total_cmp(x));
        return diag;
    }
    let q = (a + d + f) / 3.0;
    let p2 = (a - q).powi(2) + (d - q).powi(2) + (f - q).powi(2) + 2.0 * off;
    let p = (p2 / 6.0).sqrt();
    let (ba, bd, bf) = ((a - q) / p, (d - q) / p, (f - q) / p);
    let (bb, bc, be) = (b / p, c / p, e / p);
    let det = ba * (bd * bf - be * be) - bb * (bb * bf - be * bc) + bc * (bb * be - bd * bc);
    let r = (det / 2.0).clamp(-1.0, 1.0);
    let phi = r.acos() / 3.0;
    let largest = q + 2.0 * p * phi.cos();
    let smallest = q + 2.0 * p * (phi + 2.0 * std::f64::consts::PI / 3.0).cos();
    [largest, 3.0 * q - largest - smallest, smallest]
}

/// Eigenvalues of the Hessian of Gaussian, `ndim` channels per voxel.
pub fn hessian_of_gaussian_eigenvalues(data: &[f32], dims: &[usize], scale: f32, window: f32) -> Vec<f32> {
    debug_check_dims(data, dims);
    let ndim = dims.len();
    let mut components = Vec::new();
    for a in 0..ndim {
        for b in a..ndim {
            components.push(gaussian_derivative(data, dims, scale, window, &unit_orders(ndim, &[a, b])));
        }
    }
    tensor_eigenvalues(&components, ndim, data.len())
}

/// Eigenvalues of the structure tensor, `ndim` channels per voxel.
pub fn structure_tensor_eigenvalues(
    data: &[f32],
    dims: &[usize],
    inner_scale: f32,
    outer_scale: f32,
    window: f32,
) -> Vec<f32> {
    debug_check_dims(data, dims);
    let ndim = dims.len();
    let grads = gradients(data, dims, inner_scale, window);
    let mut components = Vec::new();
    for a in 0..ndim {
        for b in a..ndim {
            let product: Vec<f32> = grads[a].iter().zip(&grads[b]).map(|(x, y)| x * y).collect();
            components.push(gaussian_smoothing(&product, dims, outer_scale, window));
        }
    }
    tensor_eigenvalues(&components, ndim, data.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32, tol: f32) {
        assert!((a - b).abs() <= tol, "{} vs {}", a, b);
    }

    #[test]
    fn test_kernel_radius() {
        assert_eq!(kernel_radius(1.0, 0.0), 3);
        assert_eq!(kernel_radius(0.3, 3.5), 2);
        assert_eq!(kernel_radius(0.1, 3.0), 1);
    }

    #[test]
    fn test_weights_normalized() {
        let smooth = gaussian_weights(1.5, 5, 0);
        assert_close(smooth.iter().sum(), 1.0, 1e-5);
        let second = gaussian_weights(1.5, 5, 2);
        assert_close(second.iter().sum(), 0.0, 1e-5);
    }

    #[test]
    fn test_smoothing_preserves_constants() {
        let dims = [6, 7];
        let data = vec![4.0f32; 42];
        for value in gaussian_smoothing(&data, &dims, 1.0, 3.0) {
            assert_close(value, 4.0, 1e-4);
        }
        for value in laplacian_of_gaussian(&data, &dims, 1.0, 3.0) {
            assert_close(value, 0.0, 1e-4);
        }
    }

    #[test]
    fn test_gradient_of_ramp() {
        // f(y, x) = 2x has gradient magnitude 2 away from the borders
        let dims = [9, 15];
        let data: Vec<f32> = (0..9 * 15).map(|i| 2.0 * (i % 15) as f32).collect();
        let magnitude = gaussian_gradient_magnitude(&data, &dims, 1.0, 3.0);
        assert_close(magnitude[4 * 15 + 7], 2.0, 2e-2);
    }

    #[test]
    fn test_eigenvalues_2d() {
        let [hi, lo] = symmetric_eigenvalues_2d(2.0, 1.0, 2.0);
        assert!((hi - 3.0).abs() < 1e-12);
        assert!((lo - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_eigenvalues_3d() {
        let values = symmetric_eigenvalues_3d([2.0, 1.0, 0.0, 2.0, 0.0, 5.0]);
        let expected = [5.0, 3.0, 1.0];
        for (v, e) in values.iter().zip(expected) {
            assert!((v - e).abs() < 1e-9, "{:?}", values);
        }
        assert_eq!(symmetric_eigenvalues_3d([1.0, 0.0, 0.0, 3.0, 0.0, 2.0]), [3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_tensor_channel_counts() {
        let dims = [5, 6, 7];
        let data: Vec<f32> = (0..210).map(|i| (i % 11) as f32).collect();
        assert_eq!(hessian_of_gaussian_eigenvalues(&data, &dims, 0.7, 3.0).len(), 210 * 3);
        let slice = &data[..42];
        assert_eq!(structure_tensor_eigenvalues(slice, &dims[1..], 0.7, 0.35, 3.0).len(), 42 * 2);
        assert_eq!(hessian_of_gaussian_eigenvalues(slice, &dims[1..], 0.7, 3.0).len(), 42 * 2);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "does not match dims")]
    fn test_mismatched_dims_rejected() {
        let data = vec![1.0f32; 210];
        structure_tensor_eigenvalues(&data, &[6, 7], 0.7, 0.35, 3.0);
    }

    #[test]
    fn test_packed_index() {
        assert_eq!(packed(3, 0, 0), 0);
        assert_eq!(packed(3, 0, 2), 2);
        assert_eq!(packed(3, 1, 1), 3);
        assert_eq!(packed(3, 2, 1), 4);
        assert_eq!(packed(3, 2, 2), 5);
        assert_eq!(packed(2, 1, 1), 2);
    }
}
