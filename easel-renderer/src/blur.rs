//! Gaussian blur over RGBA buffers.
//!
//! Shadows need a blur of the shape silhouette. A true gaussian is
//! approximated by three successive box blurs, which converges closely
//! enough for soft shadows and runs in linear time per pass.

/// Box sizes whose triple application approximates a gaussian of the given
/// standard deviation.
fn boxes_for_gauss(sigma: f64) -> [usize; 3] {
    let ideal = (12.0 * sigma * sigma / 3.0 + 1.0).sqrt();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut wl = ideal.floor() as usize;
    if wl % 2 == 0 {
        wl = wl.saturating_sub(1);
    }
    let wu = wl + 2;
    let wl_f = wl as f64;
    let m = (12.0 * sigma * sigma - 3.0 * wl_f * wl_f - 12.0 * wl_f - 9.0)
        / (-4.0 * wl_f - 4.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let m = m.round().max(0.0) as usize;
    let mut sizes = [wl; 3];
    for (i, size) in sizes.iter_mut().enumerate() {
        if i >= m {
            *size = wu;
        }
    }
    sizes
}

#[allow(clippy::cast_possible_truncation)]
fn box_blur_horizontal(src: &[u8], dst: &mut [u8], width: usize, height: usize, radius: usize) {
    let window = 2 * radius + 1;
    for y in 0..height {
        let row = y * width * 4;
        let mut sums = [0u32; 4];
        for x in 0..=radius.min(width - 1) {
            let p = row + x * 4;
            for c in 0..4 {
                sums[c] += u32::from(src[p + c]);
            }
        }
        // Edge pixels repeat, matching a clamped sampling window.
        for _ in width..=radius {
            let p = row + (width - 1) * 4;
            for c in 0..4 {
                sums[c] += u32::from(src[p + c]);
            }
        }
        for c in 0..4 {
            sums[c] += u32::from(src[row + c]) * radius as u32;
        }
        for x in 0..width {
            let p = row + x * 4;
            for c in 0..4 {
                #[allow(clippy::cast_possible_truncation)]
                {
                    dst[p + c] = (sums[c] / window as u32) as u8;
                }
            }
            let enter = x + radius + 1;
            let leave = x.saturating_sub(radius);
            let enter_p = row + enter.min(width - 1) * 4;
            let leave_p = row + leave * 4;
            for c in 0..4 {
                sums[c] += u32::from(src[enter_p + c]);
                sums[c] -= u32::from(src[leave_p + c]);
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn box_blur_vertical(src: &[u8], dst: &mut [u8], width: usize, height: usize, radius: usize) {
    let window = 2 * radius + 1;
    for x in 0..width {
        let col = x * 4;
        let mut sums = [0u32; 4];
        for y in 0..=radius.min(height - 1) {
            let p = col + y * width * 4;
            for c in 0..4 {
                sums[c] += u32::from(src[p + c]);
            }
        }
        for _ in height..=radius {
            let p = col + (height - 1) * width * 4;
            for c in 0..4 {
                sums[c] += u32::from(src[p + c]);
            }
        }
        for c in 0..4 {
            sums[c] += u32::from(src[col + c]) * radius as u32;
        }
        for y in 0..height {
            let p = col + y * width * 4;
            for c in 0..4 {
                #[allow(clippy::cast_possible_truncation)]
                {
                    dst[p + c] = (sums[c] / window as u32) as u8;
                }
            }
            let enter = (y + radius + 1).min(height - 1);
            let leave = y.saturating_sub(radius);
            let enter_p = col + enter * width * 4;
            let leave_p = col + leave * width * 4;
            for c in 0..4 {
                sums[c] += u32::from(src[enter_p + c]);
                sums[c] -= u32::from(src[leave_p + c]);
            }
        }
    }
}

/// Blur a premultiplied RGBA buffer in place.
///
/// A `sigma` below 0.5 leaves the buffer untouched.
pub fn gaussian_blur(data: &mut [u8], width: usize, height: usize, sigma: f64) {
    if sigma < 0.5 || width == 0 || height == 0 {
        return;
    }
    let mut scratch = data.to_vec();
    for size in boxes_for_gauss(sigma) {
        let radius = size / 2;
        if radius == 0 {
            continue;
        }
        box_blur_horizontal(data, &mut scratch, width, height, radius);
        box_blur_vertical(&scratch, data, width, height, radius);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blur_spreads_energy() {
        let (w, h) = (9, 9);
        let mut data = vec![0u8; w * h * 4];
        let center = (4 * w + 4) * 4;
        data[center + 3] = 255;
        gaussian_blur(&mut data, w, h, 2.0);
        assert!(data[center + 3] < 255);
        let neighbor = (4 * w + 5) * 4;
        assert!(data[neighbor + 3] > 0);
    }

    #[test]
    fn test_tiny_sigma_is_identity() {
        let mut data = vec![7u8; 4 * 4 * 4];
        let before = data.clone();
        gaussian_blur(&mut data, 4, 4, 0.2);
        assert_eq!(data, before);
    }

    #[test]
    fn test_uniform_buffer_stays_uniform() {
        let mut data = vec![128u8; 8 * 8 * 4];
        gaussian_blur(&mut data, 8, 8, 3.0);
        for value in &data {
            assert!((i16::from(*value) - 128).abs() <= 2);
        }
    }
}
