use crate::foundation::{
    core::Frame,
    error::{ReelError, ReelResult},
};

/// Separable Gaussian blur over an RGB8 frame with clamped edges.
pub fn blur_rgb8(src: &Frame, radius: u32, sigma: f32) -> ReelResult<Frame> {
    if radius == 0 {
        return Ok(src.clone());
    }
    let (width, height) = src.dimensions();
    if width == 0 || height == 0 {
        return Ok(src.clone());
    }

    let kernel = gaussian_kernel_q16(radius, sigma)?;
    let mut tmp = vec![0u8; src.as_raw().len()];
    let mut out = tmp.clone();

    let (w, h) = (width as usize, height as usize);
    convolve_lines(src.as_raw(), &mut tmp, h, w, w, 1, &kernel);
    convolve_lines(&tmp, &mut out, w, h, 1, w, &kernel);
    Frame::from_raw(width, height, out)
        .ok_or_else(|| ReelError::evaluation("blur output buffer size mismatch"))
}

/// Q16 fixed-point taps for `2 * radius + 1` samples, summing to exactly `1 << 16`.
fn gaussian_kernel_q16(radius: u32, sigma: f32) -> ReelResult<Vec<u32>> {
    const ONE: i64 = 1 << 16;
    if radius == 0 {
        return Ok(vec![ONE as u32]);
    }
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(ReelError::validation("blur sigma must be > 0"));
    }

    let two_s2 = 2.0 * f64::from(sigma).powi(2);
    let r = i64::from(radius);
    let raw: Vec<f64> = (-r..=r)
        .map(|i| (-((i * i) as f64) / two_s2).exp())
        .collect();
    let total: f64 = raw.iter().sum();

    let mut taps: Vec<i64> = raw
        .iter()
        .map(|w| ((w / total) * ONE as f64).round() as i64)
        .collect();
    let drift = ONE - taps.iter().sum::<i64>();
    taps[radius as usize] = (taps[radius as usize] + drift).clamp(0, ONE);
    Ok(taps.into_iter().map(|t| t.clamp(0, ONE) as u32).collect())
}

/// One 1-D convolution over every line of the image.
///
/// `lines` lines of `len` pixels each; pixel `i` of line `l` lives at `l * line_step + i * step`
/// (in pixels). Edge samples are clamped.
fn convolve_lines(
    src: &[u8],
    dst: &mut [u8],
    lines: usize,
    len: usize,
    line_step: usize,
    step: usize,
    taps: &[u32],
) {
    let radius = taps.len() / 2;
    for line in 0..lines {
        let base = line * line_step;
        for i in 0..len {
            let mut acc = [0u64; 3];
            for (t, &w) in taps.iter().enumerate() {
                let j = (i + t).saturating_sub(radius).min(len - 1);
                let px = (base + j * step) * 3;
                for (c, a) in acc.iter_mut().enumerate() {
                    *a += u64::from(w) * u64::from(src[px + c]);
                }
            }
            let out = (base + i * step) * 3;
            for (c, a) in acc.into_iter().enumerate() {
                dst[out + c] = ((a + (1 << 15)) >> 16).min(255) as u8;
            }
        }
    }
}
