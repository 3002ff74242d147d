//! Linear convolution and scatter-accumulate helpers

use realfft::RealFftPlanner;
use rustfft::num_complex::Complex64;

use crate::error::{SpatialError, SpatialResult};

/// Above this many multiply-adds the FFT path is used
const DIRECT_MAX_OPS: usize = 1 << 16;

/// Full linear convolution, length `a.len() + b.len() - 1`
///
/// Empty if either input is empty.
pub fn convolve(a: &[f64], b: &[f64]) -> SpatialResult<Vec<f64>> {
    if a.is_empty() || b.is_empty() {
        return Ok(Vec::new());
    }
    if a.len().min(b.len()) <= 32 || a.len() * b.len() <= DIRECT_MAX_OPS {
        Ok(convolve_direct(a, b))
    } else {
        convolve_fft(a, b)
    }
}

/// Time-domain convolution
pub fn convolve_direct(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        if x == 0.0 {
            continue;
        }
        accumulate(&mut out, i, x, b);
    }
    out
}

/// Zero-padded real FFT convolution
pub fn convolve_fft(a: &[f64], b: &[f64]) -> SpatialResult<Vec<f64>> {
    if a.is_empty() || b.is_empty() {
        return Ok(Vec::new());
    }
    let out_len = a.len() + b.len() - 1;
    let fft_size = out_len.next_power_of_two();

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(fft_size);
    let ifft = planner.plan_fft_inverse(fft_size);

    let spectrum = |x: &[f64]| -> SpatialResult<Vec<Complex64>> {
        let mut padded = fft.make_input_vec();
        padded[..x.len()].copy_from_slice(x);
        let mut spec = fft.make_output_vec();
        fft.process(&mut padded, &mut spec)
            .map_err(|e| SpatialError::InvalidInput(format!("forward FFT failed: {e}")))?;
        Ok(spec)
    };

    let spec_a = spectrum(a)?;
    let spec_b = spectrum(b)?;
    let mut product: Vec<Complex64> = spec_a.iter().zip(&spec_b).map(|(x, y)| x * y).collect();

    let mut time = ifft.make_output_vec();
    ifft.process(&mut product, &mut time)
        .map_err(|e| SpatialError::InvalidInput(format!("inverse FFT failed: {e}")))?;

    let scale = 1.0 / fft_size as f64;
    time.truncate(out_len);
    time.iter_mut().for_each(|s| *s *= scale);
    Ok(time)
}

/// `out[offset..offset + ir.len()] += scale * ir`, clipped at the buffer end
pub fn accumulate(out: &mut [f64], offset: usize, scale: f64, ir: &[f64]) {
    if offset >= out.len() {
        return;
    }
    let end = (offset + ir.len()).min(out.len());
    for (o, &h) in out[offset..end].iter_mut().zip(ir) {
        *o += scale * h;
    }
}

/// Peak absolute value
pub fn peak(signal: &[f64]) -> f64 {
    signal.iter().fold(0.0_f64, |m, s| m.max(s.abs()))
}

/// Decibels to linear gain
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}
