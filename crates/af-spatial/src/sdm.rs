//! Spatial Decomposition Method rendering
//!
//! Every sample of an SDM stream is a plane wave with pressure `p` from
//! direction (azimuth, colatitude). Binaural renders scatter the scaled
//! impulse response of that direction into the output at the sample index:
//!
//! - Sequential: one accumulation loop over all samples
//! - Parallel: the sample range is split into contiguous chunks, each worker
//!   fills a private partial buffer for its chunk, and partials are summed in
//!   chunk order after the join

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use crate::binaural::{BinauralIr, HrirSet};
use crate::cache::{CacheKey, CachePolicy, CacheStats, MemoCache};
use crate::decoder::LoudspeakerSetup;
use crate::error::{SpatialError, SpatialResult};
use crate::position::Direction;

/// Chunks shorter than this are not split further
const MIN_CHUNK: usize = 256;

/// Pressure/direction stream, one plane wave per sample
#[derive(Debug, Clone)]
pub struct SdmStream {
    pressure: Vec<f64>,
    azimuth: Vec<f64>,
    colatitude: Vec<f64>,
    hash: [u8; 32],
}

impl SdmStream {
    /// Create from parallel sequences (angles in radians)
    ///
    /// Fails on different lengths or non-finite values.
    pub fn new(pressure: Vec<f64>, azimuth: Vec<f64>, colatitude: Vec<f64>) -> SpatialResult<Self> {
        for (what, got) in [("azimuth", azimuth.len()), ("colatitude", colatitude.len())] {
            if got != pressure.len() {
                return Err(SpatialError::LengthMismatch {
                    what,
                    expected: pressure.len(),
                    got,
                });
            }
        }
        let bad = pressure
            .iter()
            .zip(&azimuth)
            .zip(&colatitude)
            .position(|((p, a), c)| !(p.is_finite() && a.is_finite() && c.is_finite()));
        if let Some(i) = bad {
            return Err(SpatialError::InvalidInput(format!("non-finite value at sample {i}")));
        }

        let hash = *CacheKey::builder("SdmStream")
            .f64s(&pressure)
            .f64s(&azimuth)
            .f64s(&colatitude)
            .finish()
            .as_bytes();
        Ok(Self {
            pressure,
            azimuth,
            colatitude,
            hash,
        })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.pressure.len()
    }

    /// True for an empty stream
    pub fn is_empty(&self) -> bool {
        self.pressure.is_empty()
    }

    /// Pressure per sample
    pub fn pressure(&self) -> &[f64] {
        &self.pressure
    }

    /// Azimuth per sample
    pub fn azimuth(&self) -> &[f64] {
        &self.azimuth
    }

    /// Colatitude per sample
    pub fn colatitude(&self) -> &[f64] {
        &self.colatitude
    }

    /// SHA-256 over all three sequences
    pub fn content_hash(&self) -> &[u8; 32] {
        &self.hash
    }
}

/// Worker count for SDM rendering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jobs {
    /// rayon's global pool
    #[default]
    Auto,
    /// Single accumulation loop
    Sequential,
    /// Dedicated pool with this many threads
    Parallel(usize),
}

impl Jobs {
    /// From a job count, `None` for automatic
    pub fn from_count(count: Option<usize>) -> Self {
        match count {
            None => Self::Auto,
            Some(0 | 1) => Self::Sequential,
            Some(n) => Self::Parallel(n),
        }
    }

    /// Number of workers
    pub fn workers(&self) -> usize {
        match self {
            Self::Auto => rayon::current_num_threads().max(1),
            Self::Sequential => 1,
            Self::Parallel(n) => (*n).max(1),
        }
    }
}

/// Stereo SDM with a raised-cosine panning law, length `n`
pub fn render_stereo_sdm(stream: &SdmStream) -> BinauralIr {
    let mut out = BinauralIr::zeros(stream.len());
    for (i, (&p, &phi)) in stream.pressure.iter().zip(&stream.azimuth).enumerate() {
        let h_l = 0.5 * (1.0 + (phi - FRAC_PI_2).cos());
        let h_r = 0.5 * (1.0 + (phi + FRAC_PI_2).cos());
        out.left[i] += p * h_l;
        out.right[i] += p * h_r;
    }
    out
}

/// Binaural SDM through the nearest HRIR per sample
///
/// Output length is `n + taps - 1`.
pub fn render_bsdm(stream: &SdmStream, hrirs: &HrirSet, jobs: Jobs) -> SpatialResult<BinauralIr> {
    log::info!(
        "BSDM render: {} samples, {} taps, {} workers",
        stream.len(),
        hrirs.taps(),
        jobs.workers()
    );
    scatter_render(stream.len(), hrirs.taps(), jobs, |i, partial, offset| {
        let p = stream.pressure[i];
        if p == 0.0 {
            return Ok(());
        }
        let dir = Direction::new(stream.azimuth[i], stream.colatitude[i]);
        let (h_l, h_r) = hrirs.pair(hrirs.nearest(&dir.to_vector()));
        crate::dsp::accumulate(&mut partial.left, offset, p, h_l);
        crate::dsp::accumulate(&mut partial.right, offset, p, h_r);
        Ok(())
    })
}

/// Binaural SDM through time-varying loudspeaker gains `(samples,
/// loudspeakers)`, each loudspeaker rendered with the HRIR nearest to it
///
/// Output length is `n + taps - 1`.
pub fn render_loudspeaker_sdm(
    pressure: &[f64],
    ls_gains: &Array2<f64>,
    setup: &LoudspeakerSetup,
    hrirs: &HrirSet,
    jobs: Jobs,
) -> SpatialResult<BinauralIr> {
    if ls_gains.nrows() != pressure.len() {
        return Err(SpatialError::LengthMismatch {
            what: "loudspeaker gain rows",
            expected: pressure.len(),
            got: ls_gains.nrows(),
        });
    }
    if ls_gains.ncols() != setup.num_loudspeakers() {
        return Err(SpatialError::BufferSizeMismatch {
            expected: setup.num_loudspeakers(),
            got: ls_gains.ncols(),
        });
    }
    if let Some(i) = pressure.iter().position(|p| !p.is_finite()) {
        return Err(SpatialError::InvalidInput(format!("non-finite pressure at sample {i}")));
    }

    let ls_hrirs: Vec<(&[f64], &[f64])> = setup
        .loudspeaker_hrirs(hrirs)
        .into_iter()
        .map(|idx| hrirs.pair(idx))
        .collect();

    log::info!(
        "Loudspeaker SDM render: {} samples, {} loudspeakers, {} workers",
        pressure.len(),
        ls_hrirs.len(),
        jobs.workers()
    );
    scatter_render(pressure.len(), hrirs.taps(), jobs, |i, partial, offset| {
        let p = pressure[i];
        for (l, (&g, (h_l, h_r))) in ls_gains.row(i).iter().zip(&ls_hrirs).enumerate() {
            if !g.is_finite() {
                return Err(SpatialError::InvalidInput(format!(
                    "non-finite gain at sample {i}, loudspeaker {l}"
                )));
            }
            if g == 0.0 || p == 0.0 {
                continue;
            }
            crate::dsp::accumulate(&mut partial.left, offset, p * g, h_l);
            crate::dsp::accumulate(&mut partial.right, offset, p * g, h_r);
        }
        Ok(())
    })
}

/// Contiguous sample ranges, one per worker
fn chunk_ranges(n: usize, workers: usize) -> Vec<(usize, usize)> {
    if n == 0 {
        return Vec::new();
    }
    let chunks = workers.clamp(1, n.div_ceil(MIN_CHUNK).max(1));
    let len = n.div_ceil(chunks);
    (0..n).step_by(len).map(|start| (start, (start + len).min(n))).collect()
}

/// Render `[start, end)` into a private buffer covering that range plus tail
fn render_chunk<F>(start: usize, end: usize, taps: usize, sample: &F) -> SpatialResult<BinauralIr>
where
    F: Fn(usize, &mut BinauralIr, usize) -> SpatialResult<()>,
{
    let mut partial = BinauralIr::zeros(end - start + taps - 1);
    for i in start..end {
        sample(i, &mut partial, i - start)?;
    }
    Ok(partial)
}

fn scatter_render<F>(n: usize, taps: usize, jobs: Jobs, sample: F) -> SpatialResult<BinauralIr>
where
    F: Fn(usize, &mut BinauralIr, usize) -> SpatialResult<()> + Sync,
{
    let taps = taps.max(1);
    let ranges = chunk_ranges(n, jobs.workers());

    if ranges.len() <= 1 || jobs == Jobs::Sequential {
        return render_chunk(0, n, taps, &sample);
    }

    let map = || {
        ranges
            .par_iter()
            .map(|&(start, end)| render_chunk(start, end, taps, &sample))
            .collect::<SpatialResult<Vec<_>>>()
    };
    let partials = match jobs {
        Jobs::Parallel(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| SpatialError::WorkerPool(e.to_string()))?
            .install(map)?,
        _ => map()?,
    };

    let mut out = BinauralIr::zeros(n + taps - 1);
    for (&(start, _), partial) in ranges.iter().zip(&partials) {
        out.add_at(start, partial);
    }
    Ok(out)
}

/// SDM renders memoized on their input content
///
/// The job count is not part of the key; parallel and sequential renders
/// agree to rounding.
pub struct SdmRenderer {
    jobs: Jobs,
    cache: MemoCache<BinauralIr>,
}

impl SdmRenderer {
    /// Create with an unbounded cache
    pub fn new(jobs: Jobs) -> Self {
        Self::with_policy(jobs, CachePolicy::Unbounded)
    }

    /// Create with a cache policy
    pub fn with_policy(jobs: Jobs, policy: CachePolicy) -> Self {
        Self {
            jobs,
            cache: MemoCache::new(policy),
        }
    }

    /// Worker setting
    pub fn jobs(&self) -> Jobs {
        self.jobs
    }

    /// Memoized [`render_stereo_sdm`]
    pub fn render_stereo_sdm(&self, stream: &SdmStream) -> Arc<BinauralIr> {
        let key = CacheKey::builder("render_stereo_sdm")
            .nested(stream.content_hash())
            .finish();
        let Ok(ir) = self
            .cache
            .get_or_try_insert_with(key, || Ok::<_, Infallible>(render_stereo_sdm(stream)));
        ir
    }

    /// Memoized [`render_bsdm`]
    pub fn render_bsdm(&self, stream: &SdmStream, hrirs: &HrirSet) -> SpatialResult<Arc<BinauralIr>> {
        let key = CacheKey::builder("render_bsdm")
            .nested(stream.content_hash())
            .nested(hrirs.content_hash())
            .finish();
        self.cache
            .get_or_try_insert_with(key, || render_bsdm(stream, hrirs, self.jobs))
    }

    /// Memoized [`render_loudspeaker_sdm`]
    pub fn render_loudspeaker_sdm(
        &self,
        pressure: &[f64],
        ls_gains: &Array2<f64>,
        setup: &LoudspeakerSetup,
        hrirs: &HrirSet,
    ) -> SpatialResult<Arc<BinauralIr>> {
        let directions: Vec<f64> = setup.directions().iter().flat_map(|d| d.iter().copied()).collect();
        let gains: Vec<f64> = ls_gains.iter().copied().collect();
        let key = CacheKey::builder("render_loudspeaker_sdm")
            .f64s(pressure)
            .u64(ls_gains.ncols() as u64)
            .f64s(&gains)
            .f64s(&directions)
            .nested(hrirs.content_hash())
            .finish();
        self.cache.get_or_try_insert_with(key, || {
            render_loudspeaker_sdm(pressure, ls_gains, setup, hrirs, self.jobs)
        })
    }

    /// Cache counters
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl Default for SdmRenderer {
    fn default() -> Self {
        Self::new(Jobs::Auto)
    }
}
