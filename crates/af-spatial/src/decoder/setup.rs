//! Loudspeaker setup model
//!
//! Owns the loudspeaker geometry, its triangulation and the optional
//! ambisonic hulls, and turns gains into loudspeaker and binaural signals.

use log::{debug, info, warn};
use nalgebra::Vector3;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::nearest::nearest_index;
use super::vbap::pan_normalized;
use crate::binaural::{BinauralIr, HrirSet};
use crate::dsp;
use crate::error::{SpatialError, SpatialResult};
use crate::geometry::{
    Hull, PruneLimits, PruneReason, PruneReport, TriangleBase, build_hull, common_plane_normal,
    drop_unenclosing, prune_triangles,
};
use crate::grids::Grid;
use crate::layouts::LayoutPreset;
use crate::position::{Direction, angle_between, unit};

/// Loudspeaker signals below this level are not binauralized
const BINAURAL_GATE_DB: f64 = -100.0;

/// Angle of the max-rE main lobe used for the characteristic order (degrees)
const MAX_RE_ANGLE_DEG: f64 = 137.9;

/// Default kernel order
pub const DEFAULT_N_KERNEL: usize = 10;

/// Mean directions shorter than this count as balanced
const BALANCED_MEAN: f64 = 1e-3;

/// Hull construction options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupOptions {
    /// Close coplanar layouts with two imaginary apex points
    pub planar_fallback: bool,
}

/// Imaginary loudspeakers added to the ambisonics hull
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImaginaryLoudspeakers {
    /// One opposite the mean direction if triangles were pruned
    #[default]
    Auto,
    /// None
    None,
    /// Given directions
    Explicit(Vec<Direction>),
}

/// Ambisonic preparation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbisonicOptions {
    /// Kernel order; the kernel grid has `2 (2 n_kernel + 2)^2` points
    pub n_kernel: usize,
    /// Imaginary loudspeakers
    pub imaginary: ImaginaryLoudspeakers,
}

impl AmbisonicOptions {
    /// Options with automatic imaginary loudspeakers
    pub fn new(n_kernel: usize) -> Self {
        Self {
            n_kernel,
            imaginary: ImaginaryLoudspeakers::Auto,
        }
    }

    /// Override the imaginary loudspeakers
    pub fn with_imaginary(mut self, imaginary: ImaginaryLoudspeakers) -> Self {
        self.imaginary = imaginary;
        self
    }

    /// Number of kernel points
    pub fn kernel_size(&self) -> usize {
        let side = 2 * self.n_kernel + 2;
        2 * side * side
    }
}

impl Default for AmbisonicOptions {
    fn default() -> Self {
        Self::new(DEFAULT_N_KERNEL)
    }
}

/// Hulls for the ALLRAP/ALLRAD family
#[derive(Debug, Clone)]
pub struct AmbisonicHulls {
    /// Loudspeakers, apex points and imaginary loudspeakers
    pub ambisonics: Hull,
    /// Dense virtual kernel
    pub kernel: Hull,
    /// Options the hulls were built with
    pub options: AmbisonicOptions,
    bases: Vec<TriangleBase>,
    kernel_gains: Array2<f64>,
}

impl AmbisonicHulls {
    /// Triangle bases of the ambisonics hull
    pub fn bases(&self) -> &[TriangleBase] {
        &self.bases
    }

    /// Energy-normalized VBAP gains of every kernel point on the ambisonics
    /// hull, `(kernel points, ambisonics hull points)`
    pub fn kernel_gains(&self) -> ArrayView2<'_, f64> {
        self.kernel_gains.view()
    }

    /// Number of imaginary points beyond the real loudspeakers
    pub fn num_imaginary(&self, num_loudspeakers: usize) -> usize {
        self.ambisonics.num_points().saturating_sub(num_loudspeakers)
    }
}

/// Loudspeaker array around a listener
#[derive(Debug, Clone)]
pub struct LoudspeakerSetup {
    positions: Vec<Vector3<f64>>,
    listener: Vector3<f64>,
    num_loudspeakers: usize,
    hull: Hull,
    bases: Vec<TriangleBase>,
    removed: Vec<([usize; 3], PruneReason)>,
    ambisonic: Option<AmbisonicHulls>,
    characteristic_order: Option<usize>,
}

impl LoudspeakerSetup {
    /// Create from Cartesian coordinate slices
    pub fn new(x: &[f64], y: &[f64], z: &[f64], listener: [f64; 3]) -> SpatialResult<Self> {
        for (what, got) in [("y coordinates", y.len()), ("z coordinates", z.len())] {
            if got != x.len() {
                return Err(SpatialError::LengthMismatch {
                    what,
                    expected: x.len(),
                    got,
                });
            }
        }
        let positions: Vec<Vector3<f64>> = x
            .iter()
            .zip(y)
            .zip(z)
            .map(|((&x, &y), &z)| Vector3::new(x, y, z))
            .collect();
        Self::from_positions(&positions, Vector3::from(listener))
    }

    /// Create from positions with default options
    pub fn from_positions(positions: &[Vector3<f64>], listener: Vector3<f64>) -> SpatialResult<Self> {
        Self::with_options(positions, listener, &SetupOptions::default())
    }

    /// Create from positions
    pub fn with_options(
        positions: &[Vector3<f64>],
        listener: Vector3<f64>,
        options: &SetupOptions,
    ) -> SpatialResult<Self> {
        if !positions.iter().chain(std::iter::once(&listener)).all(|p| p.iter().all(|c| c.is_finite())) {
            return Err(SpatialError::InvalidInput("non-finite loudspeaker position".into()));
        }

        let directions = positions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                unit(&(p - listener)).ok_or_else(|| {
                    SpatialError::InvalidInput(format!("loudspeaker {i} coincides with the listener"))
                })
            })
            .collect::<SpatialResult<Vec<_>>>()?;

        let mut hull = match build_hull(&directions) {
            Ok(hull) => hull,
            Err(SpatialError::DegenerateHull(reason)) if options.planar_fallback => {
                let normal = common_plane_normal(&directions)
                    .ok_or_else(|| SpatialError::DegenerateHull(reason.clone()))?;
                warn!("Degenerate layout ({reason}), closing with imaginary apex points");
                let mut points = directions.clone();
                points.push(normal);
                points.push(-normal);
                build_hull(&points)?
            }
            Err(e) => return Err(e),
        };

        let report = drop_unenclosing(&mut hull);
        if hull.triangles.is_empty() {
            return Err(SpatialError::NoValidTriangles);
        }
        for (tri, _) in &report.removed {
            debug!("Triangle {tri:?} does not enclose the listener");
        }

        info!(
            "Loudspeaker setup: {} loudspeakers, {} triangles",
            positions.len(),
            hull.triangles.len()
        );

        let bases = TriangleBase::for_hull(&hull);
        Ok(Self {
            positions: positions.to_vec(),
            listener,
            num_loudspeakers: positions.len(),
            hull,
            bases,
            removed: report.removed,
            ambisonic: None,
            characteristic_order: None,
        })
    }

    /// Create from a layout preset and apply its pruning limits
    pub fn from_preset(preset: &LayoutPreset) -> SpatialResult<Self> {
        preset.validate()?;
        let options = SetupOptions {
            planar_fallback: preset.planar_fallback,
        };
        let mut setup = Self::with_options(&preset.positions(), Vector3::from(preset.listener), &options)?;
        setup.pop_triangles(&preset.limits(), &preset.blacklist)?;
        info!("Loaded preset '{}'", preset.name);
        Ok(setup)
    }

    /// Remove triangles failing `limits` or named in `blacklist`
    ///
    /// Ambisonic hulls, if prepared, are rebuilt.
    pub fn pop_triangles(
        &mut self,
        limits: &PruneLimits,
        blacklist: &[[usize; 3]],
    ) -> SpatialResult<PruneReport> {
        let report = prune_triangles(&mut self.hull, limits, blacklist)?;
        self.bases = TriangleBase::for_hull(&self.hull);
        self.removed.extend(report.removed.iter().copied());
        self.characteristic_order = None;

        info!(
            "Pruned {} triangles, {} remaining",
            report.removed.len(),
            report.remaining
        );

        if let Some(options) = self.ambisonic.take().map(|h| h.options) {
            self.setup_for_ambisonic(&options)?;
        }
        Ok(report)
    }

    /// Number of real loudspeakers
    pub fn num_loudspeakers(&self) -> usize {
        self.num_loudspeakers
    }

    /// Loudspeaker positions as given
    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    /// Listener position
    pub fn listener(&self) -> Vector3<f64> {
        self.listener
    }

    /// Unit directions from the listener to each loudspeaker
    pub fn directions(&self) -> &[Vector3<f64>] {
        &self.hull.points[..self.num_loudspeakers]
    }

    /// Imaginary apex points of the planar fallback
    pub fn apex_points(&self) -> &[Vector3<f64>] {
        &self.hull.points[self.num_loudspeakers..]
    }

    /// Triangulation with only valid triangles
    pub fn hull(&self) -> &Hull {
        &self.hull
    }

    /// Triangles removed so far
    pub fn removed_triangles(&self) -> &[([usize; 3], PruneReason)] {
        &self.removed
    }

    /// Inverse bases of the valid triangles
    pub fn bases(&self) -> &[TriangleBase] {
        &self.bases
    }

    /// Ambisonic hulls, if prepared
    pub fn ambisonic(&self) -> Option<&AmbisonicHulls> {
        self.ambisonic.as_ref()
    }

    /// Highest ambisonic order the array supports
    ///
    /// From the largest angle between a valid triangle's centroid and its
    /// nearest loudspeaker: `floor(137.9° / φ_max - 1.51)`.
    pub fn characteristic_order(&self) -> SpatialResult<usize> {
        if let Some(order) = self.characteristic_order {
            return Ok(order);
        }
        self.compute_characteristic_order()
    }

    fn compute_characteristic_order(&self) -> SpatialResult<usize> {
        let directions = self.directions();
        let phi_max = self
            .hull
            .triangles
            .iter()
            .map(|t| {
                let centroid = t.centroid(&self.hull.points);
                directions
                    .iter()
                    .map(|d| angle_between(d, &centroid))
                    .fold(f64::INFINITY, f64::min)
            })
            .fold(0.0_f64, f64::max)
            .to_degrees();

        let order = (MAX_RE_ANGLE_DEG / phi_max - 1.51).floor();
        if !order.is_finite() || order < 1.0 {
            return Err(SpatialError::Config(format!(
                "loudspeaker spacing too wide for ambisonics (max centroid gap {phi_max:.1}°)"
            )));
        }
        Ok(order as usize)
    }

    /// Build the ambisonics and kernel hulls
    pub fn setup_for_ambisonic(&mut self, options: &AmbisonicOptions) -> SpatialResult<()> {
        let hulls = self.build_ambisonic_hulls(options)?;
        info!(
            "Ambisonic setup: {} imaginary loudspeakers, {} kernel points",
            hulls.num_imaginary(self.num_loudspeakers),
            hulls.kernel.num_points()
        );
        self.ambisonic = Some(hulls);
        self.characteristic_order = self.compute_characteristic_order().ok();
        Ok(())
    }

    /// Build ambisonic hulls without storing them
    pub fn build_ambisonic_hulls(&self, options: &AmbisonicOptions) -> SpatialResult<AmbisonicHulls> {
        if options.n_kernel == 0 {
            return Err(SpatialError::Config("kernel order must be at least 1".into()));
        }

        let imaginary = match &options.imaginary {
            ImaginaryLoudspeakers::Auto => self.auto_imaginary(),
            ImaginaryLoudspeakers::None => Vec::new(),
            ImaginaryLoudspeakers::Explicit(dirs) => dirs.iter().map(Direction::to_vector).collect(),
        };

        let mut points = self.hull.points.clone();
        points.extend(imaginary);
        let mut ambisonics = build_hull(&points)?;
        drop_unenclosing(&mut ambisonics);
        if ambisonics.triangles.is_empty() {
            return Err(SpatialError::NoValidTriangles);
        }
        let bases = TriangleBase::for_hull(&ambisonics);

        let kernel = build_hull(&Grid::fibonacci(options.kernel_size()).vectors())?;

        let mut kernel_gains = Array2::zeros((kernel.num_points(), ambisonics.num_points()));
        let mut outside = 0;
        for (p, mut row) in kernel.points.iter().zip(kernel_gains.axis_iter_mut(Axis(0))) {
            if !pan_normalized(&bases, p, &mut row) {
                outside += 1;
            }
        }
        if outside > 0 {
            debug!("{outside} kernel points outside the ambisonics hull");
        }

        Ok(AmbisonicHulls {
            ambisonics,
            kernel,
            options: options.clone(),
            bases,
            kernel_gains,
        })
    }

    /// One imaginary loudspeaker opposite a one-sided array with gaps
    fn auto_imaginary(&self) -> Vec<Vector3<f64>> {
        if !self.apex_points().is_empty() || self.removed.is_empty() {
            return Vec::new();
        }
        let directions = self.directions();
        let mean = directions.iter().sum::<Vector3<f64>>() / directions.len() as f64;
        if mean.norm() < BALANCED_MEAN {
            warn!("Triangles were pruned but the array is balanced, no imaginary loudspeaker added");
            return Vec::new();
        }
        let candidate = -mean.normalize();
        if directions.iter().any(|d| angle_between(d, &candidate) < 1e-3) {
            return Vec::new();
        }
        debug!("Imaginary loudspeaker at {:?}", Direction::from_vector(&candidate));
        vec![candidate]
    }

    /// Loudspeaker signals `(loudspeakers, samples)` from a gain matrix
    /// `(sources, loudspeakers)` and source signals `(sources, samples)`
    ///
    /// Without source signals every source is a unit impulse.
    pub fn loudspeaker_signals(
        &self,
        gains: &Array2<f64>,
        sig_in: Option<&Array2<f64>>,
    ) -> SpatialResult<Array2<f64>> {
        if gains.ncols() != self.num_loudspeakers {
            return Err(SpatialError::BufferSizeMismatch {
                expected: self.num_loudspeakers,
                got: gains.ncols(),
            });
        }
        match sig_in {
            None => Ok(gains.t().sum_axis(Axis(1)).insert_axis(Axis(1))),
            Some(signals) => {
                if signals.nrows() != gains.nrows() {
                    return Err(SpatialError::BufferSizeMismatch {
                        expected: gains.nrows(),
                        got: signals.nrows(),
                    });
                }
                Ok(gains.t().dot(signals))
            }
        }
    }

    /// Loudspeaker signals `(loudspeakers, samples)` for time-varying gains
    /// `(samples, loudspeakers)` applied to a mono signal
    pub fn loudspeaker_signals_varying(
        &self,
        gains: &Array2<f64>,
        signal: &[f64],
    ) -> SpatialResult<Array2<f64>> {
        if gains.ncols() != self.num_loudspeakers {
            return Err(SpatialError::BufferSizeMismatch {
                expected: self.num_loudspeakers,
                got: gains.ncols(),
            });
        }
        if gains.nrows() != signal.len() {
            return Err(SpatialError::BufferSizeMismatch {
                expected: gains.nrows(),
                got: signal.len(),
            });
        }
        let mut out = gains.t().to_owned();
        for mut row in out.rows_mut() {
            for (g, s) in row.iter_mut().zip(signal) {
                *g *= s;
            }
        }
        Ok(out)
    }

    /// HRIR grid index closest to each loudspeaker direction
    pub fn loudspeaker_hrirs(&self, hrirs: &HrirSet) -> Vec<usize> {
        self.directions().iter().map(|d| hrirs.nearest(d)).collect()
    }

    /// Binaural signals from loudspeaker signals `(loudspeakers, samples)`
    ///
    /// Each loudspeaker is convolved with the HRIR nearest its direction.
    /// Without an HRIR set a synthetic one at `fs` is used.
    pub fn binauralize(
        &self,
        ls_signals: &Array2<f64>,
        fs: u32,
        hrirs: Option<&HrirSet>,
    ) -> SpatialResult<BinauralIr> {
        if ls_signals.nrows() != self.num_loudspeakers {
            return Err(SpatialError::BufferSizeMismatch {
                expected: self.num_loudspeakers,
                got: ls_signals.nrows(),
            });
        }

        let synthetic;
        let hrirs = match hrirs {
            Some(set) => {
                if set.fs() != fs {
                    return Err(SpatialError::SampleRateMismatch {
                        expected: fs,
                        got: set.fs(),
                    });
                }
                set
            }
            None => {
                synthetic = HrirSet::synthetic(fs);
                &synthetic
            }
        };

        let samples = ls_signals.ncols();
        let mut out = BinauralIr::zeros(samples + hrirs.taps() - 1);
        let gate = dsp::db_to_linear(BINAURAL_GATE_DB);

        for (ls, (row, hrir_idx)) in ls_signals
            .rows()
            .into_iter()
            .zip(self.loudspeaker_hrirs(hrirs))
            .enumerate()
        {
            let signal: Vec<f64> = row.iter().copied().collect();
            if dsp::peak(&signal) < gate {
                debug!("Loudspeaker {ls} below gate, skipped");
                continue;
            }
            let (h_l, h_r) = hrirs.pair(hrir_idx);
            dsp::accumulate(&mut out.left, 0, 1.0, &dsp::convolve(&signal, h_l)?);
            dsp::accumulate(&mut out.right, 0, 1.0, &dsp::convolve(&signal, h_r)?);
        }
        Ok(out)
    }

    /// Nearest loudspeaker to a direction
    pub fn nearest_loudspeaker_index(&self, direction: &Vector3<f64>) -> usize {
        nearest_index(self.directions(), direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn octahedron() -> LoudspeakerSetup {
        LoudspeakerSetup::new(
            &[1.0, -1.0, 0.0, 0.0, 0.0, 0.0],
            &[0.0, 0.0, 1.0, -1.0, 0.0, 0.0],
            &[0.0, 0.0, 0.0, 0.0, 1.0, -1.0],
            [0.0, 0.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn test_construction() {
        let setup = octahedron();
        assert_eq!(setup.num_loudspeakers(), 6);
        assert_eq!(setup.hull().triangles.len(), 8);
        assert!(setup.apex_points().is_empty());
        assert_eq!(setup.characteristic_order().unwrap(), 1);
    }

    #[test]
    fn test_listener_offset() {
        let positions: Vec<Vector3<f64>> = octahedron()
            .positions()
            .iter()
            .map(|p| p * 2.0 + Vector3::new(1.0, 1.0, 0.0))
            .collect();
        let setup = LoudspeakerSetup::from_positions(&positions, Vector3::new(1.0, 1.0, 0.0)).unwrap();
        assert_abs_diff_eq!(setup.directions()[0], Vector3::x(), epsilon = 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        let err = LoudspeakerSetup::new(&[1.0, 0.0], &[0.0], &[0.0, 1.0], [0.0; 3]);
        assert!(matches!(err, Err(SpatialError::LengthMismatch { .. })));
    }

    #[test]
    fn test_from_preset_validates() {
        let mut short = LayoutPreset::builtin("aalto_full").unwrap();
        short.colatitude_deg.pop();
        assert!(matches!(
            LoudspeakerSetup::from_preset(&short),
            Err(SpatialError::LengthMismatch { what: "colatitude_deg", .. })
        ));

        let mut listed = LayoutPreset::builtin("aalto_full").unwrap();
        listed.blacklist.push([0, 1, 20]);
        assert!(matches!(LoudspeakerSetup::from_preset(&listed), Err(SpatialError::Config(_))));

        let setup = LoudspeakerSetup::from_preset(&LayoutPreset::builtin("aalto_full").unwrap()).unwrap();
        assert_eq!(setup.num_loudspeakers(), 20);
    }

    #[test]
    fn test_planar_fallback() {
        let ring: Vec<Vector3<f64>> = (0..6)
            .map(|i| Direction::from_degrees(60.0 * i as f64, 90.0).to_vector())
            .collect();
        assert!(matches!(
            LoudspeakerSetup::from_positions(&ring, Vector3::zeros()),
            Err(SpatialError::DegenerateHull(_))
        ));

        let options = SetupOptions {
            planar_fallback: true,
        };
        let setup = LoudspeakerSetup::with_options(&ring, Vector3::zeros(), &options).unwrap();
        assert_eq!(setup.num_loudspeakers(), 6);
        assert_eq!(setup.apex_points().len(), 2);
        assert_eq!(setup.hull().triangles.len(), 12);
    }

    #[test]
    fn test_loudspeaker_signals() {
        let setup = octahedron();
        let gains = array![[1.0, 0.0, 0.5, 0.0, 0.0, 0.0], [0.0, 0.0, 0.5, 0.0, 0.0, 2.0]];

        let impulse = setup.loudspeaker_signals(&gains, None).unwrap();
        assert_eq!(impulse.dim(), (6, 1));
        assert_eq!(impulse[[2, 0]], 1.0);
        assert_eq!(impulse[[5, 0]], 2.0);

        let sig = array![[1.0, 2.0, 3.0], [1.0, 1.0, 1.0]];
        let out = setup.loudspeaker_signals(&gains, Some(&sig)).unwrap();
        assert_eq!(out.dim(), (6, 3));
        assert_eq!(out.row(2).to_vec(), vec![1.0, 1.5, 2.0]);

        let bad = array![[1.0, 0.0]];
        assert!(matches!(
            setup.loudspeaker_signals(&bad, None),
            Err(SpatialError::BufferSizeMismatch { expected: 6, got: 2 })
        ));
    }

    #[test]
    fn test_loudspeaker_signals_varying() {
        let setup = octahedron();
        let mut gains = Array2::zeros((3, 6));
        gains[[0, 0]] = 1.0;
        gains[[1, 1]] = 1.0;
        gains[[2, 0]] = 0.5;
        let out = setup.loudspeaker_signals_varying(&gains, &[2.0, 3.0, 4.0]).unwrap();
        assert_eq!(out.dim(), (6, 3));
        assert_eq!(out.row(0).to_vec(), vec![2.0, 0.0, 2.0]);
        assert_eq!(out.row(1).to_vec(), vec![0.0, 3.0, 0.0]);
        assert!(setup.loudspeaker_signals_varying(&gains, &[1.0]).is_err());
    }

    #[test]
    fn test_binauralize() {
        let setup = octahedron();
        let hrirs = HrirSet::synthetic(48000);
        let mut signals = Array2::zeros((6, 10));
        signals[[2, 0]] = 1.0;

        let out = setup.binauralize(&signals, 48000, Some(&hrirs)).unwrap();
        assert_eq!(out.len(), 10 + hrirs.taps() - 1);

        // loudspeaker 2 sits at +y, the left side
        let (h_l, h_r) = hrirs.pair(hrirs.nearest(&Vector3::y()));
        for i in 0..hrirs.taps() {
            assert_abs_diff_eq!(out.left[i], h_l[i], epsilon = 1e-12);
            assert_abs_diff_eq!(out.right[i], h_r[i], epsilon = 1e-12);
        }

        assert!(matches!(
            setup.binauralize(&signals, 44100, Some(&hrirs)),
            Err(SpatialError::SampleRateMismatch { expected: 44100, got: 48000 })
        ));

        let silent = setup.binauralize(&Array2::zeros((6, 4)), 48000, None).unwrap();
        assert_eq!(silent.peak(), 0.0);
    }
}
