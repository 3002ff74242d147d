//! Loudspeaker layout presets
//!
//! Layouts are data: directions in degrees plus the pruning limits that suit
//! them. Built-in presets are looked up by name; custom ones load from JSON.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{SpatialError, SpatialResult};
use crate::geometry::PruneLimits;
use crate::position::Direction;

/// Built-in layout record
struct BuiltinLayout {
    name: &'static str,
    azimuth_deg: &'static [f64],
    colatitude_deg: &'static [f64],
    /// Normal, aperture and opening limits (degrees)
    limits: [f64; 3],
}

const BUILTIN_LAYOUTS: &[BuiltinLayout] = &[
    BuiltinLayout {
        name: "aalto_full",
        azimuth_deg: &[
            -18.0, -54.0, -90.0, -126.0, -162.0, -198.0, -234.0, -270.0, -306.0, -342.0, 0.0, -72.0, -144.0,
            -216.0, -288.0, -45.0, -135.0, -225.0, -315.0, 0.0,
        ],
        colatitude_deg: &[
            90.0, 90.0, 90.0, 90.0, 90.0, 90.0, 90.0, 90.0, 90.0, 90.0, 100.0, 100.0, 100.0, 100.0, 100.0, 45.0,
            45.0, 45.0, 45.0, 0.0,
        ],
        limits: [85.0, 90.0, 150.0],
    },
    BuiltinLayout {
        name: "aalto_partial",
        azimuth_deg: &[-80.0, -45.0, 0.0, 45.0, 80.0, -60.0, -30.0, 30.0, 60.0],
        colatitude_deg: &[90.0, 90.0, 90.0, 90.0, 90.0, 30.0, 30.0, 30.0, 30.0],
        limits: [85.0, 90.0, 150.0],
    },
    BuiltinLayout {
        name: "graz",
        azimuth_deg: &[
            0.0, 23.7, 48.2, 72.6, 103.1, -100.9, -69.8, -44.8, -21.4, 22.7, 67.9, 114.2, -113.3, -65.4, -22.7,
            46.8, 133.4, -133.4, -43.4,
        ],
        colatitude_deg: &[
            90.0, 89.6, 89.4, 89.3, 89.4, 89.4, 89.6, 89.5, 89.5, 61.5, 61.5, 62.1, 61.6, 61.5, 62.0, 33.0, 33.0,
            33.4, 32.3,
        ],
        limits: [85.0, 90.0, 135.0],
    },
];

impl BuiltinLayout {
    fn to_preset(&self) -> LayoutPreset {
        let [normal, aperture, opening] = self.limits;
        LayoutPreset {
            name: self.name.to_string(),
            azimuth_deg: self.azimuth_deg.to_vec(),
            colatitude_deg: self.colatitude_deg.to_vec(),
            listener: [0.0; 3],
            normal_limit: Some(normal),
            aperture_limit: Some(aperture),
            opening_limit: Some(opening),
            blacklist: Vec::new(),
            planar_fallback: false,
        }
    }
}

/// Names of the built-in presets
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN_LAYOUTS.iter().map(|layout| layout.name)
}

/// Layout description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutPreset {
    /// Preset name
    pub name: String,
    /// Azimuth per loudspeaker (degrees)
    pub azimuth_deg: Vec<f64>,
    /// Colatitude per loudspeaker (degrees)
    pub colatitude_deg: Vec<f64>,
    /// Listener position
    #[serde(default)]
    pub listener: [f64; 3],
    /// Normal deviation limit (degrees)
    #[serde(default)]
    pub normal_limit: Option<f64>,
    /// Aperture limit (degrees)
    #[serde(default)]
    pub aperture_limit: Option<f64>,
    /// Opening angle limit (degrees)
    #[serde(default)]
    pub opening_limit: Option<f64>,
    /// Triangles to remove regardless of limits
    #[serde(default)]
    pub blacklist: Vec<[usize; 3]>,
    /// Close coplanar layouts with imaginary apex points
    #[serde(default)]
    pub planar_fallback: bool,
}

impl LayoutPreset {
    /// Built-in preset by name
    pub fn builtin(name: &str) -> SpatialResult<Self> {
        BUILTIN_LAYOUTS
            .iter()
            .find(|layout| layout.name == name)
            .map(BuiltinLayout::to_preset)
            .ok_or_else(|| {
                SpatialError::Config(format!(
                    "unknown layout '{name}', expected one of {}",
                    builtin_names().collect::<Vec<_>>().join(", ")
                ))
            })
    }

    /// Parse and validate a JSON description
    pub fn from_json(json: &str) -> SpatialResult<Self> {
        let preset: Self = serde_json::from_str(json)?;
        preset.validate()?;
        Ok(preset)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> SpatialResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check angle counts and values
    pub fn validate(&self) -> SpatialResult<()> {
        if self.colatitude_deg.len() != self.azimuth_deg.len() {
            return Err(SpatialError::LengthMismatch {
                what: "colatitude_deg",
                expected: self.azimuth_deg.len(),
                got: self.colatitude_deg.len(),
            });
        }
        let angles_ok = self
            .azimuth_deg
            .iter()
            .chain(&self.colatitude_deg)
            .chain(&self.listener)
            .all(|a| a.is_finite());
        if !angles_ok {
            return Err(SpatialError::Config(format!("layout '{}' has non-finite values", self.name)));
        }
        let n = self.azimuth_deg.len();
        if let Some(bad) = self.blacklist.iter().flatten().find(|&&i| i >= n) {
            return Err(SpatialError::Config(format!(
                "blacklist index {bad} out of range for {n} loudspeakers"
            )));
        }
        Ok(())
    }

    /// Number of loudspeakers
    pub fn len(&self) -> usize {
        self.azimuth_deg.len()
    }

    /// True if no loudspeakers are listed
    pub fn is_empty(&self) -> bool {
        self.azimuth_deg.is_empty()
    }

    /// Loudspeaker directions
    pub fn directions(&self) -> Vec<Direction> {
        self.azimuth_deg
            .iter()
            .zip(&self.colatitude_deg)
            .map(|(&azi, &col)| Direction::from_degrees(azi, col))
            .collect()
    }

    /// Loudspeaker positions on the unit sphere around the listener
    pub fn positions(&self) -> Vec<Vector3<f64>> {
        let listener = Vector3::from(self.listener);
        self.directions().iter().map(|d| d.to_vector() + listener).collect()
    }

    /// Pruning limits
    pub fn limits(&self) -> PruneLimits {
        PruneLimits {
            normal: self.normal_limit,
            aperture: self.aperture_limit,
            opening: self.opening_limit,
        }
    }
}
