//! Decoder configuration

use nalgebra::Vector3;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::decoder::{
    AmbisonicOptions, DEFAULT_N_KERNEL, DecodingMode, LoudspeakerSetup, OutsidePolicy, VbapOptions,
    decode_with,
};
use crate::error::SpatialResult;
use crate::sdm::Jobs;

/// Decoding configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Point-source decoding method
    pub mode: DecodingMode,
    /// Kernel order for ambisonic setup
    pub n_kernel: usize,
    /// SH order for ALLRAP (None = characteristic order)
    pub n_sph: Option<usize>,
    /// VBAP outside policy
    pub outside: OutsidePolicy,
    /// Per-row gain normalization
    pub norm: Option<f64>,
    /// SDM workers
    pub jobs: Jobs,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            mode: DecodingMode::Vbap,
            n_kernel: DEFAULT_N_KERNEL,
            n_sph: None,
            outside: OutsidePolicy::ClampToNearest,
            norm: None,
            jobs: Jobs::Auto,
        }
    }
}

impl DecoderConfig {
    /// Parse from JSON; missing fields take defaults
    pub fn from_json(json: &str) -> SpatialResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> SpatialResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Set mode
    pub fn with_mode(mut self, mode: DecodingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set kernel order
    pub fn with_n_kernel(mut self, n_kernel: usize) -> Self {
        self.n_kernel = n_kernel;
        self
    }

    /// Set SH order
    pub fn with_n_sph(mut self, n_sph: usize) -> Self {
        self.n_sph = Some(n_sph);
        self
    }

    /// Set outside policy
    pub fn with_outside(mut self, outside: OutsidePolicy) -> Self {
        self.outside = outside;
        self
    }

    /// Set SDM workers
    pub fn with_jobs(mut self, jobs: Jobs) -> Self {
        self.jobs = jobs;
        self
    }

    /// VBAP options derived from this config
    pub fn vbap_options(&self) -> VbapOptions {
        VbapOptions {
            norm: self.norm,
            outside: self.outside,
        }
    }

    /// Ambisonic options derived from this config
    pub fn ambisonic_options(&self) -> AmbisonicOptions {
        AmbisonicOptions::new(self.n_kernel)
    }

    /// True if decoding needs the ambisonic hulls
    pub fn needs_ambisonics(&self) -> bool {
        matches!(self.mode, DecodingMode::Allrap | DecodingMode::Allrap2)
            || self.outside == OutsidePolicy::ImaginaryFade
    }

    /// Prepare `setup` if needed and decode
    pub fn decode(&self, sources: &[Vector3<f64>], setup: &mut LoudspeakerSetup) -> SpatialResult<Array2<f64>> {
        let prepared = setup
            .ambisonic()
            .is_some_and(|h| h.options.n_kernel == self.n_kernel);
        if self.needs_ambisonics() && !prepared {
            setup.setup_for_ambisonic(&self.ambisonic_options())?;
        }
        decode_with(self.mode, sources, setup, self.n_sph, &self.vbap_options())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_defaults() {
        let config = DecoderConfig::from_json(r#"{"mode": "allrap2", "jobs": {"parallel": 4}}"#).unwrap();
        assert_eq!(config.mode, DecodingMode::Allrap2);
        assert_eq!(config.jobs, Jobs::Parallel(4));
        assert_eq!(config.n_kernel, DEFAULT_N_KERNEL);
        assert!(config.needs_ambisonics());

        let round = DecoderConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(round, config);
    }

    #[test]
    fn test_builders() {
        let config = DecoderConfig::default()
            .with_mode(DecodingMode::Nls)
            .with_n_sph(3)
            .with_outside(OutsidePolicy::Zero)
            .with_jobs(Jobs::Sequential);
        assert_eq!(config.n_sph, Some(3));
        assert_eq!(config.vbap_options().outside, OutsidePolicy::Zero);
        assert!(!config.needs_ambisonics());
        assert!(DecoderConfig::from_json(r#"{"mode": "bogus"}"#).is_err());
    }
}
