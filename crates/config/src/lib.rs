//! Shared configuration for dynamic topology sculpting
//!
//! This crate is the single source of truth for the session switches used
//! when dynamic topology is enabled, the spatial partition leaf size and the
//! tuning constants of the UV relaxation solver.

use serde::{Deserialize, Serialize};

#[cfg(feature = "bevy")]
use bevy::prelude::Resource;

/// Default maximum number of faces in a spatial partition leaf
pub const DEFAULT_LEAF_LIMIT: usize = 100;

/// Default UV quantization step used to merge corners into solver vertices
pub const DEFAULT_SNAP_LIMIT: f32 = 0.0025;

/// Default number of solver iterations per brush application
pub const DEFAULT_UV_ITERATIONS: u32 = 5;

/// Errors raised while loading configuration documents
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Session-level switches for dynamic topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "bevy", derive(Resource))]
#[serde(default)]
pub struct DyntopoConfig {
    /// Triangulate quads and n-gons when entering dynamic topology
    pub triangulate: bool,
    /// Mark faces smooth-shaded on entry
    pub smooth_shading: bool,
    /// Record undo steps for enable/disable
    pub use_undo: bool,
    pub partition: PartitionConfig,
    pub uv: UvSolverConfig,
}

impl Default for DyntopoConfig {
    fn default() -> Self {
        Self {
            triangulate: true,
            smooth_shading: false,
            use_undo: true,
            partition: PartitionConfig::default(),
            uv: UvSolverConfig::default(),
        }
    }
}

impl DyntopoConfig {
    /// Parse a (possibly partial) JSON document, filling gaps with defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Spatial partition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Maximum faces per leaf node before it is split
    pub leaf_limit: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            leaf_limit: DEFAULT_LEAF_LIMIT,
        }
    }
}

/// Tuning constants for the UV relaxation solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UvSolverConfig {
    /// Quantization step for the (u, v) corner key
    pub snap_limit: f32,
    /// Solver steps per brush application
    pub iterations: u32,
    /// Constraints with a residual below this are skipped
    pub eval_limit: f64,
    /// Finite difference step for residual gradients
    pub finite_difference_step: f64,
    /// Weight given to pinned and boundary vertices
    pub pinned_weight: f64,
    /// Fraction of the step strength used for the neighbor-averaging pass
    pub relax_factor: f64,
    /// Global damping of constraint corrections
    pub correction_factor: f64,
    pub angle_stiffness: f64,
    pub area_stiffness: f64,
    /// Multiplier applied to area residuals
    pub area_residual_scale: f64,
    /// 2D triangle area below which the corners are nudged apart
    pub degenerate_area: f64,
    pub degenerate_nudge: f64,
    /// Corners closer than this to their merged average are welded onto it
    pub weld_distance: f32,
}

impl Default for UvSolverConfig {
    fn default() -> Self {
        Self {
            snap_limit: DEFAULT_SNAP_LIMIT,
            iterations: DEFAULT_UV_ITERATIONS,
            eval_limit: 1e-5,
            finite_difference_step: 1e-4,
            pinned_weight: 1e5,
            relax_factor: 0.1,
            correction_factor: 0.75,
            angle_stiffness: 0.5,
            area_stiffness: 1.0,
            area_residual_scale: 1024.0,
            degenerate_area: 1e-6,
            degenerate_nudge: 1e-4,
            weld_distance: 0.02,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DyntopoConfig::default();
        assert!(config.triangulate);
        assert!(config.use_undo);
        assert_eq!(config.partition.leaf_limit, DEFAULT_LEAF_LIMIT);
        assert_eq!(config.uv.iterations, DEFAULT_UV_ITERATIONS);
        assert_eq!(config.uv.snap_limit, DEFAULT_SNAP_LIMIT);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            DyntopoConfig::from_json_str(r#"{ "triangulate": false, "uv": { "iterations": 9 } }"#)
                .unwrap();
        assert!(!config.triangulate);
        assert_eq!(config.uv.iterations, 9);
        assert_eq!(config.uv.pinned_weight, 1e5);
        assert_eq!(config.partition, PartitionConfig::default());
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = DyntopoConfig::default();
        config.partition.leaf_limit = 12;
        let json = config.to_json_string().unwrap();
        assert_eq!(DyntopoConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(matches!(
            DyntopoConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
