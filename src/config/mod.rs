//! Run configuration and derived quantities
//!
//! Everything here is fixed before the scan starts: filament geometry,
//! the spool weight (explicit or recovered from the header), and the
//! derived conversion factor and trigger weight. Validation happens up
//! front so the tracker can rely on a positive trigger weight.

use crate::gcode;
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("spool weight not provided and not found in G-code header; supply --spool-weight")]
    SpoolWeightUnresolved,

    #[error("spool weight must be positive, got {0}g")]
    SpoolWeightNotPositive(f64),

    #[error("filament diameter must be positive, got {0}mm")]
    DiameterNotPositive(f64),

    #[error("filament density must be positive, got {0}g/cm³")]
    DensityNotPositive(f64),

    #[error("safety margin must be in [0, 1), got {0}")]
    MarginOutOfRange(f64),

    #[error("debug interval must be positive")]
    DebugIntervalZero,
}

/// How the E word on a move line is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtrusionMode {
    /// Each E value is an incremental filament length.
    Relative,
    /// Each E value is a cumulative position, differenced against the
    /// previous one.
    Absolute,
}

/// Immutable configuration for one tracking run.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Filament diameter in mm.
    pub filament_diameter: f64,
    /// Filament density in g/cm³.
    pub filament_density: f64,
    pub extrusion_mode: ExtrusionMode,
    /// Directive text injected at each threshold crossing.
    pub color_change_command: String,
    /// Fraction of the spool left unused (trigger fires below nominal).
    pub safety_margin: f64,
    /// Moves faster than this (mm/min) are not counted. None disables
    /// the filter.
    pub feedrate_cutoff: Option<f64>,
    /// Scaling factor applied to the computed weight.
    pub scale: f64,
    /// Only inject at layer-change markers.
    pub layer_gated: bool,
    /// Qualifying lines between accounting samples on the event sink.
    pub debug_interval: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            filament_diameter: 1.75,
            filament_density: 1.25,
            extrusion_mode: ExtrusionMode::Relative,
            color_change_command: "M600".to_string(),
            safety_margin: 0.03,
            feedrate_cutoff: Some(3000.0),
            scale: 1.0,
            layer_gated: false,
            debug_interval: 100,
        }
    }
}

impl TrackerConfig {
    /// Check the preconditions the scan relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.filament_diameter <= 0.0 {
            return Err(ConfigError::DiameterNotPositive(self.filament_diameter));
        }
        if self.filament_density <= 0.0 {
            return Err(ConfigError::DensityNotPositive(self.filament_density));
        }
        if !(0.0..1.0).contains(&self.safety_margin) {
            return Err(ConfigError::MarginOutOfRange(self.safety_margin));
        }
        if self.debug_interval == 0 {
            return Err(ConfigError::DebugIntervalZero);
        }
        Ok(())
    }

    /// Grams of filament per mm of E-axis travel.
    ///
    /// cross-section area (mm²) × density (g/cm³) / 1000, scaled.
    pub fn conversion_factor(&self) -> f64 {
        let area = PI * (self.filament_diameter / 2.0).powi(2);
        (area * self.filament_density / 1000.0) * self.scale
    }

    /// Cumulative weight at which a color change fires.
    pub fn trigger_weight(&self, spool_weight: f64) -> f64 {
        spool_weight * (1.0 - self.safety_margin)
    }
}

/// Resolve the spool weight: an explicit value wins, otherwise the
/// header comment is consulted. Neither is a fatal configuration error.
pub fn resolve_spool_weight<'a, I>(explicit: Option<f64>, lines: I) -> Result<f64, ConfigError>
where
    I: IntoIterator<Item = &'a str>,
{
    let weight = match explicit {
        Some(w) => w,
        None => gcode::spool_weight_from_header(lines)
            .ok_or(ConfigError::SpoolWeightUnresolved)?,
    };
    if weight <= 0.0 {
        return Err(ConfigError::SpoolWeightNotPositive(weight));
    }
    Ok(weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_conversion_factor_default_filament() {
        // 1.75mm PLA at 1.25 g/cm³: π·0.875²·1.25/1000 ≈ 0.003006 g/mm
        let config = TrackerConfig::default();
        let factor = config.conversion_factor();
        assert!((factor - 0.003006).abs() < 1e-5, "got {factor}");
    }

    #[test]
    fn test_conversion_factor_scaled() {
        let config = TrackerConfig {
            scale: 2.0,
            ..TrackerConfig::default()
        };
        let base = TrackerConfig::default().conversion_factor();
        assert!((config.conversion_factor() - base * 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_trigger_weight() {
        let config = TrackerConfig {
            safety_margin: 0.03,
            ..TrackerConfig::default()
        };
        assert_eq!(config.trigger_weight(1000.0), 970.0);
    }

    #[test]
    fn test_validate_rejects_bad_margin() {
        let config = TrackerConfig {
            safety_margin: 1.0,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MarginOutOfRange(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let config = TrackerConfig {
            filament_diameter: 0.0,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DiameterNotPositive(_))
        ));

        let config = TrackerConfig {
            filament_density: -1.0,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DensityNotPositive(_))
        ));
    }

    #[test]
    fn test_resolve_explicit_wins_over_header() {
        let lines = vec!["; spool weight: 500g"];
        let weight = resolve_spool_weight(Some(750.0), lines).unwrap();
        assert_eq!(weight, 750.0);
    }

    #[test]
    fn test_resolve_falls_back_to_header() {
        let lines = vec!["; spool weight: 1 kg"];
        let weight = resolve_spool_weight(None, lines).unwrap();
        assert_eq!(weight, 1000.0);
    }

    #[test]
    fn test_resolve_unresolved_is_fatal() {
        let lines: Vec<&str> = vec!["G1 X0 Y0"];
        assert!(matches!(
            resolve_spool_weight(None, lines),
            Err(ConfigError::SpoolWeightUnresolved)
        ));
    }

    #[test]
    fn test_resolve_rejects_non_positive() {
        let lines: Vec<&str> = vec![];
        assert!(matches!(
            resolve_spool_weight(Some(0.0), lines),
            Err(ConfigError::SpoolWeightNotPositive(_))
        ));
    }
}
