//! Core simulation kernel for floor-field pedestrian evacuation studies.
//!
//! The kernel is single-threaded and deterministic given a seed: every random
//! draw flows through one [`rand::rngs::SmallRng`] owned by the
//! [`Simulation`], advanced in the same phase order on every run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod conflict;
pub mod dynamic_field;
pub mod environment;
pub mod exits;
pub mod fire;
pub mod geometry;
pub mod grid;
pub mod pedestrian;
pub mod simulation;
pub mod static_field;

pub use environment::{EnvironmentLayout, EnvironmentOrigin};
pub use exits::{Exit, ExitSet};
pub use fire::FireState;
pub use grid::{CellKind, Coordinate, ExitCellKind, Grid, RiskKind};
pub use pedestrian::{Pedestrian, PedestrianSet, PedestrianState};
pub use simulation::{RunOutcome, Simulation, StepEvents};

/// Slack applied to cumulative-probability comparisons.
pub const TOLERANCE: f64 = 1e-10;

/// Physical edge length of one grid cell, in meters.
pub const CELL_LENGTH: f64 = 0.4;

/// Wall-clock duration of one timestep, in seconds.
pub const TIMESTEP_TIME: f64 = 4.0 / 15.0;

/// Errors raised while configuring or setting up a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The environment text could not be parsed.
    #[error("environment parse error at line {line}: {message}")]
    EnvironmentParse { line: usize, message: String },
    /// The auxiliary simulation-set text could not be parsed.
    #[error("auxiliary file parse error: {0}")]
    AuxiliaryParse(String),
    /// At least one exit of the simulation set cannot be reached.
    #[error("at least one exit of the simulation set is inaccessible")]
    InaccessibleExit,
    /// The environment has fewer free cells than requested pedestrians.
    #[error("not enough empty space to place {requested} pedestrians")]
    NoSpaceForPedestrians { requested: usize },
}

/// Selects how the static floor field is derived from the exit geometry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StaticFieldVariant {
    /// Inverse-distance attraction field; higher values attract.
    #[default]
    Zheng,
    /// Per-exit BFS relaxation merged by minimum; lower values attract.
    Varas,
}

/// Static configuration for an evacuation simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgressConfig {
    /// Number of grid lines (y axis).
    pub lines: usize,
    /// Number of grid columns (x axis).
    pub columns: usize,
    /// Coupling to the static floor field (`k_s`).
    pub static_coupling: f64,
    /// Coupling to the dynamic floor field (`k_d`).
    pub dynamic_coupling: f64,
    /// Coupling to the fire floor field (`k_f`).
    pub fire_coupling: f64,
    /// Dynamic-field diffusion coefficient (`alpha`), in `[0, 1]`.
    pub diffusion: f64,
    /// Dynamic-field decay coefficient (`delta`), in `[0, 1]`.
    pub decay: f64,
    /// Multiplicative bias for continuing in the previous direction (`omega`).
    pub inertia: f64,
    /// Probability that a same-target conflict denies every participant (`mu`).
    pub conflict_friction: f64,
    /// Step cost of a diagonal neighbor in the Varas relaxation.
    pub diagonal_cost: f64,
    /// Which static-field algorithm drives pedestrian motion.
    pub static_field_variant: StaticFieldVariant,
    /// Forbid diagonals that graze a single obstacle corner.
    pub prevent_corner_crossing: bool,
    /// Transition straight to `GotOut` on exit arrival, skipping the dwell.
    pub immediate_exit: bool,
    /// Allow two adjacent pedestrians to cross paths diagonally.
    pub allow_x_movement: bool,
    /// Exclude a pedestrian's own same-timestep deposit from its field reads.
    pub ignore_latest_self_trace: bool,
    /// Deposit dynamic-field density at the vacated cell on commit instead of
    /// at the occupied cell each timestep.
    pub velocity_density_field: bool,
    /// Whether the environment carries fire.
    pub fire_present: bool,
    /// Distance to an exit below which fire avoidance is amplified.
    pub risk_distance: f64,
    /// Fire-avoidance amplification applied within `risk_distance`.
    pub fire_alpha: f64,
    /// Fire influence radius; cells farther from fire carry a zero field.
    pub fire_gamma: f64,
    /// Fire front speed in meters per second.
    pub spread_rate: f64,
    /// Base RNG seed; each run of a batch derives its own from this.
    pub seed: u64,
    /// Number of stochastic runs per simulation set.
    pub num_simulations: u32,
    /// Number of pedestrians placed at random when the environment carries none.
    pub pedestrian_count: usize,
    /// When set, overrides `pedestrian_count` with `density * empty cells`.
    pub density: Option<f64>,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            lines: 10,
            columns: 10,
            static_coupling: 2.0,
            dynamic_coupling: 1.0,
            fire_coupling: 1.0,
            diffusion: 0.3,
            decay: 0.3,
            inertia: 1.0,
            conflict_friction: 0.5,
            diagonal_cost: 1.5,
            static_field_variant: StaticFieldVariant::Zheng,
            prevent_corner_crossing: false,
            immediate_exit: false,
            allow_x_movement: true,
            ignore_latest_self_trace: false,
            velocity_density_field: false,
            fire_present: false,
            risk_distance: 10.0,
            fire_alpha: 2.0,
            fire_gamma: 10.0,
            spread_rate: 0.2,
            seed: 0,
            num_simulations: 1,
            pedestrian_count: 1,
            density: None,
        }
    }
}

impl EgressConfig {
    /// Validates the configuration values against the model's domain.
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.lines < 2 || self.columns < 2 {
            return Err(SimulationError::InvalidConfig(
                "grid dimensions must be at least 2x2",
            ));
        }
        if !(0.0..=1.0).contains(&self.diffusion) {
            return Err(SimulationError::InvalidConfig(
                "diffusion must lie in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.decay) {
            return Err(SimulationError::InvalidConfig("decay must lie in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.conflict_friction) {
            return Err(SimulationError::InvalidConfig(
                "conflict_friction must lie in [0, 1]",
            ));
        }
        if self.inertia < 0.0 {
            return Err(SimulationError::InvalidConfig(
                "inertia must be non-negative",
            ));
        }
        if self.diagonal_cost <= 0.0 {
            return Err(SimulationError::InvalidConfig(
                "diagonal_cost must be positive",
            ));
        }
        if self.risk_distance < 0.0 || self.fire_alpha < 0.0 || self.fire_gamma < 0.0 {
            return Err(SimulationError::InvalidConfig(
                "fire parameters must be non-negative",
            ));
        }
        if self.fire_present && self.spread_rate <= 0.0 {
            return Err(SimulationError::InvalidConfig(
                "spread_rate must be positive when fire is present",
            ));
        }
        if self.num_simulations == 0 {
            return Err(SimulationError::InvalidConfig(
                "num_simulations must be at least 1",
            ));
        }
        if let Some(density) = self.density {
            if !(0.0..=1.0).contains(&density) {
                return Err(SimulationError::InvalidConfig(
                    "density must lie in [0, 1]",
                ));
            }
        }
        Ok(())
    }

    /// Number of timesteps between consecutive fire spreads.
    ///
    /// Derived from the cell geometry and the configured front speed,
    /// never less than one.
    #[must_use]
    pub fn fire_spread_interval(&self) -> u32 {
        if self.spread_rate <= 0.0 {
            return u32::MAX;
        }
        let steps = (CELL_LENGTH / self.spread_rate) / TIMESTEP_TIME;
        (steps as u32).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        EgressConfig::default().validate().expect("default config");
    }

    #[test]
    fn rejects_out_of_range_probabilities() {
        let config = EgressConfig {
            decay: 1.5,
            ..EgressConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SimulationError::InvalidConfig(_))
        ));

        let config = EgressConfig {
            conflict_friction: -0.1,
            ..EgressConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_fire_without_spread_rate() {
        let config = EgressConfig {
            fire_present: true,
            spread_rate: 0.0,
            ..EgressConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn spread_interval_is_clamped() {
        let config = EgressConfig {
            spread_rate: 1.5,
            ..EgressConfig::default()
        };
        assert_eq!(config.fire_spread_interval(), 1);

        let config = EgressConfig {
            spread_rate: 0.1,
            ..EgressConfig::default()
        };
        // 0.4 m / 0.1 m/s = 4 s; 4 s / (4/15) s = 15 steps.
        assert_eq!(config.fire_spread_interval(), 15);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = EgressConfig {
            static_field_variant: StaticFieldVariant::Varas,
            density: Some(0.25),
            ..EgressConfig::default()
        };
        let encoded = serde_json::to_string(&config).expect("encode");
        let decoded: EgressConfig = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded.static_field_variant, StaticFieldVariant::Varas);
        assert_eq!(decoded.density, Some(0.25));
    }
}
