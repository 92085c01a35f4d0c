//! The per-timestep driver owning every grid, the exit set, the pedestrian
//! population, and the run RNG.

use crate::conflict::{identify_conflicts, resolve_x_crossings, solve_conflicts};
use crate::dynamic_field::DynamicField;
use crate::environment::EnvironmentLayout;
use crate::exits::{compute_distance_to_exits, ExitSet};
use crate::fire::FireState;
use crate::grid::{CellKind, Coordinate, ExitCellKind, Grid};
use crate::pedestrian::{
    calculate_transition_probabilities, insert_pedestrians_at_random, transition_selection,
    visible_exit_cells, FieldView, PedestrianSet, PedestrianState,
};
use crate::static_field::{compute_all_static_weights, compute_zheng_field, merge_varas_global};
use crate::{EgressConfig, SimulationError, StaticFieldVariant};
use rand::rngs::SmallRng;
use rand::SeedableRng;

/// Events emitted by one timestep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepEvents {
    /// The timestep that just completed (1-based).
    pub timestep: u32,
    /// Pedestrians killed by fire at the start of this timestep.
    pub deaths: u32,
    /// Same-target conflicts resolved this timestep.
    pub conflicts: usize,
    /// Whether the fire front advanced at the end of this timestep.
    pub fire_spread: bool,
    /// Whether the spread sealed at least one exit.
    pub exits_newly_blocked: bool,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Timesteps until the environment emptied (or the ceiling).
    pub timesteps: u32,
    /// Pedestrians that reached an exit.
    pub evacuated: u32,
    /// Pedestrians killed by the fire.
    pub dead: u32,
    /// Whether the caller-imposed timestep ceiling cut the run short.
    pub ceiling_hit: bool,
}

/// One simulation set: environment grids, exits, fields, fire, pedestrians,
/// and the seeded RNG, advanced one atomic timestep at a time.
#[derive(Debug)]
pub struct Simulation {
    config: EgressConfig,
    rng: SmallRng,
    timestep: u32,
    obstacles: Grid<CellKind>,
    exits_only: Grid<ExitCellKind>,
    positions: Grid<u32>,
    heatmap: Grid<u32>,
    exits: ExitSet,
    fire: FireState,
    dynamic_field: DynamicField,
    static_field: Grid<f64>,
    aux_static_field: Grid<f64>,
    distance_to_exits: Grid<f64>,
    pedestrians: PedestrianSet,
    static_pedestrians: Vec<Coordinate>,
    empty_cell_count: usize,
}

impl Simulation {
    /// Builds a simulation set from a parsed configuration, an environment
    /// layout, and the exit groups of this set.
    ///
    /// Fails with [`SimulationError::InaccessibleExit`] when any exit has no
    /// passable approach; callers treat that as a skippable set.
    pub fn new(
        mut config: EgressConfig,
        layout: &EnvironmentLayout,
        exit_groups: &[Vec<Coordinate>],
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        config.fire_present = config.fire_present || layout.fire_present();

        let lines = layout.lines();
        let columns = layout.columns();
        let obstacles = layout.obstacles().clone();

        let mut exits = ExitSet::from_groups(exit_groups, lines, columns);
        compute_all_static_weights(&mut exits, &obstacles, &config)?;

        let mut exits_only = Grid::new(lines, columns, ExitCellKind::Empty);
        exits.mark_exit_cells(&mut exits_only);

        let fire = FireState::new(
            lines,
            columns,
            layout.initial_fires(),
            config.fire_present,
            config.fire_spread_interval(),
        );

        let rng = SmallRng::seed_from_u64(config.seed);
        Ok(Self {
            rng,
            timestep: 0,
            obstacles,
            exits_only,
            positions: Grid::new(lines, columns, 0),
            heatmap: Grid::new(lines, columns, 0),
            exits,
            fire,
            dynamic_field: DynamicField::new(lines, columns),
            static_field: Grid::new(lines, columns, 0.0),
            aux_static_field: Grid::new(lines, columns, 0.0),
            distance_to_exits: Grid::new(lines, columns, f64::INFINITY),
            pedestrians: PedestrianSet::new(),
            static_pedestrians: layout.pedestrians().to_vec(),
            empty_cell_count: layout.count_empty_cells(),
            config,
        })
    }

    /// Prepares a fresh run: reseeds the RNG, restores the fire front and
    /// exits, zeroes the dynamic field, and (re)places the pedestrians.
    pub fn begin_run(&mut self, seed: u64) -> Result<(), SimulationError> {
        self.rng = SmallRng::seed_from_u64(seed);
        self.timestep = 0;

        self.dynamic_field.reset();
        self.fire.reset_run();
        self.exits.reset_blocked();
        self.exits.mark_exit_cells(&mut self.exits_only);
        self.fire
            .recompute_fields(&self.obstacles, &self.exits_only, self.config.fire_gamma);

        if self.static_pedestrians.is_empty() {
            let count = match self.config.density {
                Some(density) => (self.empty_cell_count as f64 * density) as usize,
                None => self.config.pedestrian_count,
            };
            insert_pedestrians_at_random(
                &mut self.pedestrians,
                count,
                &mut self.rng,
                &self.obstacles,
                &self.fire,
                &mut self.positions,
                &mut self.heatmap,
            )?;
        } else {
            if self.pedestrians.is_empty() {
                for &origin in &self.static_pedestrians {
                    self.pedestrians.add(origin);
                }
            }
            self.pedestrians
                .reset_to_origins(&mut self.positions, &mut self.heatmap);
        }

        self.refresh_static_field();
        Ok(())
    }

    /// Executes one timestep of the phase pipeline.
    pub fn step(&mut self) -> StepEvents {
        let mut events = StepEvents::default();

        events.deaths = self.stage_fire_deaths();
        self.stage_deposit();
        self.stage_evaluate();
        events.conflicts = self.stage_conflicts();
        self.stage_commit();
        self.stage_update_grids();
        self.pedestrians.reset_states();
        self.stage_dynamic();

        self.timestep += 1;
        events.timestep = self.timestep;

        if self.fire.spreads_at(self.timestep) {
            self.fire.propagate(&self.obstacles);
            self.fire
                .recompute_fields(&self.obstacles, &self.exits_only, self.config.fire_gamma);
            events.fire_spread = true;
            if self
                .exits
                .check_blocked_by_fire(&self.fire, &mut self.exits_only)
            {
                events.exits_newly_blocked = true;
                self.refresh_static_field();
            }
        }

        events
    }

    /// Runs to completion (or to `ceiling` timesteps) from a fresh start.
    pub fn run(&mut self, seed: u64, ceiling: Option<u32>) -> Result<RunOutcome, SimulationError> {
        self.begin_run(seed)?;

        let mut ceiling_hit = false;
        while !self.is_environment_empty() {
            if let Some(limit) = ceiling {
                if self.timestep >= limit {
                    ceiling_hit = true;
                    break;
                }
            }
            self.step();
        }

        let evacuated = self
            .pedestrians
            .iter()
            .filter(|pedestrian| pedestrian.state == PedestrianState::GotOut)
            .count() as u32;
        Ok(RunOutcome {
            timesteps: self.timestep,
            evacuated,
            dead: self.pedestrians.num_dead(),
            ceiling_hit,
        })
    }

    /// Whether no pedestrian remains in a non-terminal state.
    #[must_use]
    pub fn is_environment_empty(&self) -> bool {
        self.pedestrians.is_environment_empty()
    }

    fn stage_fire_deaths(&mut self) -> u32 {
        let mut deaths = 0;
        for pedestrian in self.pedestrians.iter_mut() {
            if !pedestrian.is_in_environment() {
                continue;
            }
            if self.fire.is_on_fire(pedestrian.current) {
                pedestrian.state = PedestrianState::Dead;
                deaths += 1;
            }
        }
        for _ in 0..deaths {
            self.pedestrians.record_death();
        }
        deaths
    }

    fn stage_deposit(&mut self) {
        if self.config.velocity_density_field {
            return; // deposition happens at commit time instead
        }
        for pedestrian in self.pedestrians.iter() {
            if pedestrian.is_in_environment() {
                self.dynamic_field.deposit(pedestrian.current);
            }
        }
    }

    fn stage_evaluate(&mut self) {
        let Self {
            config,
            rng,
            obstacles,
            exits_only,
            positions,
            exits,
            fire,
            dynamic_field,
            static_field,
            aux_static_field,
            distance_to_exits,
            pedestrians,
            ..
        } = self;

        for pedestrian in pedestrians.iter_mut() {
            if pedestrian.state != PedestrianState::Moving {
                continue;
            }

            // Fire can occlude an exit; such pedestrians steer by an
            // auxiliary field over the exits they still see. Occlusion only
            // exists with fire, and only the distance variant consumes the
            // auxiliary field.
            let chosen_field: &Grid<f64> = if fire.is_present()
                && config.static_field_variant == StaticFieldVariant::Zheng
            {
                let (occluded, visible) = visible_exit_cells(pedestrian.current, exits, fire);
                if occluded {
                    compute_zheng_field(aux_static_field, &visible, obstacles, exits_only, fire);
                    aux_static_field
                } else {
                    static_field
                }
            } else {
                static_field
            };

            let self_trace = if config.ignore_latest_self_trace && !config.velocity_density_field
            {
                Some(pedestrian.current)
            } else {
                None
            };

            let view = FieldView {
                obstacles,
                exits_only,
                positions,
                dynamic_field,
                fire,
                distance_to_exits,
            };
            calculate_transition_probabilities(
                pedestrian,
                chosen_field,
                &view,
                config,
                self_trace,
            );
            pedestrian.target = transition_selection(pedestrian, rng);
        }
    }

    fn stage_conflicts(&mut self) -> usize {
        let mut conflicts = identify_conflicts(
            &self.pedestrians,
            self.obstacles.lines(),
            self.obstacles.columns(),
        );
        solve_conflicts(
            &mut conflicts,
            &mut self.pedestrians,
            self.config.conflict_friction,
            &mut self.rng,
        );

        if !self.config.allow_x_movement {
            resolve_x_crossings(&mut self.pedestrians, &self.positions, &mut self.rng);
        }

        conflicts.len()
    }

    fn stage_commit(&mut self) {
        for pedestrian in self.pedestrians.iter_mut() {
            match pedestrian.state {
                PedestrianState::GotOut
                | PedestrianState::Stopped
                | PedestrianState::Dead => continue,
                PedestrianState::Moving => {
                    pedestrian.previous = pedestrian.current;
                    pedestrian.current = pedestrian.target;

                    if self.config.velocity_density_field
                        && pedestrian.previous != pedestrian.current
                    {
                        self.dynamic_field.deposit(pedestrian.previous);
                    }

                    if self.exits_only[pedestrian.current] == ExitCellKind::Exit {
                        pedestrian.state = if self.config.immediate_exit {
                            PedestrianState::GotOut
                        } else {
                            PedestrianState::Leaving
                        };
                    }
                }
                PedestrianState::Leaving => pedestrian.state = PedestrianState::GotOut,
            }
        }
    }

    fn stage_update_grids(&mut self) {
        self.pedestrians
            .update_position_grid(&mut self.positions, &mut self.heatmap);

        #[cfg(debug_assertions)]
        {
            let live = self
                .pedestrians
                .iter()
                .filter(|pedestrian| pedestrian.is_in_environment())
                .count();
            let occupied = self.positions.cells().iter().filter(|&&id| id != 0).count();
            debug_assert_eq!(live, occupied, "unique occupancy violated");
        }
    }

    fn stage_dynamic(&mut self) {
        let Self {
            config,
            obstacles,
            exits_only,
            fire,
            dynamic_field,
            ..
        } = self;
        let blocked = |at: Coordinate| {
            (obstacles[at] == CellKind::Obstacle && exits_only[at] != ExitCellKind::Exit)
                || fire.is_on_fire(at)
        };
        dynamic_field.apply_decay_and_diffusion(config.diffusion, config.decay, blocked);
    }

    fn refresh_static_field(&mut self) {
        let cells = self.exits.non_blocked_cells();
        match self.config.static_field_variant {
            StaticFieldVariant::Zheng => compute_zheng_field(
                &mut self.static_field,
                &cells,
                &self.obstacles,
                &self.exits_only,
                &self.fire,
            ),
            StaticFieldVariant::Varas => merge_varas_global(&mut self.static_field, &self.exits),
        }
        compute_distance_to_exits(&mut self.distance_to_exits, &cells, &self.obstacles);
    }

    /// The effective configuration (fire presence folded in).
    #[must_use]
    pub fn config(&self) -> &EgressConfig {
        &self.config
    }

    /// Mutable access to the configuration, for edits between runs such as
    /// parameter sweeps.
    #[must_use]
    pub fn config_mut(&mut self) -> &mut EgressConfig {
        &mut self.config
    }

    /// Timesteps completed in the current run.
    #[must_use]
    pub const fn timestep(&self) -> u32 {
        self.timestep
    }

    /// The structural grid.
    #[must_use]
    pub fn obstacles(&self) -> &Grid<CellKind> {
        &self.obstacles
    }

    /// The exits-only grid.
    #[must_use]
    pub fn exits_only(&self) -> &Grid<ExitCellKind> {
        &self.exits_only
    }

    /// The pedestrian position grid (0 = empty, otherwise a 1-based id).
    #[must_use]
    pub fn positions(&self) -> &Grid<u32> {
        &self.positions
    }

    /// Cumulative visit counts.
    #[must_use]
    pub fn heatmap(&self) -> &Grid<u32> {
        &self.heatmap
    }

    /// Zeroes the heatmap (between simulation sets).
    pub fn clear_heatmap(&mut self) {
        self.heatmap.fill(0);
    }

    /// The fire subsystem.
    #[must_use]
    pub fn fire(&self) -> &FireState {
        &self.fire
    }

    /// The exit set.
    #[must_use]
    pub fn exits(&self) -> &ExitSet {
        &self.exits
    }

    /// The global static floor field.
    #[must_use]
    pub fn static_field(&self) -> &Grid<f64> {
        &self.static_field
    }

    /// The dynamic floor field.
    #[must_use]
    pub fn dynamic_field(&self) -> &DynamicField {
        &self.dynamic_field
    }

    /// The pedestrian population.
    #[must_use]
    pub fn pedestrians(&self) -> &PedestrianSet {
        &self.pedestrians
    }
}
