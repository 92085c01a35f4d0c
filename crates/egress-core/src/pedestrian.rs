//! Pedestrian state, transition probabilities, target selection, and
//! placement.

use crate::dynamic_field::DynamicField;
use crate::exits::ExitSet;
use crate::fire::FireState;
use crate::geometry::rand_within;
use crate::grid::{CellKind, Coordinate, ExitCellKind, Grid, RiskKind};
use crate::{EgressConfig, SimulationError, StaticFieldVariant, TOLERANCE};
use rand::rngs::SmallRng;

/// Lifecycle states of a pedestrian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PedestrianState {
    /// Evaluating and committing movements.
    Moving,
    /// Denied this timestep by conflict resolution.
    Stopped,
    /// Standing on an exit cell for the one-timestep dwell.
    Leaving,
    /// Evacuated; terminal.
    GotOut,
    /// Caught by the fire; terminal.
    Dead,
}

/// A single pedestrian. The id is 1-based and doubles as the stable index
/// (id - 1) into the owning set.
#[derive(Debug, Clone)]
pub struct Pedestrian {
    pub id: u32,
    pub state: PedestrianState,
    pub origin: Coordinate,
    pub previous: Coordinate,
    pub current: Coordinate,
    pub target: Coordinate,
    pub probabilities: [[f64; 3]; 3],
}

impl Pedestrian {
    fn new(id: u32, origin: Coordinate) -> Self {
        Self {
            id,
            state: PedestrianState::Moving,
            origin,
            previous: origin,
            current: origin,
            target: Coordinate::new(-1, -1),
            probabilities: [[0.0; 3]; 3],
        }
    }

    /// Whether the pedestrian is still inside the environment.
    #[must_use]
    pub fn is_in_environment(&self) -> bool {
        !matches!(self.state, PedestrianState::GotOut | PedestrianState::Dead)
    }
}

/// The dense, id-ordered pedestrian population of one run.
#[derive(Debug, Clone, Default)]
pub struct PedestrianSet {
    list: Vec<Pedestrian>,
    num_dead: u32,
}

impl PedestrianSet {
    /// Construct an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pedestrian at `origin`, returning its id.
    pub fn add(&mut self, origin: Coordinate) -> u32 {
        let id = self.list.len() as u32 + 1;
        self.list.push(Pedestrian::new(id, origin));
        id
    }

    /// Number of pedestrians ever added this run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether the set holds no pedestrians.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Number of pedestrians killed by the fire.
    #[must_use]
    pub const fn num_dead(&self) -> u32 {
        self.num_dead
    }

    pub(crate) fn record_death(&mut self) {
        self.num_dead += 1;
    }

    /// Borrow a pedestrian by id.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Pedestrian> {
        self.list.get(id as usize - 1)
    }

    /// Mutably borrow a pedestrian by id.
    #[must_use]
    pub fn get_mut(&mut self, id: u32) -> Option<&mut Pedestrian> {
        self.list.get_mut(id as usize - 1)
    }

    /// Iterate in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Pedestrian> {
        self.list.iter()
    }

    /// Iterate mutably in id order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pedestrian> {
        self.list.iter_mut()
    }

    /// Whether no pedestrian remains in a non-terminal state.
    #[must_use]
    pub fn is_environment_empty(&self) -> bool {
        self.list.iter().all(|pedestrian| {
            matches!(
                pedestrian.state,
                PedestrianState::GotOut | PedestrianState::Dead
            )
        })
    }

    /// Returns stopped pedestrians to `Moving` for the next timestep.
    /// Leaving and terminal states are untouched.
    pub fn reset_states(&mut self) {
        for pedestrian in &mut self.list {
            if !matches!(
                pedestrian.state,
                PedestrianState::GotOut | PedestrianState::Leaving | PedestrianState::Dead
            ) {
                pedestrian.state = PedestrianState::Moving;
            }
        }
    }

    /// Restores every pedestrian to its origin with state `Moving` and
    /// rewrites the position grid accordingly.
    pub fn reset_to_origins(&mut self, positions: &mut Grid<u32>, heatmap: &mut Grid<u32>) {
        positions.fill(0);
        for pedestrian in &mut self.list {
            pedestrian.previous = pedestrian.origin;
            pedestrian.current = pedestrian.origin;
            pedestrian.state = PedestrianState::Moving;
            positions[pedestrian.current] = pedestrian.id;
            heatmap[pedestrian.current] += 1;
        }
        self.num_dead = 0;
    }

    /// Discards the whole population (random-placement runs rebuild it).
    pub fn clear(&mut self) {
        self.list.clear();
        self.num_dead = 0;
    }

    /// Rewrites the position grid from the pedestrians still inside the
    /// environment and bumps their heatmap counts.
    pub fn update_position_grid(&self, positions: &mut Grid<u32>, heatmap: &mut Grid<u32>) {
        positions.fill(0);
        for pedestrian in &self.list {
            if !pedestrian.is_in_environment() {
                continue;
            }
            positions[pedestrian.current] = pedestrian.id;
            heatmap[pedestrian.current] += 1;
        }
    }
}

/// Immutable views of the grids consulted while evaluating one movement.
pub struct FieldView<'a> {
    pub obstacles: &'a Grid<CellKind>,
    pub exits_only: &'a Grid<ExitCellKind>,
    pub positions: &'a Grid<u32>,
    pub dynamic_field: &'a DynamicField,
    pub fire: &'a FireState,
    pub distance_to_exits: &'a Grid<f64>,
}

impl FieldView<'_> {
    /// Whether `at` cannot be entered at all: out of bounds, wall, or an
    /// exit sealed by fire.
    fn is_impassable(&self, at: Coordinate) -> bool {
        match self.obstacles.get(at) {
            None => true,
            Some(CellKind::Empty) => false,
            Some(CellKind::Obstacle) => self.exits_only[at] != ExitCellKind::Exit,
        }
    }
}

/// Fills the pedestrian's 3x3 stencil with normalized transition
/// probabilities over the four axial neighbors and the center.
pub fn calculate_transition_probabilities(
    pedestrian: &mut Pedestrian,
    static_field: &Grid<f64>,
    view: &FieldView,
    config: &EgressConfig,
    self_trace: Option<Coordinate>,
) {
    let mut normalization = 0.0;

    for i in 0..3usize {
        for j in 0..3usize {
            if i != 1 && j != 1 {
                // Diagonal movements carry no probability.
                pedestrian.probabilities[i][j] = 0.0;
                continue;
            }

            let cell = Coordinate::new(
                pedestrian.current.lin + i as i32 - 1,
                pedestrian.current.col + j as i32 - 1,
            );

            if view.is_impassable(cell)
                || view.fire.is_on_fire(cell)
                || view.fire.risk(cell) == RiskKind::Danger
            {
                pedestrian.probabilities[i][j] = 0.0;
                continue;
            }

            let static_term = match config.static_field_variant {
                StaticFieldVariant::Zheng => (config.static_coupling * static_field[cell]).exp(),
                StaticFieldVariant::Varas => (-config.static_coupling * static_field[cell]).exp(),
            };
            let mut probability = static_term;

            let mut trail = view.dynamic_field.value(cell);
            if config.ignore_latest_self_trace && self_trace == Some(cell) {
                trail = (trail - 1.0).max(0.0);
            }
            probability *= (config.dynamic_coupling * trail).exp();

            if view.fire.risk(cell) == RiskKind::NonRisky {
                // Risky cells skip the divisor: the pedestrian takes the
                // calculated risk and ignores the fire's influence.
                let amplification = if view.distance_to_exits[cell] < config.risk_distance {
                    config.fire_alpha
                } else {
                    1.0
                };
                probability /=
                    (config.fire_coupling * amplification * view.fire.field()[cell]).exp();
            }

            if !(i == 1 && j == 1) && view.positions[cell] > 0 {
                probability = 0.0;
            }

            pedestrian.probabilities[i][j] = probability;
            normalization += probability;
        }
    }

    if pedestrian.previous != pedestrian.current {
        // Moved last timestep: bias the cell straight ahead.
        let mask = inertia_mask(pedestrian.previous, pedestrian.current);
        let i = (mask.lin + 1) as usize;
        let j = (mask.col + 1) as usize;
        let former = pedestrian.probabilities[i][j];
        pedestrian.probabilities[i][j] *= config.inertia;
        normalization += pedestrian.probabilities[i][j] - former;
    }

    if normalization != 0.0 {
        let inverse = normalization.recip();
        for row in &mut pedestrian.probabilities {
            for probability in row {
                *probability *= inverse;
            }
        }
    }
}

/// The direction that extends the movement `previous -> current` one more
/// cell.
#[must_use]
pub fn inertia_mask(previous: Coordinate, current: Coordinate) -> Coordinate {
    Coordinate::new(current.lin - previous.lin, current.col - previous.col)
}

/// Draws the destination cell from the pedestrian's stencil.
///
/// On rounding exhaustion (or an all-zero stencil) the pedestrian stays.
pub fn transition_selection(pedestrian: &Pedestrian, rng: &mut SmallRng) -> Coordinate {
    let draw = rand_within(rng, 0.0, 1.0);

    let mut total = 0.0;
    for i in 0..3usize {
        for j in 0..3usize {
            let probability = pedestrian.probabilities[i][j];
            if probability == 0.0 {
                continue;
            }
            total += probability;
            if draw <= total + TOLERANCE {
                return Coordinate::new(
                    pedestrian.current.lin + i as i32 - 1,
                    pedestrian.current.col + j as i32 - 1,
                );
            }
        }
    }

    pedestrian.current
}

/// Collects the non-blocked exit cells visible from `origin` and reports
/// whether any was occluded by fire.
#[must_use]
pub fn visible_exit_cells(
    origin: Coordinate,
    exits: &ExitSet,
    fire: &FireState,
) -> (bool, Vec<Coordinate>) {
    let mut any_occluded = false;
    let mut visible = Vec::new();

    for exit in exits.exits() {
        if exit.is_blocked_by_fire() {
            continue;
        }
        for &cell in exit.coordinates() {
            if is_vision_blocked(origin, cell, fire) {
                any_occluded = true;
            } else {
                visible.push(cell);
            }
        }
    }

    (any_occluded, visible)
}

/// Bresenham line walk from `origin` to `destination`, reporting whether any
/// visited cell burns.
#[must_use]
pub fn is_vision_blocked(origin: Coordinate, destination: Coordinate, fire: &FireState) -> bool {
    if fire.is_on_fire(origin) {
        return true;
    }

    let mut dx = destination.col - origin.col;
    let mut dy = destination.lin - origin.lin;
    let x_step = if dx < 0 { -1 } else { 1 };
    let y_step = if dy < 0 { -1 } else { 1 };
    dx = dx.abs();
    dy = dy.abs();

    let ddx = 2 * dx;
    let ddy = 2 * dy;

    let mut x = origin.col;
    let mut y = origin.lin;

    if ddx >= ddy {
        let mut error = ddy - dx;
        for _ in 0..dx {
            x += x_step;
            if error > 0 {
                y += y_step;
                error -= ddx;
            }
            error += ddy;
            if fire.is_on_fire(Coordinate::new(y, x)) {
                return true;
            }
        }
    } else {
        let mut error = ddx - dy;
        for _ in 0..dy {
            y += y_step;
            if error > 0 {
                x += x_step;
                error -= ddy;
            }
            error += ddx;
            if fire.is_on_fire(Coordinate::new(y, x)) {
                return true;
            }
        }
    }

    false
}

/// Whether a pedestrian may be placed at `at`.
fn is_cell_empty(
    at: Coordinate,
    obstacles: &Grid<CellKind>,
    positions: &Grid<u32>,
    fire: &FireState,
) -> bool {
    obstacles[at] == CellKind::Empty && positions[at] == 0 && !fire.is_on_fire(at)
}

/// Places `count` pedestrians at random interior cells.
///
/// Each draw picks a starting cell; occupied cells defer the pedestrian to
/// the next empty cell in scan order, wrapping around at most once.
#[allow(clippy::too_many_arguments)]
pub fn insert_pedestrians_at_random(
    set: &mut PedestrianSet,
    count: usize,
    rng: &mut SmallRng,
    obstacles: &Grid<CellKind>,
    fire: &FireState,
    positions: &mut Grid<u32>,
    heatmap: &mut Grid<u32>,
) -> Result<(), SimulationError> {
    if count == 0 {
        return Err(SimulationError::InvalidConfig(
            "the number of pedestrians to place must be positive",
        ));
    }

    positions.fill(0);
    set.clear();

    let line_limit = obstacles.lines() as i32 - 1;
    let column_limit = obstacles.columns() as i32 - 1;

    for _ in 0..count {
        let mut line = rand_within(rng, 1.0, f64::from(line_limit)) as i32;
        let mut column = rand_within(rng, 1.0, f64::from(column_limit)) as i32;
        let mut already_looping = false;

        'placement: loop {
            while line < line_limit {
                while column < column_limit {
                    let cell = Coordinate::new(line, column);
                    if is_cell_empty(cell, obstacles, positions, fire) {
                        let id = set.add(cell);
                        positions[cell] = id;
                        heatmap[cell] += 1;
                        break 'placement;
                    }
                    column += 1;
                }
                column = 1;
                line += 1;
            }

            if already_looping {
                return Err(SimulationError::NoSpaceForPedestrians { requested: count });
            }
            line = 1;
            column = 1;
            already_looping = true;
        }
    }

    Ok(())
}
