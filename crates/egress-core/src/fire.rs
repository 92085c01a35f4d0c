//! Fire propagation, distance-to-fire computation, risk classification, and
//! the fire floor field.

use crate::geometry::euclidean_distance;
use crate::grid::{CellKind, Coordinate, ExitCellKind, Grid, RiskKind, AXIAL_MODIFIERS, MOORE_MODIFIERS};

/// Fire cells sharing one line (or column), ordered by the other coordinate.
#[derive(Debug, Default)]
struct CoordinateSet {
    main: i32,
    secondary: Vec<i32>,
}

impl CoordinateSet {
    /// Up to three secondary coordinates adjacent to `coordinate`: the match
    /// plus its neighbors when present, or the two flanking entries, or the
    /// single nearest end.
    fn adjacent_secondaries(&self, coordinate: i32, out: &mut Vec<i32>) {
        out.clear();
        match self.secondary.binary_search(&coordinate) {
            Ok(middle) => {
                if middle > 0 {
                    out.push(self.secondary[middle - 1]);
                }
                out.push(self.secondary[middle]);
                if middle + 1 < self.secondary.len() {
                    out.push(self.secondary[middle + 1]);
                }
            }
            Err(insertion) => {
                if insertion == 0 {
                    out.push(self.secondary[0]);
                } else if insertion == self.secondary.len() {
                    out.push(self.secondary[self.secondary.len() - 1]);
                } else {
                    out.push(self.secondary[insertion - 1]);
                    out.push(self.secondary[insertion]);
                }
            }
        }
    }
}

/// Per-line (or per-column) partition of the fire cells.
#[derive(Debug, Default)]
struct CoordinateSetCollection {
    sets: Vec<CoordinateSet>,
}

impl CoordinateSetCollection {
    fn clear(&mut self) {
        self.sets.clear();
    }

    /// Appends one fire coordinate; the scan order guarantees `main` never
    /// decreases, so a new set opens whenever it grows.
    fn push(&mut self, main: i32, secondary: i32) {
        match self.sets.last_mut() {
            Some(set) if set.main == main => set.secondary.push(secondary),
            _ => self.sets.push(CoordinateSet {
                main,
                secondary: vec![secondary],
            }),
        }
    }

    fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Indices of up to three sets whose main coordinates bracket
    /// `coordinate`, mirroring [`CoordinateSet::adjacent_secondaries`].
    fn adjacent_sets(&self, coordinate: i32, out: &mut Vec<usize>) {
        out.clear();
        match self
            .sets
            .binary_search_by_key(&coordinate, |set| set.main)
        {
            Ok(middle) => {
                if middle > 0 {
                    out.push(middle - 1);
                }
                out.push(middle);
                if middle + 1 < self.sets.len() {
                    out.push(middle + 1);
                }
            }
            Err(insertion) => {
                if insertion == 0 {
                    out.push(0);
                } else if insertion == self.sets.len() {
                    out.push(self.sets.len() - 1);
                } else {
                    out.push(insertion - 1);
                    out.push(insertion);
                }
            }
        }
    }
}

/// The fire front and every grid derived from it.
#[derive(Debug)]
pub struct FireState {
    grid: Grid<bool>,
    initial: Grid<bool>,
    scratch: Grid<bool>,
    distance: Grid<f64>,
    risk: Grid<RiskKind>,
    field: Grid<f64>,
    present: bool,
    spread_interval: u32,
    line_sets: CoordinateSetCollection,
    column_sets: CoordinateSetCollection,
}

impl FireState {
    /// Builds the fire state from the initial fire snapshot.
    #[must_use]
    pub fn new(
        lines: usize,
        columns: usize,
        initial_fires: &[Coordinate],
        present: bool,
        spread_interval: u32,
    ) -> Self {
        let mut initial = Grid::new(lines, columns, false);
        for &cell in initial_fires {
            initial[cell] = true;
        }
        Self {
            grid: Grid::new(lines, columns, false),
            initial,
            scratch: Grid::new(lines, columns, false),
            distance: Grid::new(lines, columns, 0.0),
            risk: Grid::new(lines, columns, RiskKind::NonRisky),
            field: Grid::new(lines, columns, 0.0),
            present,
            spread_interval,
            line_sets: CoordinateSetCollection::default(),
            column_sets: CoordinateSetCollection::default(),
        }
    }

    /// Whether the environment carries fire at all.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.present
    }

    /// Whether `at` currently burns.
    #[must_use]
    pub fn is_on_fire(&self, at: Coordinate) -> bool {
        self.grid.get(at) == Some(true)
    }

    /// Whether the fire spreads at the end of timestep `timestep`.
    #[must_use]
    pub fn spreads_at(&self, timestep: u32) -> bool {
        self.present && timestep % self.spread_interval == 0
    }

    /// Euclidean distance from `at` to the nearest fire cell; 0 inside fire.
    #[must_use]
    pub fn distance(&self, at: Coordinate) -> f64 {
        self.distance[at]
    }

    /// Risk classification of `at`.
    #[must_use]
    pub fn risk(&self, at: Coordinate) -> RiskKind {
        self.risk[at]
    }

    /// The normalized fire floor field.
    #[must_use]
    pub fn field(&self) -> &Grid<f64> {
        &self.field
    }

    /// The active fire grid.
    #[must_use]
    pub fn grid(&self) -> &Grid<bool> {
        &self.grid
    }

    /// Restores the front to the initial snapshot for a fresh run.
    pub fn reset_run(&mut self) {
        self.grid.copy_from(&self.initial);
    }

    /// Advances the front one spread: every fire cell stays lit and ignites
    /// its non-obstacle Moore neighbors. Exit cells sit on obstacle cells and
    /// are therefore never consumed.
    pub fn propagate(&mut self, obstacles: &Grid<CellKind>) {
        self.scratch.fill(false);
        for at in self.grid.coordinates() {
            if !self.grid[at] {
                continue;
            }
            self.scratch[at] = true;
            for &modifier in &MOORE_MODIFIERS {
                let neighbor = at.offset(modifier);
                if !self.grid.in_bounds(neighbor) {
                    continue;
                }
                if obstacles[neighbor] != CellKind::Empty {
                    continue;
                }
                self.scratch[neighbor] = true;
            }
        }
        std::mem::swap(&mut self.grid, &mut self.scratch);
    }

    /// Recomputes distance-to-fire, the fire floor field, and the risk
    /// classification from the current front.
    pub fn recompute_fields(
        &mut self,
        obstacles: &Grid<CellKind>,
        exits_only: &Grid<ExitCellKind>,
        fire_gamma: f64,
    ) {
        self.recompute_distance();
        self.compute_field(obstacles, exits_only, fire_gamma);
        self.classify_risk(obstacles);
    }

    /// Distance from every cell to the fire border.
    ///
    /// The fire coordinates are partitioned into per-line and per-column
    /// sets; binary searches bound the candidate fire cells for any query to
    /// at most three adjacent sets of at most three secondaries each.
    fn recompute_distance(&mut self) {
        self.distance.fill(0.0);
        if !self.present {
            return;
        }

        self.line_sets.clear();
        self.column_sets.clear();
        for at in self.grid.coordinates() {
            if self.grid[at] {
                self.line_sets.push(at.lin, at.col);
            }
        }
        for col in 0..self.grid.columns() {
            for lin in 0..self.grid.lines() {
                let at = Coordinate::new(lin as i32, col as i32);
                if self.grid[at] {
                    self.column_sets.push(at.col, at.lin);
                }
            }
        }
        if self.line_sets.is_empty() {
            return;
        }

        let mut set_indices = Vec::with_capacity(3);
        let mut secondaries = Vec::with_capacity(3);
        for at in self.grid.coordinates() {
            if self.grid[at] {
                continue;
            }

            let mut nearest = f64::INFINITY;

            self.line_sets.adjacent_sets(at.lin, &mut set_indices);
            for &set_index in &set_indices {
                let set = &self.line_sets.sets[set_index];
                set.adjacent_secondaries(at.col, &mut secondaries);
                for &col in &secondaries {
                    let candidate =
                        euclidean_distance(at, Coordinate::new(set.main, col));
                    if candidate < nearest {
                        nearest = candidate;
                    }
                }
            }

            self.column_sets.adjacent_sets(at.col, &mut set_indices);
            for &set_index in &set_indices {
                let set = &self.column_sets.sets[set_index];
                set.adjacent_secondaries(at.lin, &mut secondaries);
                for &lin in &secondaries {
                    let candidate =
                        euclidean_distance(at, Coordinate::new(lin, set.main));
                    if candidate < nearest {
                        nearest = candidate;
                    }
                }
            }

            self.distance[at] = nearest;
        }
    }

    /// Fire floor field: `1 / distance` within `fire_gamma` of the front,
    /// normalized to unit mass. Walls carry zero unless they host an exit.
    fn compute_field(
        &mut self,
        obstacles: &Grid<CellKind>,
        exits_only: &Grid<ExitCellKind>,
        fire_gamma: f64,
    ) {
        self.field.fill(0.0);
        if !self.present {
            return;
        }

        let mut total = 0.0;
        for at in self.field.coordinates() {
            if self.distance[at] > fire_gamma
                || self.grid[at]
                || (obstacles[at] != CellKind::Empty && exits_only[at] == ExitCellKind::Empty)
            {
                continue;
            }
            let value = 1.0 / self.distance[at];
            self.field[at] = value;
            total += value;
        }
        if total != 0.0 {
            for at in self.field.coordinates() {
                if self.field[at] != 0.0 {
                    self.field[at] /= total;
                }
            }
        }
    }

    /// Risk classes: cells within 1.5 of fire are danger; cells hugging a
    /// wall inside that band downgrade to risky. The wall scan is limited to
    /// walls within distance 3 of the front.
    fn classify_risk(&mut self, obstacles: &Grid<CellKind>) {
        self.risk.fill(RiskKind::NonRisky);
        if !self.present {
            return;
        }

        for at in self.risk.coordinates() {
            if obstacles[at] == CellKind::Obstacle || self.grid[at] {
                continue;
            }
            if self.distance[at] < 1.5 {
                self.risk[at] = RiskKind::Danger;
            }
        }

        for at in self.risk.coordinates() {
            if obstacles[at] != CellKind::Obstacle || self.distance[at] > 3.0 {
                continue;
            }
            for &modifier in &AXIAL_MODIFIERS {
                let neighbor = at.offset(modifier);
                if !self.risk.in_bounds(neighbor) {
                    continue;
                }
                if obstacles[neighbor] == CellKind::Obstacle || self.grid[neighbor] {
                    continue;
                }
                if self.distance[neighbor] < 1.5 {
                    self.risk[neighbor] = RiskKind::Risky;
                }
            }
        }
    }
}
