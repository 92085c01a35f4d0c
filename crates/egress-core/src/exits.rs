//! Exit descriptors and the operations that keep them consistent with the
//! structure, fire, and field grids.

use crate::fire::FireState;
use crate::geometry::euclidean_distance;
use crate::grid::{CellKind, Coordinate, ExitCellKind, Grid, AXIAL_MODIFIERS};

/// A cell as seen by one exit's private structure view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructureCell {
    #[default]
    Free,
    Obstacle,
    /// One of this exit's own cells.
    Exit,
}

/// A single exit: an ordered run of cells plus the private grids reused
/// across static-weight recalculations.
#[derive(Debug, Clone)]
pub struct Exit {
    coordinates: Vec<Coordinate>,
    blocked_by_fire: bool,
    structure: Grid<StructureCell>,
    static_weight: Grid<f64>,
}

impl Exit {
    fn new(coordinates: Vec<Coordinate>, lines: usize, columns: usize) -> Self {
        Self {
            coordinates,
            blocked_by_fire: false,
            structure: Grid::new(lines, columns, StructureCell::Free),
            static_weight: Grid::new(lines, columns, 0.0),
        }
    }

    /// The cells forming this exit, in insertion order.
    #[must_use]
    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    /// Number of cells forming the exit.
    #[must_use]
    pub fn width(&self) -> usize {
        self.coordinates.len()
    }

    /// Whether fire has sealed every approach to this exit.
    #[must_use]
    pub const fn is_blocked_by_fire(&self) -> bool {
        self.blocked_by_fire
    }

    /// The exit's private structure view.
    #[must_use]
    pub fn structure(&self) -> &Grid<StructureCell> {
        &self.structure
    }

    /// The exit's relaxed static weights.
    #[must_use]
    pub fn static_weight(&self) -> &Grid<f64> {
        &self.static_weight
    }

    pub(crate) fn static_weight_mut(&mut self) -> &mut Grid<f64> {
        &mut self.static_weight
    }

    /// Rebuilds the private structure view from the obstacle layout, placing
    /// this exit's own cells on top.
    pub fn rebuild_structure(&mut self, obstacles: &Grid<CellKind>) {
        for at in obstacles.coordinates() {
            self.structure[at] = match obstacles[at] {
                CellKind::Obstacle => StructureCell::Obstacle,
                CellKind::Empty => StructureCell::Free,
            };
        }
        for &cell in &self.coordinates {
            self.structure[cell] = StructureCell::Exit;
        }
    }

    /// Whether the exit can be reached at all: some cell must have an axial
    /// neighbor that is neither an obstacle nor another cell of the exit.
    #[must_use]
    pub fn is_accessible(&self) -> bool {
        self.coordinates.iter().any(|&cell| {
            AXIAL_MODIFIERS.iter().any(|&modifier| {
                matches!(
                    self.structure.get(cell.offset(modifier)),
                    Some(StructureCell::Free)
                )
            })
        })
    }

    /// Whether every passable axial approach of every exit cell is on fire.
    fn is_sealed_by_fire(&self, fire: &FireState) -> bool {
        for &cell in &self.coordinates {
            for &modifier in &AXIAL_MODIFIERS {
                let neighbor = cell.offset(modifier);
                match self.structure.get(neighbor) {
                    Some(StructureCell::Free) => {
                        if !fire.is_on_fire(neighbor) {
                            return false;
                        }
                    }
                    _ => continue,
                }
            }
        }
        true
    }
}

/// The ordered collection of exits for one simulation set.
#[derive(Debug, Clone, Default)]
pub struct ExitSet {
    exits: Vec<Exit>,
}

impl ExitSet {
    /// Builds the set from coordinate groups (one group per exit).
    #[must_use]
    pub fn from_groups(groups: &[Vec<Coordinate>], lines: usize, columns: usize) -> Self {
        let exits = groups
            .iter()
            .map(|cells| Exit::new(cells.clone(), lines, columns))
            .collect();
        Self { exits }
    }

    /// The exits, in configuration order.
    #[must_use]
    pub fn exits(&self) -> &[Exit] {
        &self.exits
    }

    pub(crate) fn exits_mut(&mut self) -> &mut [Exit] {
        &mut self.exits
    }

    /// Number of exits in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.exits.len()
    }

    /// Whether the set holds no exits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exits.is_empty()
    }

    /// Rebuilds every exit's private structure view.
    pub fn rebuild_structures(&mut self, obstacles: &Grid<CellKind>) {
        for exit in &mut self.exits {
            exit.rebuild_structure(obstacles);
        }
    }

    /// Rewrites the exits-only grid from the current blocked flags.
    pub fn mark_exit_cells(&self, exits_only: &mut Grid<ExitCellKind>) {
        exits_only.fill(ExitCellKind::Empty);
        for exit in &self.exits {
            let kind = if exit.blocked_by_fire {
                ExitCellKind::BlockedExit
            } else {
                ExitCellKind::Exit
            };
            for &cell in &exit.coordinates {
                exits_only[cell] = kind;
            }
        }
    }

    /// Checks each open exit against the fire front, sealing those whose
    /// every approach burns. Returns whether any exit was newly blocked.
    pub fn check_blocked_by_fire(
        &mut self,
        fire: &FireState,
        exits_only: &mut Grid<ExitCellKind>,
    ) -> bool {
        let mut newly_blocked = false;
        for exit in &mut self.exits {
            if exit.blocked_by_fire {
                continue;
            }
            if exit.is_sealed_by_fire(fire) {
                exit.blocked_by_fire = true;
                newly_blocked = true;
                for &cell in &exit.coordinates {
                    exits_only[cell] = ExitCellKind::BlockedExit;
                }
            }
        }
        newly_blocked
    }

    /// Collects the cells of every exit not blocked by fire.
    #[must_use]
    pub fn non_blocked_cells(&self) -> Vec<Coordinate> {
        let capacity: usize = self.exits.iter().map(Exit::width).sum();
        let mut cells = Vec::with_capacity(capacity);
        for exit in &self.exits {
            if exit.blocked_by_fire {
                continue;
            }
            cells.extend_from_slice(&exit.coordinates);
        }
        cells
    }

    /// Clears every blocked flag for the next run.
    pub fn reset_blocked(&mut self) {
        for exit in &mut self.exits {
            exit.blocked_by_fire = false;
        }
    }
}

/// Computes the distance from every passable cell to the nearest of the
/// given exit cells. Walls hold `f64::INFINITY`.
pub fn compute_distance_to_exits(
    destination: &mut Grid<f64>,
    exit_cells: &[Coordinate],
    obstacles: &Grid<CellKind>,
) {
    destination.fill(f64::INFINITY);
    for at in destination.coordinates() {
        if obstacles[at] == CellKind::Obstacle && !exit_cells.contains(&at) {
            continue;
        }
        let mut nearest = f64::INFINITY;
        for &exit_cell in exit_cells {
            let distance = euclidean_distance(exit_cell, at);
            if distance < nearest {
                nearest = distance;
            }
        }
        destination[at] = nearest;
    }
}
