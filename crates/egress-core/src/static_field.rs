//! Static floor fields: the global inverse-distance field and the per-exit
//! BFS-relaxation weights.

use crate::exits::{Exit, ExitSet, StructureCell};
use crate::fire::FireState;
use crate::geometry::euclidean_distance;
use crate::grid::{is_diagonal_valid, CellKind, Coordinate, ExitCellKind, Grid};
use crate::{EgressConfig, SimulationError};

/// Computes the distance-based static field over the given exit cells.
///
/// Every cell that is not a wall, fire, or blocked exit receives
/// `1 / (d + 1)` for `d` the Euclidean distance to the nearest exit cell
/// (the `+ 1` keeps exit cells finite); the live entries are then normalized
/// into a distribution. Excluded cells hold zero.
pub fn compute_zheng_field(
    destination: &mut Grid<f64>,
    exit_cells: &[Coordinate],
    obstacles: &Grid<CellKind>,
    exits_only: &Grid<ExitCellKind>,
    fire: &FireState,
) {
    destination.fill(0.0);
    if exit_cells.is_empty() {
        return;
    }

    let mut total = 0.0;
    for at in obstacles.coordinates() {
        if exits_only[at] != ExitCellKind::Exit {
            if exits_only[at] == ExitCellKind::BlockedExit
                || obstacles[at] == CellKind::Obstacle
                || fire.is_on_fire(at)
            {
                continue;
            }
        }

        let mut nearest = f64::INFINITY;
        for &exit_cell in exit_cells {
            let distance = euclidean_distance(exit_cell, at);
            if distance < nearest {
                nearest = distance;
            }
        }

        let value = 1.0 / (nearest + 1.0);
        destination[at] = value;
        total += value;
    }

    if total != 0.0 {
        for at in obstacles.coordinates() {
            if destination[at] != 0.0 {
                destination[at] /= total;
            }
        }
    }
}

/// Relaxes the exit's private static weights to fixpoint.
///
/// Exit cells seed the propagation at zero cost; every pass offers each
/// 8-neighbor `value + step` (axial `1.0`, diagonal `diagonal_cost`,
/// subject to diagonal validity) and keeps the minimum. Unreached cells
/// stay at zero.
pub fn compute_varas_weights(exit: &mut Exit, config: &EgressConfig) {
    let structure = exit.structure().clone();
    let weights = exit.static_weight_mut();
    weights.fill(0.0);

    let mut auxiliary = weights.clone();
    let blocked = |at: Coordinate| structure.get(at) == Some(StructureCell::Obstacle);

    loop {
        let mut has_changed = false;

        for at in structure.coordinates() {
            let source = match structure[at] {
                StructureCell::Exit => 0.0,
                StructureCell::Obstacle => continue,
                StructureCell::Free => {
                    let value = weights[at];
                    if value == 0.0 {
                        continue;
                    }
                    value
                }
            };

            for lin_step in -1..=1i32 {
                for col_step in -1..=1i32 {
                    if lin_step == 0 && col_step == 0 {
                        continue;
                    }
                    let modifier = Coordinate::new(lin_step, col_step);
                    let neighbor = at.offset(modifier);
                    if !structure.in_bounds(neighbor) {
                        continue;
                    }
                    if structure[neighbor] != StructureCell::Free {
                        continue;
                    }

                    let step = if lin_step != 0 && col_step != 0 {
                        if !is_diagonal_valid(
                            at,
                            modifier,
                            config.prevent_corner_crossing,
                            blocked,
                        ) {
                            continue;
                        }
                        config.diagonal_cost
                    } else {
                        1.0
                    };

                    let candidate = source + step;
                    if auxiliary[neighbor] == 0.0 || candidate < auxiliary[neighbor] {
                        auxiliary[neighbor] = candidate;
                        has_changed = true;
                    }
                }
            }
        }

        weights.copy_from(&auxiliary);
        if !has_changed {
            break;
        }
    }
}

/// Rebuilds each exit's private view, verifies accessibility, and relaxes
/// its static weights.
pub fn compute_all_static_weights(
    exits: &mut ExitSet,
    obstacles: &Grid<CellKind>,
    config: &EgressConfig,
) -> Result<(), SimulationError> {
    if exits.is_empty() {
        return Err(SimulationError::InvalidConfig(
            "a simulation set needs at least one exit",
        ));
    }
    for exit in exits.exits_mut() {
        exit.rebuild_structure(obstacles);
        if !exit.is_accessible() {
            return Err(SimulationError::InaccessibleExit);
        }
        compute_varas_weights(exit, config);
    }
    Ok(())
}

/// Merges the per-exit weights into one global field by per-cell minimum
/// over the exits not blocked by fire. Unreached cells and walls read as
/// infinitely unattractive.
pub fn merge_varas_global(destination: &mut Grid<f64>, exits: &ExitSet) {
    destination.fill(f64::INFINITY);
    for exit in exits.exits() {
        if exit.is_blocked_by_fire() {
            continue;
        }
        let weights = exit.static_weight();
        let structure = exit.structure();
        for at in weights.coordinates() {
            let value = match structure[at] {
                StructureCell::Exit => 0.0,
                StructureCell::Obstacle => continue,
                StructureCell::Free => {
                    if weights[at] == 0.0 {
                        continue; // never reached by the relaxation
                    }
                    weights[at]
                }
            };
            if value < destination[at] {
                destination[at] = value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walled_box(lines: usize, columns: usize) -> Grid<CellKind> {
        let mut obstacles = Grid::new(lines, columns, CellKind::Obstacle);
        for lin in 1..lines - 1 {
            for col in 1..columns - 1 {
                obstacles[Coordinate::new(lin as i32, col as i32)] = CellKind::Empty;
            }
        }
        obstacles
    }

    fn no_fire(lines: usize, columns: usize) -> FireState {
        let mut fire = FireState::new(lines, columns, &[], false, 1);
        fire.reset_run();
        fire
    }

    #[test]
    fn zheng_field_is_a_distance_monotone_distribution() {
        let obstacles = walled_box(5, 5);
        let mut exits_only = Grid::new(5, 5, ExitCellKind::Empty);
        let exit_cell = Coordinate::new(2, 4);
        exits_only[exit_cell] = ExitCellKind::Exit;
        let fire = no_fire(5, 5);

        let mut field = Grid::new(5, 5, 0.0f64);
        compute_zheng_field(&mut field, &[exit_cell], &obstacles, &exits_only, &fire);

        let total: f64 = field.cells().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);

        // The exit cell itself carries the largest value.
        let maximum = field
            .cells()
            .iter()
            .fold(f64::NEG_INFINITY, |acc, &value| acc.max(value));
        assert_eq!(field[exit_cell], maximum);

        // Closer to the exit means strictly larger.
        assert!(field[Coordinate::new(2, 3)] > field[Coordinate::new(2, 2)]);
        assert!(field[Coordinate::new(2, 2)] > field[Coordinate::new(2, 1)]);
        assert!(field[Coordinate::new(2, 3)] > field[Coordinate::new(1, 1)]);

        // Walls carry nothing.
        assert_eq!(field[Coordinate::new(0, 0)], 0.0);
        assert_eq!(field[Coordinate::new(4, 2)], 0.0);

        for at in field.coordinates() {
            if obstacles[at] == CellKind::Empty || at == exit_cell {
                assert!(field[at] > 0.0, "reachable cell {at:?}");
            }
        }
    }

    #[test]
    fn zheng_field_excludes_fire_and_blocked_exits() {
        let obstacles = walled_box(5, 5);
        let mut exits_only = Grid::new(5, 5, ExitCellKind::Empty);
        exits_only[Coordinate::new(2, 4)] = ExitCellKind::Exit;
        exits_only[Coordinate::new(2, 0)] = ExitCellKind::BlockedExit;
        let mut fire = FireState::new(5, 5, &[Coordinate::new(3, 1)], true, 1);
        fire.reset_run();

        let mut field = Grid::new(5, 5, 0.0f64);
        compute_zheng_field(
            &mut field,
            &[Coordinate::new(2, 4)],
            &obstacles,
            &exits_only,
            &fire,
        );

        assert_eq!(field[Coordinate::new(3, 1)], 0.0);
        assert_eq!(field[Coordinate::new(2, 0)], 0.0);
        assert!(field[Coordinate::new(2, 4)] > 0.0);
    }

    #[test]
    fn zheng_field_with_no_exit_cells_is_zero() {
        let obstacles = walled_box(4, 4);
        let exits_only = Grid::new(4, 4, ExitCellKind::Empty);
        let fire = no_fire(4, 4);
        let mut field = Grid::new(4, 4, 1.0f64);
        compute_zheng_field(&mut field, &[], &obstacles, &exits_only, &fire);
        assert!(field.cells().iter().all(|&value| value == 0.0));
    }

    #[test]
    fn varas_weights_relax_to_shortest_step_costs() {
        let obstacles = walled_box(5, 5);
        let mut exits = ExitSet::from_groups(&[vec![Coordinate::new(2, 4)]], 5, 5);
        let config = EgressConfig::default();
        compute_all_static_weights(&mut exits, &obstacles, &config).expect("weights");

        let weights = exits.exits()[0].static_weight();
        assert_eq!(weights[Coordinate::new(2, 3)], 1.0);
        assert_eq!(weights[Coordinate::new(2, 2)], 2.0);
        assert_eq!(weights[Coordinate::new(2, 1)], 3.0);
        assert_eq!(weights[Coordinate::new(1, 3)], 1.5);
        assert_eq!(weights[Coordinate::new(3, 3)], 1.5);
        // Either two axial steps or one diagonal plus one axial.
        assert_eq!(weights[Coordinate::new(1, 2)], 2.5);
        assert_eq!(weights[Coordinate::new(1, 1)], 3.5);
    }

    #[test]
    fn corner_crossing_flag_lengthens_paths_past_obstacles() {
        let mut obstacles = walled_box(5, 6);
        // A pillar beside the exit approach.
        obstacles[Coordinate::new(2, 3)] = CellKind::Obstacle;

        let relaxed = |prevent: bool| {
            let mut exits = ExitSet::from_groups(&[vec![Coordinate::new(2, 5)]], 5, 6);
            let config = EgressConfig {
                prevent_corner_crossing: prevent,
                ..EgressConfig::default()
            };
            compute_all_static_weights(&mut exits, &obstacles, &config).expect("weights");
            exits.exits()[0].static_weight().clone()
        };

        let loose = relaxed(false);
        let strict = relaxed(true);

        for at in loose.coordinates() {
            assert!(strict[at] >= loose[at], "{at:?}");
        }
        // The cell west of the pillar pays for the denied corner cuts.
        assert!(strict[Coordinate::new(2, 2)] > loose[Coordinate::new(2, 2)]);
    }

    #[test]
    fn sealed_exits_are_reported_inaccessible() {
        let mut obstacles = walled_box(5, 5);
        obstacles[Coordinate::new(2, 3)] = CellKind::Obstacle;
        let mut exits = ExitSet::from_groups(&[vec![Coordinate::new(2, 4)]], 5, 5);
        let config = EgressConfig::default();

        assert!(matches!(
            compute_all_static_weights(&mut exits, &obstacles, &config),
            Err(SimulationError::InaccessibleExit)
        ));
    }

    #[test]
    fn global_merge_takes_the_per_cell_minimum() {
        let obstacles = walled_box(5, 7);
        let mut exits = ExitSet::from_groups(
            &[vec![Coordinate::new(2, 0)], vec![Coordinate::new(2, 6)]],
            5,
            7,
        );
        let config = EgressConfig::default();
        compute_all_static_weights(&mut exits, &obstacles, &config).expect("weights");

        let mut global = Grid::new(5, 7, 0.0f64);
        merge_varas_global(&mut global, &exits);

        assert_eq!(global[Coordinate::new(2, 1)], 1.0);
        assert_eq!(global[Coordinate::new(2, 5)], 1.0);
        assert_eq!(global[Coordinate::new(2, 3)], 3.0);
        assert_eq!(global[Coordinate::new(2, 0)], 0.0);
        assert!(global[Coordinate::new(0, 0)].is_infinite());
    }
}
