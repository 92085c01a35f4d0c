//! Movement conflicts: several pedestrians claiming one cell, and adjacent
//! pairs whose paths would cross.

use crate::geometry::{probability_test, rand_within, roulette_wheel_selection};
use crate::grid::{Coordinate, Grid};
use crate::pedestrian::{PedestrianSet, PedestrianState};
use crate::TOLERANCE;
use rand::rngs::SmallRng;

/// Several pedestrians targeting the same cell on the same timestep.
#[derive(Debug, Clone)]
pub struct CellConflict {
    /// Participants, in id scan order. Von Neumann movement bounds this at
    /// four; diagonal variants at eight.
    pub pedestrian_ids: Vec<u32>,
    /// The winner, or `None` when friction denied everyone.
    pub allowed: Option<u32>,
}

/// Finds every same-target conflict among the moving pedestrians.
///
/// Targets are claimed in a scratch grid: a positive entry is a lone
/// claimant's id, a negative entry is the (negated, 1-based) index of the
/// conflict record that cell escalated into.
#[must_use]
pub fn identify_conflicts(
    pedestrians: &PedestrianSet,
    lines: usize,
    columns: usize,
) -> Vec<CellConflict> {
    let mut claim_grid: Grid<i64> = Grid::new(lines, columns, 0);
    let mut conflicts: Vec<CellConflict> = Vec::with_capacity(pedestrians.len());

    for pedestrian in pedestrians.iter() {
        if pedestrian.state != PedestrianState::Moving {
            continue;
        }

        let claim = &mut claim_grid[pedestrian.target];
        if *claim == 0 {
            *claim = i64::from(pedestrian.id);
            continue;
        }

        if *claim > 0 {
            // Second claimant: escalate the cell into a conflict record.
            let mut ids = Vec::with_capacity(8);
            ids.push(*claim as u32);
            ids.push(pedestrian.id);
            conflicts.push(CellConflict {
                pedestrian_ids: ids,
                allowed: None,
            });
            *claim = -(conflicts.len() as i64);
            continue;
        }

        let conflict_index = (-*claim - 1) as usize;
        conflicts[conflict_index].pedestrian_ids.push(pedestrian.id);
    }

    conflicts
}

/// Decides every conflict: with probability `friction` nobody moves,
/// otherwise one uniformly drawn participant keeps its movement. Losers are
/// stopped for this timestep.
pub fn solve_conflicts(
    conflicts: &mut [CellConflict],
    pedestrians: &mut PedestrianSet,
    friction: f64,
    rng: &mut SmallRng,
) {
    const UNIFORM: [f64; 8] = [1.0; 8];

    for conflict in conflicts {
        let participant_count = conflict.pedestrian_ids.len();

        let winner = if probability_test(rng, friction) {
            None
        } else {
            roulette_wheel_selection(
                rng,
                &UNIFORM[..participant_count],
                participant_count as f64,
            )
        };

        conflict.allowed = winner.map(|index| conflict.pedestrian_ids[index]);
        for (index, &id) in conflict.pedestrian_ids.iter().enumerate() {
            if winner != Some(index) {
                if let Some(pedestrian) = pedestrians.get_mut(id) {
                    pedestrian.state = PedestrianState::Stopped;
                }
            }
        }
    }
}

/// Outcome of testing two movement segments against each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentCrossing {
    /// No crossing: a vertical or horizontal segment, or parallel slopes.
    None,
    /// The segments meet at one pedestrian's target cell; the same-target
    /// machinery owns that case.
    SharedTarget,
    /// The segments intersect strictly inside both movements.
    Crossing,
}

/// Classifies the `current -> target` segments of two pedestrians.
#[must_use]
pub fn classify_crossing(
    first_current: Coordinate,
    first_target: Coordinate,
    second_current: Coordinate,
    second_target: Coordinate,
) -> SegmentCrossing {
    if first_current.col == first_target.col || second_current.col == second_target.col {
        return SegmentCrossing::None;
    }

    let first_slope = f64::from(first_target.lin - first_current.lin)
        / f64::from(first_target.col - first_current.col);
    let second_slope = f64::from(second_target.lin - second_current.lin)
        / f64::from(second_target.col - second_current.col);

    if first_slope == 0.0 || second_slope == 0.0 {
        return SegmentCrossing::None;
    }
    if (first_slope - second_slope).abs() <= TOLERANCE {
        // Parallel lines never intersect; identical segments fall through to
        // the same-target path.
        return SegmentCrossing::None;
    }

    let first_intercept = f64::from(first_current.lin) - first_slope * f64::from(first_current.col);
    let second_intercept =
        f64::from(second_current.lin) - second_slope * f64::from(second_current.col);

    let crossing_col = (second_intercept - first_intercept) / (first_slope - second_slope);
    let crossing_lin = first_slope * crossing_col + first_intercept;

    let lands_on = |target: Coordinate| {
        (crossing_col - f64::from(target.col)).abs() <= TOLERANCE
            && (crossing_lin - f64::from(target.lin)).abs() <= TOLERANCE
    };
    if lands_on(first_target) || lands_on(second_target) {
        return SegmentCrossing::SharedTarget;
    }

    let strictly_inside = |from: Coordinate, to: Coordinate| {
        let low = f64::from(from.col.min(to.col));
        let high = f64::from(from.col.max(to.col));
        crossing_col - low > TOLERANCE && high - crossing_col > TOLERANCE
    };
    if strictly_inside(first_current, first_target)
        && strictly_inside(second_current, second_target)
    {
        return SegmentCrossing::Crossing;
    }

    SegmentCrossing::None
}

/// Detects and resolves X-crossings among axially adjacent moving pairs.
///
/// The scan walks the position grid top-left to bottom-right and examines
/// each cell's right and below neighbor, so every pair is considered exactly
/// once. Each crossing stops one participant, chosen by a fair coin that
/// ties toward the first.
pub fn resolve_x_crossings(
    pedestrians: &mut PedestrianSet,
    positions: &Grid<u32>,
    rng: &mut SmallRng,
) {
    const PAIR_MODIFIERS: [Coordinate; 2] = [Coordinate::new(0, 1), Coordinate::new(1, 0)];

    for at in positions.coordinates() {
        let first_id = positions[at];
        if first_id == 0 {
            continue;
        }

        for modifier in PAIR_MODIFIERS {
            let Some(second_id) = positions.get(at.offset(modifier)) else {
                continue;
            };
            if second_id == 0 {
                continue;
            }

            let first = pedestrians.get(first_id).expect("id on the position grid");
            let second = pedestrians.get(second_id).expect("id on the position grid");
            if first.state != PedestrianState::Moving || second.state != PedestrianState::Moving {
                continue;
            }

            let crossing = classify_crossing(
                first.current,
                first.target,
                second.current,
                second.target,
            );
            if crossing != SegmentCrossing::Crossing {
                continue;
            }

            let first_wins = rand_within(rng, 0.0, 1.0) <= 0.5 + TOLERANCE;
            let loser_id = if first_wins { second_id } else { first_id };
            pedestrians
                .get_mut(loser_id)
                .expect("id on the position grid")
                .state = PedestrianState::Stopped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn set_with_targets(entries: &[(Coordinate, Coordinate)]) -> PedestrianSet {
        let mut set = PedestrianSet::new();
        for &(current, target) in entries {
            let id = set.add(current);
            let pedestrian = set.get_mut(id).expect("pedestrian");
            pedestrian.target = target;
        }
        set
    }

    #[test]
    fn lone_claims_raise_no_conflict() {
        let set = set_with_targets(&[
            (Coordinate::new(1, 1), Coordinate::new(1, 2)),
            (Coordinate::new(3, 3), Coordinate::new(3, 2)),
        ]);
        assert!(identify_conflicts(&set, 5, 5).is_empty());
    }

    #[test]
    fn colliders_extend_one_record() {
        let shared = Coordinate::new(2, 4);
        let mut set = set_with_targets(&[
            (Coordinate::new(1, 3), shared),
            (Coordinate::new(3, 3), shared),
            (Coordinate::new(2, 3), shared),
            (Coordinate::new(1, 1), Coordinate::new(1, 2)),
        ]);
        // Stopped pedestrians take no part.
        set.get_mut(4).expect("pedestrian").target = shared;
        set.get_mut(4).expect("pedestrian").state = PedestrianState::Stopped;

        let conflicts = identify_conflicts(&set, 5, 5);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].pedestrian_ids, vec![1, 2, 3]);
    }

    #[test]
    fn friction_one_denies_everyone() {
        let shared = Coordinate::new(2, 4);
        let mut set = set_with_targets(&[
            (Coordinate::new(1, 3), shared),
            (Coordinate::new(3, 3), shared),
        ]);
        let mut conflicts = identify_conflicts(&set, 5, 5);
        let mut rng = SmallRng::seed_from_u64(1);

        solve_conflicts(&mut conflicts, &mut set, 1.0, &mut rng);

        assert_eq!(conflicts[0].allowed, None);
        assert!(set
            .iter()
            .all(|pedestrian| pedestrian.state == PedestrianState::Stopped));
    }

    #[test]
    fn zero_friction_leaves_exactly_one_mover() {
        let shared = Coordinate::new(2, 4);
        for seed in 0..16u64 {
            let mut set = set_with_targets(&[
                (Coordinate::new(1, 3), shared),
                (Coordinate::new(3, 3), shared),
                (Coordinate::new(2, 3), shared),
            ]);
            let mut conflicts = identify_conflicts(&set, 5, 5);
            let mut rng = SmallRng::seed_from_u64(seed);

            solve_conflicts(&mut conflicts, &mut set, 0.0, &mut rng);

            let movers: Vec<u32> = set
                .iter()
                .filter(|pedestrian| pedestrian.state == PedestrianState::Moving)
                .map(|pedestrian| pedestrian.id)
                .collect();
            assert_eq!(movers.len(), 1, "seed {seed}");
            assert_eq!(conflicts[0].allowed, Some(movers[0]), "seed {seed}");
        }
    }

    #[test]
    fn crossing_diagonals_are_detected() {
        assert_eq!(
            classify_crossing(
                Coordinate::new(2, 1),
                Coordinate::new(1, 2),
                Coordinate::new(1, 1),
                Coordinate::new(2, 2),
            ),
            SegmentCrossing::Crossing
        );
    }

    #[test]
    fn axis_aligned_segments_never_cross() {
        // Vertical first segment.
        assert_eq!(
            classify_crossing(
                Coordinate::new(1, 1),
                Coordinate::new(2, 1),
                Coordinate::new(1, 2),
                Coordinate::new(2, 1),
            ),
            SegmentCrossing::None
        );
        // Horizontal second segment.
        assert_eq!(
            classify_crossing(
                Coordinate::new(2, 1),
                Coordinate::new(1, 2),
                Coordinate::new(1, 1),
                Coordinate::new(1, 2),
            ),
            SegmentCrossing::None
        );
    }

    #[test]
    fn parallel_diagonals_fall_through() {
        // Equal slopes, offset by one cell; these segments cannot meet.
        assert_eq!(
            classify_crossing(
                Coordinate::new(2, 1),
                Coordinate::new(1, 2),
                Coordinate::new(2, 2),
                Coordinate::new(3, 1),
            ),
            SegmentCrossing::None
        );
        // Identical segments look parallel too.
        assert_eq!(
            classify_crossing(
                Coordinate::new(2, 1),
                Coordinate::new(1, 2),
                Coordinate::new(2, 1),
                Coordinate::new(1, 2),
            ),
            SegmentCrossing::None
        );
    }

    #[test]
    fn intersection_on_a_target_defers_to_same_target_handling() {
        assert_eq!(
            classify_crossing(
                Coordinate::new(2, 1),
                Coordinate::new(1, 2),
                Coordinate::new(0, 1),
                Coordinate::new(1, 2),
            ),
            SegmentCrossing::SharedTarget
        );
    }

    #[test]
    fn x_crossing_stops_exactly_one_of_the_pair() {
        for seed in 0..16u64 {
            let mut set = set_with_targets(&[
                (Coordinate::new(2, 1), Coordinate::new(1, 2)),
                (Coordinate::new(2, 2), Coordinate::new(1, 1)),
            ]);
            let mut positions = Grid::new(4, 4, 0u32);
            positions[Coordinate::new(2, 1)] = 1;
            positions[Coordinate::new(2, 2)] = 2;

            let mut rng = SmallRng::seed_from_u64(seed);
            resolve_x_crossings(&mut set, &positions, &mut rng);

            let stopped = set
                .iter()
                .filter(|pedestrian| pedestrian.state == PedestrianState::Stopped)
                .count();
            assert_eq!(stopped, 1, "seed {seed}");
        }
    }

    #[test]
    fn non_crossing_neighbors_keep_moving() {
        let mut set = set_with_targets(&[
            (Coordinate::new(2, 1), Coordinate::new(1, 1)),
            (Coordinate::new(2, 2), Coordinate::new(1, 2)),
        ]);
        let mut positions = Grid::new(4, 4, 0u32);
        positions[Coordinate::new(2, 1)] = 1;
        positions[Coordinate::new(2, 2)] = 2;

        let mut rng = SmallRng::seed_from_u64(9);
        resolve_x_crossings(&mut set, &positions, &mut rng);

        assert!(set
            .iter()
            .all(|pedestrian| pedestrian.state == PedestrianState::Moving));
    }
}
