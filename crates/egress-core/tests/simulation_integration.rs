use egress_core::{
    Coordinate, EgressConfig, EnvironmentLayout, EnvironmentOrigin, ExitCellKind, Simulation,
    SimulationError,
};

const CORRIDOR: &str = "\
5 5
#####
#...#
#p.._
#...#
#####
";

fn parse(text: &str, origin: EnvironmentOrigin) -> EnvironmentLayout {
    EnvironmentLayout::parse(text, origin).expect("layout")
}

fn build(config: EgressConfig, text: &str, origin: EnvironmentOrigin) -> Simulation {
    let layout = parse(text, origin);
    let groups = layout.exits().to_vec();
    Simulation::new(config, &layout, &groups).expect("simulation")
}

#[test]
fn seeded_runs_are_deterministic() {
    let config = EgressConfig {
        static_coupling: 1.5,
        dynamic_coupling: 0.5,
        ..EgressConfig::default()
    };

    let mut first = build(
        config.clone(),
        CORRIDOR,
        EnvironmentOrigin::StructureExitsAndPedestrians,
    );
    let mut second = build(
        config,
        CORRIDOR,
        EnvironmentOrigin::StructureExitsAndPedestrians,
    );

    let outcome_a = first.run(0xDEAD_BEEF, Some(5_000)).expect("first run");
    let outcome_b = second.run(0xDEAD_BEEF, Some(5_000)).expect("second run");

    assert_eq!(outcome_a, outcome_b);
    assert_eq!(first.heatmap(), second.heatmap());
    assert_eq!(outcome_a.evacuated, 1);
    assert_eq!(outcome_a.dead, 0);
}

#[test]
fn corridor_run_reaches_the_exit_within_the_ceiling() {
    let config = EgressConfig {
        static_coupling: 1.0,
        dynamic_coupling: 0.0,
        ..EgressConfig::default()
    };
    let mut simulation = build(
        config,
        CORRIDOR,
        EnvironmentOrigin::StructureExitsAndPedestrians,
    );

    let outcome = simulation.run(1, Some(2_000)).expect("run");
    assert!(!outcome.ceiling_hit);
    assert_eq!(outcome.evacuated, 1);
    // Three cells to the exit plus the one-timestep dwell.
    assert!(outcome.timesteps >= 4);
}

#[test]
fn contested_approach_produces_same_target_conflicts() {
    // Two pedestrians flank the single approach cell of the exit; with a
    // strong static coupling both keep claiming it.
    let text = "\
5 5
#####
#..p#
#..._
#..p#
#####
";
    let config = EgressConfig {
        static_coupling: 5.0,
        dynamic_coupling: 0.0,
        conflict_friction: 0.0,
        ..EgressConfig::default()
    };

    let mut total_conflicts = 0usize;
    for seed in 0..20u64 {
        let mut simulation = build(
            config.clone(),
            text,
            EnvironmentOrigin::StructureExitsAndPedestrians,
        );
        simulation.begin_run(seed).expect("run setup");
        while !simulation.is_environment_empty() && simulation.timestep() < 500 {
            let events = simulation.step();
            total_conflicts += events.conflicts;
        }
        assert!(
            simulation.is_environment_empty(),
            "seed {seed} should evacuate both pedestrians"
        );
    }

    assert!(
        total_conflicts > 0,
        "flanking pedestrians never contested the approach cell"
    );
}

#[test]
fn disallowing_x_movement_still_terminates() {
    let config = EgressConfig {
        allow_x_movement: false,
        ..EgressConfig::default()
    };
    let mut simulation = build(
        config,
        CORRIDOR,
        EnvironmentOrigin::StructureExitsAndPedestrians,
    );
    let outcome = simulation.run(13, Some(2_000)).expect("run");
    assert!(!outcome.ceiling_hit);
    assert_eq!(outcome.evacuated, 1);
}

#[test]
fn fire_spread_can_seal_an_exit() {
    // spread_rate 1.5 m/s gives a spread every timestep; the first spread
    // reaches the exit's only approach cell.
    let text = "\
7 7
#######
#p....#
#.....#
#...*._
#.....#
#.....#
#######
";
    let config = EgressConfig {
        spread_rate: 1.5,
        ..EgressConfig::default()
    };
    let layout = parse(text, EnvironmentOrigin::StructureExitsAndPedestrians);
    assert!(layout.fire_present());
    let groups = layout.exits().to_vec();
    let mut simulation = Simulation::new(config, &layout, &groups).expect("simulation");
    simulation.begin_run(2).expect("run setup");

    assert_eq!(
        simulation.exits_only()[Coordinate::new(3, 6)],
        ExitCellKind::Exit
    );

    let events = simulation.step();
    assert!(events.fire_spread);
    assert!(events.exits_newly_blocked);
    assert!(simulation.exits().exits()[0].is_blocked_by_fire());
    assert_eq!(
        simulation.exits_only()[Coordinate::new(3, 6)],
        ExitCellKind::BlockedExit
    );

    // The front is now the 3x3 block around the origin of the fire.
    for at in [
        Coordinate::new(2, 3),
        Coordinate::new(2, 4),
        Coordinate::new(2, 5),
        Coordinate::new(3, 3),
        Coordinate::new(3, 5),
        Coordinate::new(4, 4),
    ] {
        assert!(simulation.fire().is_on_fire(at), "{at:?}");
    }
    assert!(!simulation.fire().is_on_fire(Coordinate::new(1, 1)));
}

#[test]
fn sealed_exits_fail_setup_as_inaccessible() {
    let text = "\
5 5
#####
#p.##
#.#_#
#..##
#####
";
    let layout = parse(text, EnvironmentOrigin::StructureExitsAndPedestrians);
    let groups = layout.exits().to_vec();
    let result = Simulation::new(EgressConfig::default(), &layout, &groups);
    assert!(matches!(result, Err(SimulationError::InaccessibleExit)));
}

#[test]
fn density_controls_the_random_population() {
    let text = "\
6 6
######
#...._
#....#
#....#
#....#
######
";
    let config = EgressConfig {
        density: Some(0.5),
        ..EgressConfig::default()
    };
    let layout = parse(text, EnvironmentOrigin::StructureAndExits);
    let groups = layout.exits().to_vec();
    let mut simulation = Simulation::new(config, &layout, &groups).expect("simulation");
    simulation.begin_run(4).expect("run setup");

    // 16 empty interior cells at density 0.5.
    assert_eq!(simulation.pedestrians().len(), 8);

    let outcome = simulation.run(4, Some(5_000)).expect("run");
    assert_eq!(outcome.evacuated, 8);
}

#[test]
fn heatmap_accumulates_across_runs_until_cleared() {
    let mut simulation = build(
        EgressConfig::default(),
        CORRIDOR,
        EnvironmentOrigin::StructureExitsAndPedestrians,
    );

    simulation.run(5, Some(2_000)).expect("first run");
    let after_one: u32 = simulation.heatmap().cells().iter().sum();
    simulation.run(6, Some(2_000)).expect("second run");
    let after_two: u32 = simulation.heatmap().cells().iter().sum();
    assert!(after_two > after_one);

    simulation.clear_heatmap();
    assert!(simulation.heatmap().cells().iter().all(|&count| count == 0));
}

#[test]
fn auxiliary_sets_drive_alternative_exits() {
    let text = "\
5 5
#####
#...#
#.p.#
#...#
#####
";
    let layout = parse(text, EnvironmentOrigin::StructureAndPedestrians);
    let sets =
        egress_core::environment::parse_simulation_sets("2 4 .\n2 0 .\n", 5, 5).expect("sets");
    assert_eq!(sets.len(), 2);

    for set in &sets {
        let mut simulation =
            Simulation::new(EgressConfig::default(), &layout, set).expect("simulation");
        let outcome = simulation.run(9, Some(2_000)).expect("run");
        assert_eq!(outcome.evacuated, 1);
    }
}
