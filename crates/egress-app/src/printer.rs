//! Writers for the three output modes and the inaccessible-set placeholder.

use egress_core::{Grid, Simulation};
use std::io::{self, Write};

/// Echoes the invocation at the top of the output so result files stay
/// self-describing.
pub fn write_command_header(sink: &mut dyn Write, args: &[String]) -> io::Result<()> {
    writeln!(sink, "{}", args.join(" "))?;
    writeln!(
        sink,
        "--------------------------------------------------------------"
    )?;
    writeln!(sink)
}

/// One frame of the step-by-step visualization.
pub fn write_environment(
    sink: &mut dyn Write,
    simulation: &Simulation,
    simulation_index: u32,
    timestep: u32,
) -> io::Result<()> {
    writeln!(
        sink,
        "Simulation {simulation_index} - timestep {timestep}\n"
    )?;

    let positions = simulation.positions();
    let exits_only = simulation.exits_only();
    let obstacles = simulation.obstacles();

    for lin in 0..positions.lines() {
        for col in 0..positions.columns() {
            let at = egress_core::Coordinate::new(lin as i32, col as i32);
            let glyph = if positions[at] != 0 {
                if simulation.fire().is_on_fire(at) {
                    "🪦"
                } else {
                    "👤"
                }
            } else if simulation.fire().is_on_fire(at) {
                "🔥"
            } else if exits_only[at] == egress_core::ExitCellKind::Exit {
                "🚪"
            } else if obstacles[at] == egress_core::CellKind::Obstacle {
                "🧱"
            } else {
                "⬛"
            };
            sink.write_all(glyph.as_bytes())?;
        }
        writeln!(sink)?;
    }
    writeln!(sink)
}

/// One run's evacuation time in the timesteps-count format.
pub fn write_timesteps_entry(sink: &mut dyn Write, timesteps: u32) -> io::Result<()> {
    write!(sink, "{timesteps} ")
}

/// Mean visits per cell over the set's runs, two decimals.
pub fn write_heatmap(
    sink: &mut dyn Write,
    heatmap: &Grid<u32>,
    num_simulations: u32,
) -> io::Result<()> {
    for lin in 0..heatmap.lines() {
        for col in 0..heatmap.columns() {
            let at = egress_core::Coordinate::new(lin as i32, col as i32);
            let mean = f64::from(heatmap[at]) / f64::from(num_simulations);
            write!(sink, "{mean:.2} ")?;
        }
        writeln!(sink)?;
    }
    writeln!(sink)
}

/// Placeholder row for a simulation set with an inaccessible exit, matching
/// the width of a real timesteps row.
pub fn write_placeholder(sink: &mut dyn Write, num_simulations: u32) -> io::Result<()> {
    for _ in 0..num_simulations {
        write!(sink, "-1 ")?;
    }
    writeln!(sink)
}
