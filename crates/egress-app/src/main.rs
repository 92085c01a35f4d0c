//! Command-line shell around the egress simulation kernel: file loading,
//! configuration layering, run batching, and output printing.

mod printer;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use egress_core::environment::parse_simulation_sets;
use egress_core::{
    Coordinate, EgressConfig, EnvironmentLayout, EnvironmentOrigin, Simulation, SimulationError,
    StaticFieldVariant, TOLERANCE,
};
use owo_colors::OwoColorize;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

fn main() -> Result<()> {
    let cli = AppCli::parse();
    init_tracing();
    let raw_args: Vec<String> = std::env::args().collect();
    run(&cli, &raw_args)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Output modes, mirroring the kernel's emitted data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormatArg {
    /// Step-by-step glyph rendering of the whole environment.
    Visualization,
    /// One evacuation-time integer per run.
    Timesteps,
    /// Mean visits per cell over the set's runs.
    Heatmap,
}

/// Where exits and pedestrians come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OriginArg {
    /// Structure from the environment file, exits from the auxiliary file.
    StructureOnly,
    /// Structure and exits from the environment file.
    StructureAndExits,
    /// Structure and pedestrians from the file, exits from the auxiliary file.
    StructureAndPedestrians,
    /// Structure, exits, and pedestrians from the environment file.
    Complete,
    /// Generated walled rectangle, exits from the auxiliary file.
    Generated,
}

impl OriginArg {
    fn to_origin(self) -> EnvironmentOrigin {
        match self {
            Self::StructureOnly => EnvironmentOrigin::StructureOnly,
            Self::StructureAndExits => EnvironmentOrigin::StructureAndExits,
            Self::StructureAndPedestrians => EnvironmentOrigin::StructureAndPedestrians,
            Self::Complete => EnvironmentOrigin::StructureExitsAndPedestrians,
            Self::Generated => EnvironmentOrigin::Generated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VariantArg {
    Zheng,
    Varas,
}

/// Model constant swept by `--vary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VaryArg {
    Alpha,
    Delta,
    Ks,
    Kd,
    Density,
}

#[derive(Parser, Debug)]
#[command(name = "egress", version, about = "Floor-field evacuation simulator")]
struct AppCli {
    /// Environment file holding the structure to simulate.
    #[arg(long = "env-file", value_name = "FILE")]
    env_file: Option<PathBuf>,

    /// Auxiliary file with one simulation set (exit configuration) per line.
    #[arg(long = "aux-file", value_name = "FILE")]
    aux_file: Option<PathBuf>,

    /// Write results here instead of stdout.
    #[arg(short = 'o', long = "output-file", value_name = "FILE")]
    output_file: Option<PathBuf>,

    /// What the run emits.
    #[arg(long = "output-format", value_enum, default_value = "timesteps")]
    output_format: OutputFormatArg,

    /// Where exits and pedestrians come from.
    #[arg(long = "origin", value_enum, default_value = "complete")]
    origin: OriginArg,

    /// JSON configuration layers applied over the defaults, in order.
    #[arg(long = "config", value_name = "FILE")]
    config_layers: Vec<PathBuf>,

    /// Grid lines for the generated environment.
    #[arg(short = 'l', long)]
    lines: Option<usize>,

    /// Grid columns for the generated environment.
    #[arg(short = 'c', long)]
    columns: Option<usize>,

    /// Pedestrians to place at random each run.
    #[arg(long)]
    pedestrians: Option<usize>,

    /// Pedestrian density over the empty cells (overrides --pedestrians).
    #[arg(long)]
    density: Option<f64>,

    /// Stochastic runs per simulation set.
    #[arg(long)]
    simulations: Option<u32>,

    /// Base RNG seed; each run increments it.
    #[arg(long)]
    seed: Option<u64>,

    /// Static-field coupling k_s.
    #[arg(long)]
    ks: Option<f64>,

    /// Dynamic-field coupling k_d.
    #[arg(long)]
    kd: Option<f64>,

    /// Fire-field coupling k_f.
    #[arg(long)]
    kf: Option<f64>,

    /// Dynamic-field diffusion coefficient.
    #[arg(long)]
    alpha: Option<f64>,

    /// Dynamic-field decay coefficient.
    #[arg(long)]
    delta: Option<f64>,

    /// Inertia factor applied along the previous direction.
    #[arg(long)]
    omega: Option<f64>,

    /// Probability that a same-target conflict denies everyone.
    #[arg(long)]
    mu: Option<f64>,

    /// Diagonal step cost in the static-weight relaxation.
    #[arg(long)]
    diagonal: Option<f64>,

    /// Static-field algorithm.
    #[arg(long = "static-field", value_enum)]
    static_field: Option<VariantArg>,

    /// Fire-avoidance amplification near exits.
    #[arg(long = "fire-alpha")]
    fire_alpha: Option<f64>,

    /// Fire influence radius.
    #[arg(long = "fire-gamma")]
    fire_gamma: Option<f64>,

    /// Exit distance below which fire avoidance is amplified.
    #[arg(long = "risk-distance")]
    risk_distance: Option<f64>,

    /// Fire front speed in meters per second.
    #[arg(long = "spread-rate")]
    spread_rate: Option<f64>,

    /// Skip the one-timestep dwell on exit cells.
    #[arg(long = "immediate-exit")]
    immediate_exit: bool,

    /// Forbid diagonals that graze an obstacle corner.
    #[arg(long = "prevent-corner-crossing")]
    prevent_corner_crossing: bool,

    /// Detect and resolve crossing movements between adjacent pedestrians.
    #[arg(long = "forbid-x-movement")]
    forbid_x_movement: bool,

    /// Deposit trail density at the vacated cell on commit.
    #[arg(long = "velocity-density")]
    velocity_density: bool,

    /// Exclude a pedestrian's own fresh deposit from its field reads.
    #[arg(long = "ignore-self-trace")]
    ignore_self_trace: bool,

    /// Sweep one model constant over [min, max] in steps.
    #[arg(long = "vary", value_enum)]
    vary: Option<VaryArg>,

    /// Sweep lower bound.
    #[arg(long, requires = "vary")]
    min: Option<f64>,

    /// Sweep upper bound.
    #[arg(long, requires = "vary")]
    max: Option<f64>,

    /// Sweep increment.
    #[arg(long, requires = "vary")]
    step: Option<f64>,

    /// Abort a run after this many timesteps (the model can livelock).
    #[arg(long = "max-timesteps", value_name = "TIMESTEPS")]
    max_timesteps: Option<u32>,
}

fn run(cli: &AppCli, raw_args: &[String]) -> Result<()> {
    let config = compose_config(cli)?;
    let origin = cli.origin.to_origin();
    let layout = load_layout(cli, &config, origin)?;
    let exit_sets = collect_exit_sets(cli, &layout, origin)?;

    info!(
        lines = layout.lines(),
        columns = layout.columns(),
        sets = exit_sets.len(),
        simulations = config.num_simulations,
        fire = layout.fire_present(),
        "Starting egress batch"
    );

    let mut sink = open_output(cli)?;
    printer::write_command_header(sink.as_mut(), raw_args)?;

    let mut next_seed = config.seed;
    let set_count = exit_sets.len();
    for (set_index, exit_groups) in exit_sets.iter().enumerate() {
        process_set(cli, &config, &layout, exit_groups, &mut next_seed, sink.as_mut())?;
        eprintln!(
            "{} simulation set {}/{}",
            "finished".green().bold(),
            set_index + 1,
            set_count
        );
    }

    Ok(())
}

fn process_set(
    cli: &AppCli,
    config: &EgressConfig,
    layout: &EnvironmentLayout,
    exit_groups: &[Vec<Coordinate>],
    next_seed: &mut u64,
    sink: &mut dyn Write,
) -> Result<()> {
    let mut simulation = match Simulation::new(config.clone(), layout, exit_groups) {
        Ok(simulation) => simulation,
        Err(SimulationError::InaccessibleExit) => {
            warn!("simulation set skipped: at least one exit is inaccessible");
            if cli.output_format == OutputFormatArg::Timesteps {
                printer::write_placeholder(sink, config.num_simulations)?;
            } else {
                writeln!(sink, "At least one exit of the simulation set is inaccessible.")?;
            }
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    match cli.vary {
        None => {
            run_batch(cli, &mut simulation, next_seed, sink)?;
            finish_batch_output(cli, config, &mut simulation, sink)?;
        }
        Some(target) => {
            let (Some(min), Some(max), Some(step)) = (cli.min, cli.max, cli.step) else {
                bail!("--vary requires --min, --max, and --step");
            };
            if step <= 0.0 {
                bail!("--step must be positive");
            }

            let mut value = min;
            while value <= max + TOLERANCE {
                apply_sweep_value(simulation.config_mut(), target, value);
                write!(sink, "*{value:.3} ")?;
                if cli.output_format == OutputFormatArg::Heatmap {
                    // The value label gets its own line above the grid.
                    writeln!(sink)?;
                }
                run_batch(cli, &mut simulation, next_seed, sink)?;
                finish_batch_output(cli, config, &mut simulation, sink)?;
                value += step;
            }
        }
    }

    Ok(())
}

/// Closes one batch's output: the timesteps row terminator, or the batch's
/// heatmap (cleared afterwards so every batch reports only its own runs).
fn finish_batch_output(
    cli: &AppCli,
    config: &EgressConfig,
    simulation: &mut Simulation,
    sink: &mut dyn Write,
) -> Result<()> {
    match cli.output_format {
        OutputFormatArg::Timesteps => writeln!(sink)?,
        OutputFormatArg::Heatmap => {
            printer::write_heatmap(sink, simulation.heatmap(), config.num_simulations)?;
            simulation.clear_heatmap();
        }
        OutputFormatArg::Visualization => {}
    }
    Ok(())
}

fn apply_sweep_value(config: &mut EgressConfig, target: VaryArg, value: f64) {
    match target {
        VaryArg::Alpha => config.diffusion = value,
        VaryArg::Delta => config.decay = value,
        VaryArg::Ks => config.static_coupling = value,
        VaryArg::Kd => config.dynamic_coupling = value,
        VaryArg::Density => config.density = Some(value),
    }
}

fn run_batch(
    cli: &AppCli,
    simulation: &mut Simulation,
    next_seed: &mut u64,
    sink: &mut dyn Write,
) -> Result<()> {
    let num_simulations = simulation.config().num_simulations;

    for run_index in 0..num_simulations {
        let seed = *next_seed;
        *next_seed += 1;

        if cli.output_format == OutputFormatArg::Visualization {
            simulation.begin_run(seed)?;
            printer::write_environment(sink, simulation, run_index, 0)?;
            let ceiling = cli.max_timesteps.unwrap_or(u32::MAX);
            while !simulation.is_environment_empty() && simulation.timestep() < ceiling {
                simulation.step();
                printer::write_environment(sink, simulation, run_index, simulation.timestep())?;
            }
            debug!(seed, timesteps = simulation.timestep(), "visualized run complete");
        } else {
            let outcome = simulation.run(seed, cli.max_timesteps)?;
            if outcome.ceiling_hit {
                warn!(
                    seed,
                    ceiling = ?cli.max_timesteps,
                    "run aborted at the timestep ceiling"
                );
            }
            if cli.output_format == OutputFormatArg::Timesteps {
                printer::write_timesteps_entry(sink, outcome.timesteps)?;
            }
            debug!(
                seed,
                timesteps = outcome.timesteps,
                evacuated = outcome.evacuated,
                dead = outcome.dead,
                "run complete"
            );
        }
    }

    sink.flush()?;
    Ok(())
}

fn compose_config(cli: &AppCli) -> Result<EgressConfig> {
    let mut config = EgressConfig::default();
    config = apply_config_layers(config, &cli.config_layers)?;
    apply_cli_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

/// Merges JSON layers over the serialized default configuration, so layers
/// may be partial.
fn apply_config_layers(config: EgressConfig, layers: &[PathBuf]) -> Result<EgressConfig> {
    if layers.is_empty() {
        return Ok(config);
    }

    let mut value = serde_json::to_value(&config).context("serializing default config")?;
    for path in layers {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config layer {}", path.display()))?;
        let layer: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("parsing config layer {}", path.display()))?;
        merge_json(&mut value, layer);
    }
    serde_json::from_value(value).context("composing layered config")
}

fn merge_json(base: &mut serde_json::Value, layer: serde_json::Value) {
    match (base, layer) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(layer_map)) => {
            for (key, layer_value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => merge_json(base_value, layer_value),
                    None => {
                        base_map.insert(key, layer_value);
                    }
                }
            }
        }
        (base_slot, layer_value) => *base_slot = layer_value,
    }
}

fn apply_cli_overrides(config: &mut EgressConfig, cli: &AppCli) {
    if let Some(lines) = cli.lines {
        config.lines = lines;
    }
    if let Some(columns) = cli.columns {
        config.columns = columns;
    }
    if let Some(pedestrians) = cli.pedestrians {
        config.pedestrian_count = pedestrians;
    }
    if let Some(density) = cli.density {
        config.density = Some(density);
    }
    if let Some(simulations) = cli.simulations {
        config.num_simulations = simulations;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(ks) = cli.ks {
        config.static_coupling = ks;
    }
    if let Some(kd) = cli.kd {
        config.dynamic_coupling = kd;
    }
    if let Some(kf) = cli.kf {
        config.fire_coupling = kf;
    }
    if let Some(alpha) = cli.alpha {
        config.diffusion = alpha;
    }
    if let Some(delta) = cli.delta {
        config.decay = delta;
    }
    if let Some(omega) = cli.omega {
        config.inertia = omega;
    }
    if let Some(mu) = cli.mu {
        config.conflict_friction = mu;
    }
    if let Some(diagonal) = cli.diagonal {
        config.diagonal_cost = diagonal;
    }
    if let Some(variant) = cli.static_field {
        config.static_field_variant = match variant {
            VariantArg::Zheng => StaticFieldVariant::Zheng,
            VariantArg::Varas => StaticFieldVariant::Varas,
        };
    }
    if let Some(fire_alpha) = cli.fire_alpha {
        config.fire_alpha = fire_alpha;
    }
    if let Some(fire_gamma) = cli.fire_gamma {
        config.fire_gamma = fire_gamma;
    }
    if let Some(risk_distance) = cli.risk_distance {
        config.risk_distance = risk_distance;
    }
    if let Some(spread_rate) = cli.spread_rate {
        config.spread_rate = spread_rate;
    }
    if cli.immediate_exit {
        config.immediate_exit = true;
    }
    if cli.prevent_corner_crossing {
        config.prevent_corner_crossing = true;
    }
    if cli.forbid_x_movement {
        config.allow_x_movement = false;
    }
    if cli.velocity_density {
        config.velocity_density_field = true;
    }
    if cli.ignore_self_trace {
        config.ignore_latest_self_trace = true;
    }
}

fn load_layout(
    cli: &AppCli,
    config: &EgressConfig,
    origin: EnvironmentOrigin,
) -> Result<EnvironmentLayout> {
    if origin == EnvironmentOrigin::Generated {
        return Ok(EnvironmentLayout::generate(config.lines, config.columns));
    }
    let path = cli
        .env_file
        .as_ref()
        .context("--env-file is required unless the origin is `generated`")?;
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading environment file {}", path.display()))?;
    Ok(EnvironmentLayout::parse(&text, origin)?)
}

fn collect_exit_sets(
    cli: &AppCli,
    layout: &EnvironmentLayout,
    origin: EnvironmentOrigin,
) -> Result<Vec<Vec<Vec<Coordinate>>>> {
    if origin.uses_auxiliary_exits() {
        let path = cli
            .aux_file
            .as_ref()
            .context("--aux-file is required when exits come from a simulation-set file")?;
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading auxiliary file {}", path.display()))?;
        let sets = parse_simulation_sets(&text, layout.lines(), layout.columns())?;
        if sets.is_empty() {
            bail!("the auxiliary file holds no simulation sets");
        }
        return Ok(sets);
    }

    if layout.exits().is_empty() {
        bail!("the environment file carries no exits");
    }
    Ok(vec![layout.exits().to_vec()])
}

fn open_output(cli: &AppCli) -> Result<Box<dyn Write>> {
    match &cli.output_file {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("creating output file {}", path.display()))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(std::io::stdout())),
    }
}
