//! Nodal - network solver demo
//!
//! Builds one or more conductor ladders driven by a potential source and
//! steps them, printing the node potentials and solver counters.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=nodal_core=debug nodal --rungs 8 --ladders 2 --island-mode solve --check-valve
//! ```

use clap::{Parser, ValueEnum};
use nodal_core::links::{Capacitor, CheckValve, Conductor, PotentialSource};
use nodal_core::{error::Result, GpuMode, IslandMode, Link, NetworkSolver, NodeId, NodeList, SolverConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IslandArg {
    Off,
    Find,
    Solve,
}

impl From<IslandArg> for IslandMode {
    fn from(arg: IslandArg) -> Self {
        match arg {
            IslandArg::Off => IslandMode::Off,
            IslandArg::Find => IslandMode::Find,
            IslandArg::Solve => IslandMode::Solve,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GpuArg {
    Off,
    Dense,
    Sparse,
}

impl From<GpuArg> for GpuMode {
    fn from(arg: GpuArg) -> Self {
        match arg {
            GpuArg::Off => GpuMode::Off,
            GpuArg::Dense => GpuMode::Dense,
            GpuArg::Sparse => GpuMode::Sparse,
        }
    }
}

/// Nodal network solver demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Nodes per ladder
    #[arg(short, long, default_value_t = 5)]
    rungs: usize,

    /// Number of independent ladders
    #[arg(short, long, default_value_t = 1)]
    ladders: usize,

    /// Major steps to run
    #[arg(short, long, default_value_t = 10)]
    steps: usize,

    /// Major step length
    #[arg(long, default_value_t = 0.1)]
    dt: f64,

    /// Source potential at the top of each ladder
    #[arg(short, long, default_value_t = 10.0)]
    potential: f64,

    /// Rung conductance
    #[arg(short, long, default_value_t = 1.0)]
    conductance: f64,

    /// Node capacitance to ground
    #[arg(long, default_value_t = 0.0)]
    capacitance: f64,

    /// Replace the middle rung of each ladder with a check valve
    #[arg(long)]
    check_valve: bool,

    #[arg(long, value_enum, default_value_t = IslandArg::Off)]
    island_mode: IslandArg,

    #[arg(long, value_enum, default_value_t = GpuArg::Off)]
    gpu_mode: GpuArg,

    /// Smallest island decomposed with the offload strategy
    #[arg(long, default_value_t = 100)]
    gpu_threshold: usize,

    #[arg(long, default_value_t = 10)]
    minor_step_limit: u32,

    #[arg(long, default_value_t = 1e-6)]
    tolerance: f64,
}

/// Links for ladder `k`, whose nodes start at `base`.
fn ladder(args: &Args, k: usize, base: usize) -> Vec<Box<dyn Link>> {
    let mut links: Vec<Box<dyn Link>> = Vec::new();
    links.push(Box::new(PotentialSource::new(
        format!("V{k}"),
        [NodeId::GROUND, NodeId(base)],
        args.potential,
    )));

    let valve_rung = args.rungs / 2;
    for i in 0..args.rungs {
        let from = NodeId(base + i);
        let to = if i + 1 < args.rungs {
            NodeId(base + i + 1)
        } else {
            NodeId::GROUND
        };
        let name = format!("G{k}.{i}");
        if args.check_valve && i == valve_rung {
            links.push(Box::new(CheckValve::new(name, [from, to], args.conductance)));
        } else {
            links.push(Box::new(Conductor::new(name, [from, to], args.conductance)));
        }
        if args.capacitance > 0.0 {
            links.push(Box::new(Capacitor::to_ground(format!("C{k}.{i}"), from, args.capacitance)));
        }
    }
    links
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let rungs = args.rungs.max(1);
    let args = Args { rungs, ..args };
    let size = rungs * args.ladders.max(1);

    let links: Vec<Box<dyn Link>> = (0..args.ladders.max(1))
        .flat_map(|k| ladder(&args, k, k * rungs))
        .collect();

    let config = SolverConfig::new("ladder")
        .with_convergence_tolerance(args.tolerance)
        .with_minor_step_limit(args.minor_step_limit)
        .with_decomposition_limit(args.minor_step_limit);

    let mut solver = NetworkSolver::new();
    solver.set_island_mode(args.island_mode.into());
    solver.set_gpu_options(args.gpu_mode.into(), args.gpu_threshold);
    solver.initialize_nodes(NodeList::with_count(size));
    solver.initialize(config, links)?;

    for step in 1..=args.steps {
        let report = solver.step(args.dt)?;
        println!(
            "step {step}: {:?} after {} minor steps, {} decompositions",
            report.outcome, report.minor_steps, report.decompositions
        );
    }

    println!();
    if let Some(nodes) = solver.nodes() {
        for node in nodes.iter() {
            println!("{:>8}  {:>14.6}  island {}", node.name, node.potential, node.island);
        }
    }

    let c = solver.since_init();
    println!();
    println!("islands:                  {}", solver.island_count());
    println!("major steps:              {}", c.major_step_count);
    println!("minor steps:              {}", c.minor_step_count);
    println!("avg / max minor steps:    {:.2} / {}", c.avg_minor_steps(), c.max_minor_steps);
    println!("decompositions:           {}", c.decomposition_count);
    println!("decomposition failures:   {}", c.decomposition_fail_count);
    println!("convergence failures:     {}", c.convergence_fail_count);
    println!("rejected minor steps:     {}", c.rejected_step_count);
    println!("max step time:            {:?}", solver.timing().max_step_time);

    Ok(())
}
