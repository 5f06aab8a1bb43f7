// Closed-loop MPC path tracking simulation.
//
// Drives the kinematic bicycle around a sine track with the MPC control loop
// in the loop and plots the driven path with gnuplot.

use clap::{Parser, ValueEnum};
use log::{error, info, LevelFilter};

use mpc_tracking::simulation::{Simulator, Track};
use mpc_tracking::utils::params::{self, Params};
use mpc_tracking::utils::visualization::{colors, TrackingPlot};
use mpc_tracking::{ControlLoop, Pose2D, TrackingError, TrackingResult};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TrackShape {
    Straight,
    Sine,
}

#[derive(Parser, Debug)]
#[command(name = "mpc_simulation", about = "Closed-loop MPC path tracking simulation.")]
struct Args {
    /// TOML parameter file; built-in defaults are used when omitted
    #[arg(short, long)]
    params: Option<String>,

    /// Number of control periods to simulate
    #[arg(short, long, default_value_t = 300)]
    steps: usize,

    #[arg(long, value_enum, default_value_t = TrackShape::Sine)]
    track: TrackShape,

    /// Lateral offset of the vehicle from the start of the track [m]
    #[arg(long, default_value_t = 1.0)]
    offset: f64,

    /// Initial speed
    #[arg(long, default_value_t = 5.0)]
    speed: f64,

    /// SVG file to write the plot to
    #[arg(short, long, default_value = "mpc_simulation.svg")]
    output: String,

    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
}

fn logger_init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{} {}] {}", record.level(), record.target(), message))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()
}

fn run(args: &Args) -> TrackingResult<()> {
    let params: Params = match &args.params {
        Some(path) => params::load(path)?,
        None => Params::default(),
    };

    let track = match args.track {
        TrackShape::Straight => Track::straight(0.0, -10.0, 1000.0, 5.0)?,
        TrackShape::Sine => Track::sine(10.0, 120.0, 1000.0, 5.0)?,
    };
    let start = track.points()[1];
    let mut sim = Simulator::new(
        track,
        Pose2D::new(start.x, start.y - args.offset, 0.0),
        args.speed,
        params.simulation,
    )?;
    let mut control = ControlLoop::new(params.mpc, params.control_loop)?;

    let history = sim.run(&mut control, args.steps)?;

    let max_cte = history.iter().map(|r| r.cross_track_error).fold(0.0, f64::max);
    let mean_cte = history.iter().map(|r| r.cross_track_error).sum::<f64>() / history.len().max(1) as f64;
    let stats = control.stats();
    info!(
        "Done: {} ticks, {} solved, {} fallbacks, mean cte {:.3} m, max cte {:.3} m",
        stats.ticks, stats.solved, stats.fallbacks, mean_cte, max_cte
    );

    let driven: Vec<_> = history.iter().map(|r| r.pose.position()).collect();
    let end_x = driven.last().map(|p| p.x).unwrap_or(0.0);
    let reference: Vec<_> = sim.track().points().iter().copied().filter(|p| p.x <= end_x + 10.0).collect();

    // Last plan, drawn from the pose it was computed at
    let prediction: Vec<_> = match (control.last_plan(), history.last()) {
        (Some(plan), Some(tick)) => plan.trajectory.iter().map(|p| tick.pose.to_world(p)).collect(),
        _ => Vec::new(),
    };

    let mut plot = TrackingPlot::new("MPC path tracking");
    plot.set_aspect_ratio(None)
        .add_points(&reference, "Waypoints", colors::WAYPOINT)
        .add_path(&driven, "Driven", colors::DRIVEN)
        .add_path(&prediction, "Prediction", colors::PREDICTION)
        .add_pose(&sim.pose(), 3.0);
    plot.save_svg(&args.output, 1000, 600)?;
    info!("Plot written to {}", args.output);

    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(e) = logger_init(args.log_level) {
        eprintln!("Cannot initialise the logger: {}", e);
    }

    if let Err(e) = run(&args) {
        error!("Simulation failed: {}", e);
        if let TrackingError::Plot(_) = e {
            error!("Is gnuplot installed?");
        }
        std::process::exit(1);
    }
}
