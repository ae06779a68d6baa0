mod config;
mod gcode;
mod tracker;

use clap::{Parser, ValueEnum};
use config::{ConfigError, ExtrusionMode, TrackerConfig};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info};
use tracker::{EventSink, NullSink, SkipReason, Tracker, TrackerEvent};

/// Inject a color-change command into G-code based on filament weight usage.
#[derive(Parser, Debug)]
#[command(name = "respool")]
#[command(about = "Injects a color change command (default: M600) at spool-weight thresholds")]
struct Args {
    /// Input G-code file path
    #[arg(long)]
    input: PathBuf,

    /// Output G-code file path
    #[arg(long)]
    output: PathBuf,

    /// Filament spool weight in grams (e.g. 1000). Read from the G-code
    /// header when omitted.
    #[arg(long)]
    spool_weight: Option<f64>,

    /// Filament diameter in mm
    #[arg(long, default_value_t = 1.75)]
    filament_diameter: f64,

    /// Filament density in g/cm³
    #[arg(long, default_value_t = 1.25)]
    filament_density: f64,

    /// How E values on move lines are interpreted
    #[arg(long, value_enum, default_value = "relative")]
    extrusion_mode: ExtrusionModeArg,

    /// G-code command injected at each color change
    #[arg(long, default_value = "M600")]
    color_change_command: String,

    /// Fraction of spool weight to leave unused (0.03 triggers at 97% usage)
    #[arg(long, default_value_t = 0.03)]
    safety_margin: f64,

    /// Only insert the color change command at layer change markers
    #[arg(long)]
    layer_based: bool,

    /// Feedrate (mm/min) above which extrusion moves are not counted
    #[arg(long, default_value_t = 3000.0)]
    feedrate_threshold: f64,

    /// Scaling factor to adjust computed filament weight
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// Enable debug logging output
    #[arg(long)]
    debug: bool,

    /// Qualifying lines between debug trace samples
    #[arg(long, default_value_t = 100)]
    debug_interval: usize,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ExtrusionModeArg {
    Relative,
    Absolute,
}

impl From<ExtrusionModeArg> for ExtrusionMode {
    fn from(mode: ExtrusionModeArg) -> Self {
        match mode {
            ExtrusionModeArg::Relative => ExtrusionMode::Relative,
            ExtrusionModeArg::Absolute => ExtrusionMode::Absolute,
        }
    }
}

impl Args {
    fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            filament_diameter: self.filament_diameter,
            filament_density: self.filament_density,
            extrusion_mode: self.extrusion_mode.into(),
            color_change_command: self.color_change_command.clone(),
            safety_margin: self.safety_margin,
            feedrate_cutoff: Some(self.feedrate_threshold),
            scale: self.scale,
            layer_gated: self.layer_based,
            debug_interval: self.debug_interval,
        }
    }
}

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read {}: {source}", path.display())]
    ReadInput {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    WriteOutput {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Routes tracker observations to the log.
struct TraceSink;

impl EventSink for TraceSink {
    fn record(&mut self, event: TrackerEvent) {
        match event {
            TrackerEvent::DirectiveInjected {
                line,
                cumulative_weight,
                trigger_weight,
            } => debug!(line, cumulative_weight, trigger_weight, "color change injected"),
            TrackerEvent::CounterReset { line, position } => {
                debug!(line, position, "extrusion counter reset")
            }
            TrackerEvent::MoveSkipped { line, reason } => match reason {
                SkipReason::NoPositionalAxis => debug!(line, "skipped move without X/Y/Z"),
                SkipReason::FeedrateAboveCutoff(feedrate) => {
                    debug!(line, feedrate, "skipped move above feedrate cutoff")
                }
            },
            TrackerEvent::Sample {
                line,
                extrusion_delta,
                weight_delta,
                cumulative_weight,
            } => debug!(
                line,
                extrusion_delta, weight_delta, cumulative_weight, "accounting sample"
            ),
        }
    }
}

fn init_tracing(debug: bool) {
    let level = if debug { "respool=debug" } else { "respool=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(level.parse().expect("level directive is valid")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<(), AppError> {
    let source = fs::read_to_string(&args.input).map_err(|source| AppError::ReadInput {
        path: args.input.clone(),
        source,
    })?;
    let lines: Vec<&str> = source.lines().collect();

    let spool_weight = config::resolve_spool_weight(args.spool_weight, lines.iter().copied())?;

    let config = args.tracker_config();
    config.validate()?;
    debug!(
        spool_weight,
        conversion_factor = config.conversion_factor(),
        trigger_weight = config.trigger_weight(spool_weight),
        "configuration resolved"
    );

    let tracker = Tracker::new(&config, spool_weight);
    // Event routing only matters when debug output is on; otherwise the
    // scan runs against the no-op sink.
    let mut trace_sink = TraceSink;
    let mut null_sink = NullSink;
    let sink: &mut dyn EventSink = if args.debug {
        &mut trace_sink
    } else {
        &mut null_sink
    };
    let output = tracker.process(&lines, sink);

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| AppError::WriteOutput {
                path: args.output.clone(),
                source,
            })?;
        }
    }

    let mut rendered = String::with_capacity(source.len());
    for line in &output.lines {
        rendered.push_str(line);
        rendered.push('\n');
    }
    fs::write(&args.output, rendered).map_err(|source| AppError::WriteOutput {
        path: args.output.clone(),
        source,
    })?;

    info!(
        output = %args.output.display(),
        total_weight = format!("{:.2}g", output.total_weight).as_str(),
        "processed G-code saved"
    );
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_tracing(args.debug);

    if let Err(e) = run(&args) {
        error!("{e}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_args_map_onto_tracker_config() {
        let args = Args::parse_from([
            "respool",
            "--input",
            "in.gcode",
            "--output",
            "out.gcode",
            "--extrusion-mode",
            "absolute",
            "--safety-margin",
            "0.05",
            "--feedrate-threshold",
            "2400",
            "--layer-based",
        ]);

        let config = args.tracker_config();
        assert_eq!(config.extrusion_mode, ExtrusionMode::Absolute);
        assert_eq!(config.safety_margin, 0.05);
        assert_eq!(config.feedrate_cutoff, Some(2400.0));
        assert!(config.layer_gated);
        assert_eq!(config.color_change_command, "M600");
    }
}
