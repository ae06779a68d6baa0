//! Extrusion tracker / injector
//!
//! A single forward scan over the program lines. Each qualifying move
//! adds weight to the running counters; whenever the cumulative weight
//! crosses the trigger threshold, a color-change directive is injected
//! ahead of the line that crossed it. In layer-gated mode injection
//! waits for the next layer marker instead.
//!
//! The scan performs no I/O and never logs. Diagnostic moments are
//! reported through the [`EventSink`] seam so the shell can route them
//! to whatever sink it likes.

use crate::config::{ExtrusionMode, TrackerConfig};
use crate::gcode;

/// Why a candidate extrusion move was excluded from accounting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkipReason {
    /// No X, Y, or Z word: a pure retraction or prime.
    NoPositionalAxis,
    /// Feedrate above the configured cutoff (travel-speed move).
    FeedrateAboveCutoff(f64),
}

/// Structured observations emitted during the scan.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A color-change directive was injected before the current line.
    DirectiveInjected {
        line: usize,
        cumulative_weight: f64,
        trigger_weight: f64,
    },
    /// A G92 reset the extrusion counter.
    CounterReset { line: usize, position: f64 },
    /// A G1 E move was excluded from accounting.
    MoveSkipped { line: usize, reason: SkipReason },
    /// Periodic accounting sample, one per `debug_interval` lines.
    Sample {
        line: usize,
        extrusion_delta: f64,
        weight_delta: f64,
        cumulative_weight: f64,
    },
}

/// Receiver for scan observations.
pub trait EventSink {
    fn record(&mut self, event: TrackerEvent);
}

/// Sink that discards every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&mut self, _event: TrackerEvent) {}
}

/// Result of one tracking run.
#[derive(Debug, Clone)]
pub struct TrackedOutput {
    /// Original lines interleaved with injected directives, terminated
    /// by the total-weight summary comment.
    pub lines: Vec<String>,
    /// Grams of filament consumed across the whole program.
    pub total_weight: f64,
}

/// The tracker itself. Configuration and derived quantities are fixed
/// at construction; all scan state lives inside [`Tracker::process`].
pub struct Tracker<'a> {
    config: &'a TrackerConfig,
    conversion_factor: f64,
    trigger_weight: f64,
}

impl<'a> Tracker<'a> {
    /// Build a tracker for a validated configuration and resolved spool
    /// weight. The caller must have run [`TrackerConfig::validate`] and
    /// [`crate::config::resolve_spool_weight`] first, which together
    /// guarantee a positive trigger weight (the crossing loop below is
    /// only bounded when it is).
    pub fn new(config: &'a TrackerConfig, spool_weight: f64) -> Self {
        Self {
            config,
            conversion_factor: config.conversion_factor(),
            trigger_weight: config.trigger_weight(spool_weight),
        }
    }

    /// Scan the program once and build the augmented output.
    pub fn process(&self, lines: &[&str], sink: &mut dyn EventSink) -> TrackedOutput {
        let mut out: Vec<String> = Vec::with_capacity(lines.len() + 1);
        let mut cumulative_weight = 0.0_f64;
        let mut total_weight = 0.0_f64;
        let mut last_extrusion = 0.0_f64;

        for (idx, &line) in lines.iter().enumerate() {
            let trimmed = line.trim();

            // Layer marker: the only injection point in layer-gated mode.
            if self.config.layer_gated && gcode::is_layer_marker(trimmed) {
                if cumulative_weight >= self.trigger_weight {
                    out.push(self.directive_line(true));
                    sink.record(TrackerEvent::DirectiveInjected {
                        line: idx,
                        cumulative_weight,
                        trigger_weight: self.trigger_weight,
                    });
                    // Single subtraction: layer boundaries are naturally
                    // spaced, so at most one change fires per marker.
                    cumulative_weight -= self.trigger_weight;
                }
                out.push(line.to_string());
                continue;
            }

            // G92 resets the extrusion counter; no weight accounting.
            if gcode::is_counter_reset(trimmed) {
                last_extrusion = gcode::extrusion_value(trimmed);
                sink.record(TrackerEvent::CounterReset {
                    line: idx,
                    position: last_extrusion,
                });
                out.push(line.to_string());
                continue;
            }

            if gcode::is_extrusion_move(trimmed) {
                // No positional axis word: retraction/prime, not counted.
                if !gcode::has_positional_axis(trimmed) {
                    sink.record(TrackerEvent::MoveSkipped {
                        line: idx,
                        reason: SkipReason::NoPositionalAxis,
                    });
                    out.push(line.to_string());
                    continue;
                }

                // Travel-speed moves above the cutoff are not counted.
                if let (Some(cutoff), Some(feed)) =
                    (self.config.feedrate_cutoff, gcode::feedrate(trimmed))
                {
                    if feed > cutoff {
                        sink.record(TrackerEvent::MoveSkipped {
                            line: idx,
                            reason: SkipReason::FeedrateAboveCutoff(feed),
                        });
                        out.push(line.to_string());
                        continue;
                    }
                }

                let e_value = gcode::extrusion_value(trimmed);
                let extrusion_delta = match self.config.extrusion_mode {
                    ExtrusionMode::Relative => e_value,
                    ExtrusionMode::Absolute => {
                        let delta = e_value - last_extrusion;
                        last_extrusion = e_value;
                        delta
                    }
                };

                // Negative or zero delta is a retraction or no movement.
                if extrusion_delta > 0.0 {
                    let weight_delta = extrusion_delta * self.conversion_factor;
                    cumulative_weight += weight_delta;
                    total_weight += weight_delta;

                    if idx % self.config.debug_interval == 0 {
                        sink.record(TrackerEvent::Sample {
                            line: idx,
                            extrusion_delta,
                            weight_delta,
                            cumulative_weight,
                        });
                    }

                    if !self.config.layer_gated {
                        // One large move can cross several thresholds.
                        while cumulative_weight >= self.trigger_weight {
                            out.push(self.directive_line(false));
                            sink.record(TrackerEvent::DirectiveInjected {
                                line: idx,
                                cumulative_weight,
                                trigger_weight: self.trigger_weight,
                            });
                            cumulative_weight -= self.trigger_weight;
                        }
                    }
                }

                out.push(line.to_string());
                continue;
            }

            out.push(line.to_string());
        }

        out.push(format!("; TOTAL FILAMENT WEIGHT USED: {total_weight:.2}g"));

        TrackedOutput {
            lines: out,
            total_weight,
        }
    }

    fn directive_line(&self, at_layer_change: bool) -> String {
        let suffix = if at_layer_change { " at layer change" } else { "" };
        format!(
            "{} ; Color change triggered after ~{:.2}g used{}",
            self.config.color_change_command, self.trigger_weight, suffix
        )
    }
}
