//! Operator workflows.
//!
//! A [`Session`] owns the printer client, the image source and the
//! pacer, and remembers the last commanded tool position so each move
//! can be given a duration estimate. The two long workflows are:
//!
//! - [`Session::trace`]: home, park, capture, plan the traversal of the
//!   workpiece outline, approach, confirm, trace, park.
//! - [`Session::sweep`]: home, then run the eight extrusion runs, each
//!   after an operator confirmation.
//!
//! Every stage finishes before the next one starts, and a failure stops
//! the workflow without issuing any compensating motion.

use std::path::Path;

use plotbed_export::{
    GcodeMetadata, GcodeOptions, SvgMetadata, format_move, pattern_to_gcode, plan_to_gcode,
    plan_to_svg, setup_commands, to_program,
};
use plotbed_io::artifacts::{self, ArtifactError};
use plotbed_io::printer::list_gcode_files;
use plotbed_io::{
    CaptureError, Clock, ImageSource, PacedCommand, Pacer, PrinterClient, PrinterError,
    PrinterState, SendOutcome, SendSummary, Transport,
};
use plotbed_pipeline::pattern::plan_pattern;
use plotbed_pipeline::{Move, Pipeline, PipelineError, ToolPosition, TraceResult};

use crate::config::{AppConfig, ConfigError};

/// Where the tool is assumed to be after homing.
const HOME: ToolPosition = ToolPosition {
    x: 0.0,
    y: 0.0,
    z: 0.0,
    feed_rate: 0.0,
};

/// Errors from a console operation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The vision pipeline or the sweep planner failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The printer controller failed.
    #[error(transparent)]
    Printer(#[from] PrinterError),

    /// No image could be captured.
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// An artifact could not be written.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// Reading from or writing to the operator failed.
    #[error("console I/O failed: {0}")]
    Console(#[from] std::io::Error),

    /// An export file could not be written.
    #[error("failed to write {path}: {source}")]
    Output {
        /// Target file.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Embedding the configuration in an export failed.
    #[error("failed to serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The person at the printer.
pub trait Operator {
    /// Ask before a step. `true` means go ahead.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the answer cannot be read.
    fn confirm(&mut self, prompt: &str) -> std::io::Result<bool>;

    /// Show progress or results.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the message cannot be written.
    fn show(&mut self, message: &str) -> std::io::Result<()>;
}

/// Answers yes to everything and logs messages. Used for unattended
/// one-shot runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl Operator for AutoConfirm {
    fn confirm(&mut self, prompt: &str) -> std::io::Result<bool> {
        tracing::info!(prompt, "confirmed automatically");
        Ok(true)
    }

    fn show(&mut self, message: &str) -> std::io::Result<()> {
        tracing::info!("{message}");
        Ok(())
    }
}

/// How a trace run ended.
#[derive(Debug)]
pub enum TraceOutcome {
    /// The operator did not confirm the capture.
    NotPlaced,
    /// A plan was computed but the operator declined to run it; the
    /// tool was parked again.
    Declined(Box<TraceResult>),
    /// A motion command was skipped because the printer was not ready.
    /// Nothing was sent after it, so the outline is incomplete or
    /// untouched.
    Halted {
        /// Pipeline output.
        result: Box<TraceResult>,
        /// Command counts of the interrupted batch.
        summary: SendSummary,
    },
    /// The outline was traced.
    Traced {
        /// Pipeline output.
        result: Box<TraceResult>,
        /// Command counts of the traversal.
        summary: SendSummary,
    },
}

/// How a sweep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Runs started.
    pub runs_done: usize,
    /// Runs planned.
    pub runs_planned: usize,
    /// Command counts over all runs.
    pub summary: SendSummary,
}

/// Turn moves into paced commands. Each estimate is measured from the
/// previous target, starting at `from`. Returns the commands and the
/// last target.
pub fn paced_moves<'m>(
    moves: impl IntoIterator<Item = &'m Move>,
    from: Option<ToolPosition>,
    options: &GcodeOptions,
) -> (Vec<PacedCommand>, Option<ToolPosition>) {
    let mut position = from;
    let commands = moves
        .into_iter()
        .map(|mv| {
            let estimate = mv.estimated_duration(position.as_ref());
            position = Some(mv.target);
            PacedCommand {
                line: format_move(mv, options),
                estimate,
            }
        })
        .collect();
    (commands, position)
}

/// Capture one image, run the vision pipeline and write the snapshot
/// and both overlays. The overlays are written as soon as their stage
/// completes, so they are available even when a later stage fails.
///
/// # Errors
///
/// Returns the first capture, artifact or pipeline error.
pub fn capture_and_plan(
    camera: &impl ImageSource,
    config: &AppConfig,
) -> Result<TraceResult, SessionError> {
    let paths = &config.artifacts;
    let bytes = camera.capture()?;
    artifacts::save_bytes(&paths.snapshot, &bytes)?;

    let markers = Pipeline::new(bytes, config.trace.clone())
        .decode()?
        .detect_markers();
    artifacts::save_image(&paths.markers, &markers.annotated())?;
    tracing::info!(found = markers.circles().len(), "markers detected");

    let outline = markers.calibrate()?.detect_outline()?;
    artifacts::save_image(&paths.corners, &outline.annotated())?;

    let result = outline.map_corners()?.plan()?.into_result();
    tracing::info!(
        corners = ?result.adjusted_corners.points(),
        segments = result.plan.segments.len(),
        "traversal planned"
    );
    Ok(result)
}

/// Write the traversal as a G-code program and/or an SVG preview.
///
/// # Errors
///
/// Returns [`SessionError::Output`] if a file cannot be written.
pub fn export_trace(
    result: &TraceResult,
    config: &AppConfig,
    source: &str,
    gcode: Option<&Path>,
    svg: Option<&Path>,
) -> Result<(), SessionError> {
    let config_json = serde_json::to_string(&config.trace)?;
    if let Some(path) = gcode {
        let mut commands = setup_commands();
        commands.extend(plan_to_gcode(&result.plan, &GcodeOptions::default()));
        let program = to_program(
            &commands,
            &GcodeMetadata {
                title: Some(source),
                description: Some("workpiece outline traversal"),
                config_json: Some(&config_json),
            },
        );
        write_output(path, &program)?;
    }
    if let Some(path) = svg {
        let document = plan_to_svg(
            result,
            &SvgMetadata {
                title: Some(source),
                description: Some("workpiece outline traversal"),
                config_json: Some(&config_json),
            },
        );
        write_output(path, &document)?;
    }
    Ok(())
}

/// The sweep as a complete program, setup included, without sending
/// anything.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if a run leaves the work
/// area.
pub fn sweep_program(config: &AppConfig) -> Result<String, SessionError> {
    let plan = plan_pattern(&config.pattern)?;
    let config_json = serde_json::to_string(&config.pattern)?;
    let mut commands = setup_commands();
    commands.extend(pattern_to_gcode(&plan, &GcodeOptions::default()));
    Ok(to_program(
        &commands,
        &GcodeMetadata {
            title: Some("extrusion sweep"),
            description: None,
            config_json: Some(&config_json),
        },
    ))
}

fn write_output(path: &Path, contents: &str) -> Result<(), SessionError> {
    std::fs::write(path, contents).map_err(|source| SessionError::Output {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "written");
    Ok(())
}

/// A connected console session.
pub struct Session<'a, T, S, C> {
    config: &'a AppConfig,
    printer: PrinterClient<T>,
    camera: S,
    pacer: Pacer<C>,
    options: GcodeOptions,
    position: Option<ToolPosition>,
}

impl<'a, T: Transport, S: ImageSource, C: Clock> Session<'a, T, S, C> {
    /// Create a session. The tool position is unknown until the first
    /// homing or move.
    pub fn new(config: &'a AppConfig, transport: T, camera: S, clock: C) -> Self {
        Self {
            config,
            printer: PrinterClient::new(transport),
            camera,
            pacer: Pacer::new(config.pacing.clone(), clock),
            options: GcodeOptions::default(),
            position: None,
        }
    }

    /// Current printer state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Printer`] if the state query fails.
    pub fn status(&self) -> Result<PrinterState, SessionError> {
        Ok(self.printer.state()?)
    }

    /// Connect the controller to the printer unless it already is, then
    /// wait for it to become ready.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Printer`] if connecting fails or the
    /// printer does not become ready in time.
    pub fn ensure_connected(&self) -> Result<PrinterState, SessionError> {
        let state = self.printer.state()?;
        if state.is_operational() {
            return Ok(state);
        }
        tracing::info!(state = %state.text, "printer not connected, connecting");
        self.printer.connect()?;
        self.pacer.settle(&self.printer, std::time::Duration::ZERO)?;
        Ok(self.printer.state()?)
    }

    /// Send one command as typed by the operator.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Printer`] on failure.
    pub fn send_command(&mut self, line: &str) -> Result<SendOutcome, SessionError> {
        let outcome = self.printer.send_command(line.trim())?;
        // Manual motion invalidates the tracked position.
        self.position = None;
        Ok(outcome)
    }

    /// `.gcode` files in the configured folder.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Printer`] if the folder cannot be listed.
    pub fn gcode_files(&self) -> Result<Vec<std::path::PathBuf>, SessionError> {
        Ok(list_gcode_files(&self.config.gcode_folder)?)
    }

    /// Send every command of a G-code file.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Printer`] if the file cannot be read or
    /// a command fails.
    pub fn send_file(&mut self, path: &Path) -> Result<SendSummary, SessionError> {
        let summary = self.printer.send_file(path)?;
        self.position = None;
        Ok(summary)
    }

    /// Home all axes, set the extruder steps and switch to relative
    /// extrusion.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Printer`] if a command fails or the
    /// printer does not settle.
    pub fn home(&mut self) -> Result<SendSummary, SessionError> {
        let commands: Vec<PacedCommand> = setup_commands()
            .into_iter()
            .map(|line| PacedCommand {
                estimate: self.pacer.command_estimate(&line),
                line,
            })
            .collect();
        let summary = self.pacer.send_paced(&self.printer, &commands)?;
        self.position = (summary.skipped == 0).then_some(HOME);
        Ok(summary)
    }

    /// Send moves in order, waiting for each to settle.
    ///
    /// # Errors
    ///
    /// Stops at the first failed command.
    pub fn run_moves<'m>(
        &mut self,
        moves: impl IntoIterator<Item = &'m Move>,
    ) -> Result<SendSummary, SessionError> {
        let (commands, last) = paced_moves(moves, self.position, &self.options);
        // The position is unknown until the batch completes.
        self.position = None;
        let summary = self.pacer.send_paced(&self.printer, &commands)?;
        if summary.skipped == 0 {
            self.position = last;
        }
        Ok(summary)
    }

    fn park(&mut self) -> Result<SendSummary, SessionError> {
        let park = Move::travel(self.config.trace.motion.park);
        self.run_moves([&park])
    }

    /// Capture the bed, plan the traversal of the workpiece outline and
    /// trace it.
    ///
    /// # Errors
    ///
    /// Returns the first printer, capture, artifact or pipeline error.
    /// Nothing is sent after a failure.
    pub fn trace(&mut self, operator: &mut impl Operator) -> Result<TraceOutcome, SessionError> {
        if operator.confirm("Home all axes and set up the extruder first?")? {
            self.home()?;
        }
        self.park()?;
        if !operator.confirm("Place the workpiece on the bed. Capture now?")? {
            return Ok(TraceOutcome::NotPlaced);
        }

        let result = capture_and_plan(&self.camera, self.config)?;
        operator.show(&describe_trace(&result))?;

        let approach = Move::travel(result.plan.approach);
        let summary = self.run_moves([&approach])?;
        if summary.skipped > 0 {
            tracing::warn!("approach skipped, outline not traced");
            return Ok(TraceOutcome::Halted {
                result: Box::new(result),
                summary,
            });
        }
        if !operator.confirm("Trace the outline now?")? {
            self.park()?;
            return Ok(TraceOutcome::Declined(Box::new(result)));
        }

        let moves = result.plan.moves();
        // The approach was already sent.
        let summary = self.run_moves(moves.iter().skip(1))?;
        let result = Box::new(result);
        if summary.skipped > 0 {
            tracing::warn!(sent = summary.sent, skipped = summary.skipped, "traversal halted");
            return Ok(TraceOutcome::Halted { result, summary });
        }
        tracing::info!(sent = summary.sent, "outline traced");
        Ok(TraceOutcome::Traced { result, summary })
    }

    /// Home, then run the extrusion sweep one run at a time.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Pipeline`] before any command is sent if
    /// a run leaves the work area, otherwise the first printer error.
    pub fn sweep(&mut self, operator: &mut impl Operator) -> Result<SweepReport, SessionError> {
        let plan = plan_pattern(&self.config.pattern)?;
        let mut report = SweepReport {
            runs_done: 0,
            runs_planned: plan.runs.len(),
            summary: self.home()?,
        };
        for (index, run) in plan.runs.iter().enumerate() {
            operator.show(&format!(
                "Run {}/{} [{}]: speed {} mm/min, extrusion ratio {}, height {} mm",
                index + 1,
                report.runs_planned,
                run.code,
                run.speed,
                run.extrusion_ratio,
                run.height
            ))?;
            if !operator.confirm("Start this run?")? {
                tracing::info!(run = %run.code, "sweep stopped by operator");
                break;
            }
            let summary = self.run_moves(&run.moves)?;
            report.summary.merge(summary);
            report.runs_done += 1;
            if summary.skipped > 0 {
                tracing::warn!(run = %run.code, "printer not ready, sweep halted");
                break;
            }
        }
        Ok(report)
    }
}

fn describe_trace(result: &TraceResult) -> String {
    use std::fmt::Write;

    let mut text = String::from("Markers (px):");
    for p in &result.ordered_markers.0 {
        let _ = write!(text, " ({:.1}, {:.1})", p.x, p.y);
    }
    text.push_str("\nCorners (mm):");
    for p in &result.mapped_corners {
        let _ = write!(text, " ({:.2}, {:.2})", p.x, p.y);
    }
    text.push_str("\nAdjusted (mm):");
    for p in result.adjusted_corners.points() {
        let _ = write!(text, " ({:.2}, {:.2})", p.x, p.y);
    }
    text
}
