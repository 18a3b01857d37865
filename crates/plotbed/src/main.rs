//! plotbed: drive a 3D printer as a plotter from a webcam snapshot.
//!
//! Without a subcommand the interactive menu starts. The one-shot
//! subcommands cover the same operations for scripting, and `analyze`
//! runs the vision pipeline on an image file without a printer.
//!
//! # Usage
//!
//! ```text
//! plotbed [--config config/config.json] [-v] [COMMAND]
//! plotbed analyze bed.jpg --gcode trace.gcode --svg trace.svg
//! RUST_LOG=plotbed_io=debug plotbed trace
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod config;
mod menu;
mod session;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use plotbed_io::{FileImageSource, SendOutcome, SnapshotCamera, StdClock, UreqTransport};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::menu::Console;
use crate::session::{AutoConfirm, Session, SessionError, TraceOutcome};

/// Trace a workpiece outline or run an extrusion sweep on an
/// OctoPrint-controlled printer.
#[derive(Parser)]
#[command(name = "plotbed", version)]
struct Cli {
    /// Configuration file (JSON). Defaults to config/config.json when it
    /// exists, built-in defaults otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace). Overrides RUST_LOG.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive menu (default).
    Menu,
    /// Print the printer state.
    Status,
    /// Connect the controller to the printer and wait until it is ready.
    Connect,
    /// Send one G-code command.
    Send {
        /// Command text, e.g. "G28".
        command: String,
    },
    /// Send every command of a G-code file.
    SendFile {
        /// Program file.
        path: PathBuf,
    },
    /// List the G-code files in the configured folder.
    List,
    /// Capture the bed and trace the workpiece outline.
    Trace {
        /// Do not ask before each step.
        #[arg(long)]
        yes: bool,
    },
    /// Run the extrusion sweep.
    Pattern {
        /// Print the program instead of sending it.
        #[arg(long)]
        dry_run: bool,
        /// Do not ask before each run.
        #[arg(long)]
        yes: bool,
    },
    /// Run the vision pipeline on an image file. No printer needed.
    Analyze {
        /// Bed image (PNG, JPEG, BMP, WebP).
        image: PathBuf,
        /// Write the traversal as a G-code program.
        #[arg(long)]
        gcode: Option<PathBuf>,
        /// Write an SVG preview of the traversal.
        #[arg(long)]
        svg: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_timer(fmt::time::Uptime::default())
        .with_writer(io::stderr)
        .finish()
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), SessionError> {
    let config = AppConfig::resolve(cli.config.as_deref())?;
    let command = cli.command.unwrap_or(Command::Menu);

    // Offline commands first: they never touch the network.
    match &command {
        Command::Analyze { image, gcode, svg } => {
            let result = session::capture_and_plan(&FileImageSource::new(image), &config)?;
            session::export_trace(
                &result,
                &config,
                &image.display().to_string(),
                gcode.as_deref(),
                svg.as_deref(),
            )?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            return Ok(());
        }
        Command::Pattern { dry_run: true, .. } => {
            print!("{}", session::sweep_program(&config)?);
            return Ok(());
        }
        Command::List => {
            for file in plotbed_io::printer::list_gcode_files(&config.gcode_folder)
                .map_err(SessionError::from)?
            {
                println!("{}", file.display());
            }
            return Ok(());
        }
        _ => {}
    }

    let transport = UreqTransport::new(
        &config.printer.url,
        &config.printer.api_key,
        config.printer.timeout(),
    );
    let camera = SnapshotCamera::new(transport.clone(), &config.snapshot_path);
    let mut session = Session::new(&config, transport, camera, StdClock);

    match command {
        Command::Menu => {
            println!("plotbed {}", env!("CARGO_PKG_VERSION"));
            if let Err(err) = session.ensure_connected() {
                tracing::warn!(%err, "printer not ready");
                println!("Could not connect to the printer: {err}");
            }
            let stdin = io::stdin();
            let mut console = Console::new(stdin.lock(), io::stdout());
            menu::run(&mut session, &mut console)
        }
        Command::Status => {
            let state = session.status()?;
            println!("{}", state.text);
            Ok(())
        }
        Command::Connect => {
            let state = session.ensure_connected()?;
            println!("{}", state.text);
            Ok(())
        }
        Command::Send { command } => {
            match session.send_command(&command)? {
                SendOutcome::Sent => println!("sent"),
                SendOutcome::Skipped { state } => println!("skipped: printer is {state}"),
            }
            Ok(())
        }
        Command::SendFile { path } => {
            let summary = session.send_file(&path)?;
            println!("{} sent, {} skipped", summary.sent, summary.skipped);
            Ok(())
        }
        Command::Trace { yes } => {
            session.ensure_connected()?;
            let outcome = if yes {
                session.trace(&mut AutoConfirm)?
            } else {
                let stdin = io::stdin();
                session.trace(&mut Console::new(stdin.lock(), io::stdout()))?
            };
            match outcome {
                TraceOutcome::NotPlaced => println!("capture cancelled"),
                TraceOutcome::Declined(result) => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                TraceOutcome::Halted { result, summary } => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    println!(
                        "halted: {} sent, {} not sent (printer not ready)",
                        summary.sent, summary.skipped
                    );
                }
                TraceOutcome::Traced { result, summary } => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                    println!("{} sent, {} skipped", summary.sent, summary.skipped);
                }
            }
            Ok(())
        }
        Command::Pattern { yes, .. } => {
            session.ensure_connected()?;
            let report = if yes {
                session.sweep(&mut AutoConfirm)?
            } else {
                let stdin = io::stdin();
                session.sweep(&mut Console::new(stdin.lock(), io::stdout()))?
            };
            println!(
                "{}/{} runs, {} sent, {} skipped",
                report.runs_done, report.runs_planned, report.summary.sent, report.summary.skipped
            );
            Ok(())
        }
        Command::Analyze { .. } | Command::List => Ok(()),
    }
}
