//! Interactive menu.
//!
//! Reads one choice per line and dispatches to the session. Errors are
//! reported and the menu keeps running; end of input quits.

use std::io::{self, BufRead, Write};

use plotbed_io::{Clock, ImageSource, SendOutcome, Transport};

use crate::session::{Operator, Session, SessionError, TraceOutcome};

const MENU: &str = "\
====================================
1. Send a G-code command
2. Send a G-code file
3. Trace the workpiece outline
4. Run the extrusion sweep
5. Show the printer state
9. Quit
====================================";

/// Line-oriented operator console.
#[derive(Debug)]
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    /// Console over the given streams.
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print `prompt` and read one trimmed line; `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if either stream fails.
    pub fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_owned()))
    }

    /// Print one line.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the output fails.
    pub fn say(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.output, "{text}")
    }
}

impl<R: BufRead, W: Write> Operator for Console<R, W> {
    /// Enter or `y` goes ahead; anything else, or end of input, stops.
    fn confirm(&mut self, prompt: &str) -> io::Result<bool> {
        let answer = self.ask(&format!("{prompt} [Y/n] "))?;
        Ok(answer.is_some_and(|a| {
            a.is_empty() || a.eq_ignore_ascii_case("y") || a.eq_ignore_ascii_case("yes")
        }))
    }

    fn show(&mut self, message: &str) -> io::Result<()> {
        self.say(message)
    }
}

/// Run the menu until the operator quits or input ends.
///
/// # Errors
///
/// Only console failures end the menu with an error; operation errors
/// are reported and the menu continues.
pub fn run<T, S, C, R, W>(
    session: &mut Session<'_, T, S, C>,
    console: &mut Console<R, W>,
) -> Result<(), SessionError>
where
    T: Transport,
    S: ImageSource,
    C: Clock,
    R: BufRead,
    W: Write,
{
    loop {
        console.say(MENU)?;
        let Some(choice) = console.ask("Select an option: ")? else {
            return Ok(());
        };
        let result = match choice.as_str() {
            "1" => send_one(session, console),
            "2" => send_file(session, console),
            "3" => trace(session, console),
            "4" => sweep(session, console),
            "5" => show_status(session, console),
            "9" | "q" => {
                console.say("Bye.")?;
                return Ok(());
            }
            other => {
                console.say(&format!("Unknown option {other:?}."))?;
                continue;
            }
        };
        if let Err(err) = result {
            tracing::error!(%err, "operation failed");
            console.say(&format!("Error: {err}"))?;
        }
    }
}

fn report_outcome<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    command: &str,
    outcome: &SendOutcome,
) -> io::Result<()> {
    match outcome {
        SendOutcome::Sent => console.say(&format!("Sent: {command}")),
        SendOutcome::Skipped { state } => {
            console.say(&format!("Not sent, printer is {state}: {command}"))
        }
    }
}

fn show_status<T, S, C, R, W>(
    session: &Session<'_, T, S, C>,
    console: &mut Console<R, W>,
) -> Result<(), SessionError>
where
    T: Transport,
    S: ImageSource,
    C: Clock,
    R: BufRead,
    W: Write,
{
    let state = session.status()?;
    console.say(&format!("Printer state: {}", state.text))?;
    Ok(())
}

fn send_one<T, S, C, R, W>(
    session: &mut Session<'_, T, S, C>,
    console: &mut Console<R, W>,
) -> Result<(), SessionError>
where
    T: Transport,
    S: ImageSource,
    C: Clock,
    R: BufRead,
    W: Write,
{
    let Some(command) = console.ask("G-code command: ")? else {
        return Ok(());
    };
    if command.is_empty() {
        return Ok(());
    }
    let outcome = session.send_command(&command)?;
    report_outcome(console, &command, &outcome)?;
    Ok(())
}

fn send_file<T, S, C, R, W>(
    session: &mut Session<'_, T, S, C>,
    console: &mut Console<R, W>,
) -> Result<(), SessionError>
where
    T: Transport,
    S: ImageSource,
    C: Clock,
    R: BufRead,
    W: Write,
{
    let files = session.gcode_files()?;
    if files.is_empty() {
        console.say("No G-code files available.")?;
        return Ok(());
    }
    console.say("Available files:")?;
    for (index, file) in files.iter().enumerate() {
        let name = file.file_name().unwrap_or(file.as_os_str());
        console.say(&format!("{}. {}", index + 1, name.to_string_lossy()))?;
    }
    let Some(choice) = console.ask("Select a file (number): ")? else {
        return Ok(());
    };
    let Some(path) = choice
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| files.get(i))
    else {
        console.say("Invalid choice.")?;
        return Ok(());
    };
    let summary = session.send_file(path)?;
    console.say(&format!(
        "{} commands sent, {} skipped.",
        summary.sent, summary.skipped
    ))?;
    Ok(())
}

fn trace<T, S, C, R, W>(
    session: &mut Session<'_, T, S, C>,
    console: &mut Console<R, W>,
) -> Result<(), SessionError>
where
    T: Transport,
    S: ImageSource,
    C: Clock,
    R: BufRead,
    W: Write,
{
    match session.trace(console)? {
        TraceOutcome::NotPlaced => console.say("Capture cancelled.")?,
        TraceOutcome::Declined(_) => console.say("Trace cancelled, tool parked.")?,
        TraceOutcome::Halted { summary, .. } => console.say(&format!(
            "Printer not ready, trace halted: {} commands sent, {} not sent.",
            summary.sent, summary.skipped
        ))?,
        TraceOutcome::Traced { summary, .. } => console.say(&format!(
            "Outline traced: {} commands sent, {} skipped.",
            summary.sent, summary.skipped
        ))?,
    }
    Ok(())
}

fn sweep<T, S, C, R, W>(
    session: &mut Session<'_, T, S, C>,
    console: &mut Console<R, W>,
) -> Result<(), SessionError>
where
    T: Transport,
    S: ImageSource,
    C: Clock,
    R: BufRead,
    W: Write,
{
    let report = session.sweep(console)?;
    console.say(&format!(
        "Sweep: {}/{} runs, {} commands sent, {} skipped.",
        report.runs_done, report.runs_planned, report.summary.sent, report.summary.skipped
    ))?;
    Ok(())
}
