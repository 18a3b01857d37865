//! OctoPrint controller client.
//!
//! The printer state is decoded once into [`PrinterState`]. Motion and
//! extrusion commands are only transmitted while the printer is ready
//! to accept them; otherwise [`PrinterClient::send_command`] reports a
//! [`SendOutcome::Skipped`] without touching the network.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::transport::{HttpResponse, Transport, TransportError};

const CONNECTION_PATH: &str = "/api/connection";
const PRINTER_PATH: &str = "/api/printer";
const COMMAND_PATH: &str = "/api/printer/command";

/// Errors from the controller client.
#[derive(Debug, thiserror::Error)]
pub enum PrinterError {
    /// The request did not complete.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a status the operation does not accept.
    #[error("{operation} failed with HTTP {status}: {body}")]
    UnexpectedStatus {
        /// What was attempted.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response text.
        body: String,
    },

    /// Reading a G-code file or folder failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File or folder.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The printer did not become ready within the acknowledgment
    /// timeout after a move.
    #[error("printer not ready after {waited_ms} ms (state: {state})")]
    SettleTimeout {
        /// Last reported state text.
        state: String,
        /// Time spent polling.
        waited_ms: u128,
    },
}

/// State flags reported by `GET /api/printer`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct StateFlags {
    /// Connected and idle or busy.
    pub operational: bool,
    /// A job is paused.
    pub paused: bool,
    /// A job is running.
    pub printing: bool,
    /// A job is being paused.
    pub pausing: bool,
    /// A job is being cancelled.
    pub cancelling: bool,
    /// The SD card is ready.
    pub sd_ready: bool,
    /// The controller is in an error state.
    pub error: bool,
    /// Ready to accept a new job.
    pub ready: bool,
    /// Disconnected or in an error state.
    pub closed_or_error: bool,
}

/// Printer state: human-readable text plus flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterState {
    /// State text, e.g. `"Operational"` or `"Paused"`.
    pub text: String,
    /// State flags.
    #[serde(default)]
    pub flags: StateFlags,
}

impl PrinterState {
    /// State reported when the server has no printer connection.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            text: "Offline".to_owned(),
            flags: StateFlags {
                closed_or_error: true,
                ..StateFlags::default()
            },
        }
    }

    /// Returns `true` if the printer is connected.
    #[must_use]
    pub const fn is_operational(&self) -> bool {
        self.flags.operational
    }

    /// Returns `true` if motion commands may be sent now: connected and
    /// no job running, paused or winding down.
    #[must_use]
    pub const fn accepts_commands(&self) -> bool {
        let f = &self.flags;
        f.operational && !f.printing && !f.paused && !f.pausing && !f.cancelling && !f.error
    }
}

#[derive(Deserialize)]
struct PrinterStatus {
    state: PrinterState,
}

/// Result of a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The controller accepted the command.
    Sent,
    /// The command was not transmitted because the printer was not
    /// ready.
    Skipped {
        /// State text at the time.
        state: String,
    },
}

/// Counts for a batch of commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendSummary {
    /// Commands accepted.
    pub sent: usize,
    /// Commands not transmitted.
    pub skipped: usize,
}

impl SendSummary {
    /// Add one outcome.
    pub const fn record(&mut self, outcome: &SendOutcome) {
        match outcome {
            SendOutcome::Sent => self.sent += 1,
            SendOutcome::Skipped { .. } => self.skipped += 1,
        }
    }

    /// Add the counts of another batch.
    pub const fn merge(&mut self, other: Self) {
        self.sent += other.sent;
        self.skipped += other.skipped;
    }
}

/// OctoPrint client over a [`Transport`].
#[derive(Debug)]
pub struct PrinterClient<T> {
    transport: T,
}

fn expect_status(
    operation: &'static str,
    response: &HttpResponse,
    expected: u16,
) -> Result<(), PrinterError> {
    if response.status == expected {
        Ok(())
    } else {
        Err(PrinterError::UnexpectedStatus {
            operation,
            status: response.status,
            body: response.text(),
        })
    }
}

impl<T: Transport> PrinterClient<T> {
    /// Wrap a transport.
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }

    /// The underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Ask the server to connect to the printer with auto-detected port
    /// and baud rate and the default profile.
    ///
    /// # Errors
    ///
    /// Returns [`PrinterError::UnexpectedStatus`] unless the server
    /// answers 204.
    pub fn connect(&self) -> Result<(), PrinterError> {
        let body = json!({
            "command": "connect",
            "port": "AUTO",
            "baudrate": 0,
            "printerProfile": "_default",
        });
        let response = self.transport.post_json(CONNECTION_PATH, &body)?;
        expect_status("connect", &response, 204)?;
        tracing::info!("connection requested");
        Ok(())
    }

    /// Current printer state. A 409 answer (no printer connected)
    /// decodes as [`PrinterState::offline`].
    ///
    /// # Errors
    ///
    /// Returns [`PrinterError`] on transport failure, another non-200
    /// status, or an undecodable body.
    pub fn state(&self) -> Result<PrinterState, PrinterError> {
        let response = self.transport.get(PRINTER_PATH)?;
        match response.status {
            200 => Ok(response.json::<PrinterStatus>(PRINTER_PATH)?.state),
            409 => Ok(PrinterState::offline()),
            status => Err(PrinterError::UnexpectedStatus {
                operation: "state query",
                status,
                body: response.text(),
            }),
        }
    }

    /// Returns `true` if the printer is connected.
    ///
    /// # Errors
    ///
    /// See [`state`](Self::state).
    pub fn is_operational(&self) -> Result<bool, PrinterError> {
        Ok(self.state()?.is_operational())
    }

    /// Human-readable state text.
    ///
    /// # Errors
    ///
    /// See [`state`](Self::state).
    pub fn state_text(&self) -> Result<String, PrinterError> {
        Ok(self.state()?.text)
    }

    /// Send one command if the printer accepts commands.
    ///
    /// # Errors
    ///
    /// Returns [`PrinterError`] if the state query or the command
    /// request fails, or the command is not answered with 204.
    pub fn send_command(&self, command: &str) -> Result<SendOutcome, PrinterError> {
        let state = self.state()?;
        if !state.accepts_commands() {
            tracing::warn!(command, state = %state.text, "printer not ready, command skipped");
            return Ok(SendOutcome::Skipped { state: state.text });
        }
        let response = self
            .transport
            .post_json(COMMAND_PATH, &json!({ "command": command }))?;
        expect_status("command", &response, 204)?;
        tracing::info!(command, "sent");
        Ok(SendOutcome::Sent)
    }

    /// Send commands in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// See [`send_command`](Self::send_command).
    pub fn send_commands<S: AsRef<str>>(&self, commands: &[S]) -> Result<SendSummary, PrinterError> {
        let mut summary = SendSummary::default();
        for command in commands {
            summary.record(&self.send_command(command.as_ref())?);
        }
        Ok(summary)
    }

    /// Send every command line of a G-code file.
    ///
    /// Lines are trimmed; blank lines and `;` comment lines are not
    /// sent.
    ///
    /// # Errors
    ///
    /// Returns [`PrinterError::Io`] if the file cannot be read, otherwise
    /// see [`send_command`](Self::send_command).
    pub fn send_file(&self, path: &Path) -> Result<SendSummary, PrinterError> {
        let text = std::fs::read_to_string(path).map_err(|source| PrinterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let commands = program_lines(&text);
        tracing::info!(path = %path.display(), commands = commands.len(), "sending file");
        self.send_commands(&commands)
    }
}

/// Command lines of a program: trimmed, without blanks and comments.
#[must_use]
pub fn program_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(';'))
        .collect()
}

/// `.gcode` files directly inside `folder`, sorted by name.
///
/// # Errors
///
/// Returns [`PrinterError::Io`] if the folder cannot be listed.
pub fn list_gcode_files(folder: &Path) -> Result<Vec<PathBuf>, PrinterError> {
    let io_err = |source| PrinterError::Io {
        path: folder.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_gcode = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gcode"));
        if is_gcode && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    /// Answers GETs from a fixed table and records every request.
    #[derive(Default)]
    struct FakeTransport {
        gets: HashMap<String, HttpResponse>,
        post_status: u16,
        log: RefCell<Vec<String>>,
    }

    impl FakeTransport {
        fn with_state(text: &str, flags: serde_json::Value) -> Self {
            let body = json!({ "state": { "text": text, "flags": flags } });
            let mut gets = HashMap::new();
            gets.insert(
                PRINTER_PATH.to_owned(),
                HttpResponse {
                    status: 200,
                    body: body.to_string().into_bytes(),
                },
            );
            Self {
                gets,
                post_status: 204,
                log: RefCell::default(),
            }
        }

        fn posts(&self) -> Vec<String> {
            self.log
                .borrow()
                .iter()
                .filter(|l| l.starts_with("POST"))
                .cloned()
                .collect()
        }
    }

    impl Transport for FakeTransport {
        fn get(&self, path: &str) -> Result<HttpResponse, TransportError> {
            self.log.borrow_mut().push(format!("GET {path}"));
            self.gets
                .get(path)
                .cloned()
                .ok_or_else(|| TransportError::Request {
                    path: path.to_owned(),
                    message: "unreachable".into(),
                })
        }

        fn post_json(
            &self,
            path: &str,
            body: &serde_json::Value,
        ) -> Result<HttpResponse, TransportError> {
            self.log.borrow_mut().push(format!("POST {path} {body}"));
            Ok(HttpResponse {
                status: self.post_status,
                body: Vec::new(),
            })
        }
    }

    fn operational() -> FakeTransport {
        FakeTransport::with_state("Operational", json!({"operational": true, "ready": true}))
    }

    #[test]
    fn operational_printer_receives_command() {
        let client = PrinterClient::new(operational());
        assert_eq!(client.send_command("G28").unwrap(), SendOutcome::Sent);
        assert_eq!(
            client.transport().posts(),
            vec![r#"POST /api/printer/command {"command":"G28"}"#]
        );
    }

    #[test]
    fn paused_printer_skips_command() {
        let transport = FakeTransport::with_state(
            "Paused",
            json!({"operational": true, "paused": true, "ready": false}),
        );
        let client = PrinterClient::new(transport);
        let outcome = client.send_command("G1 X10 Y10 Z6 F400 E4").unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Skipped {
                state: "Paused".into()
            }
        );
        assert!(client.transport().posts().is_empty());
    }

    #[test]
    fn disconnected_printer_is_offline() {
        let mut transport = operational();
        transport.gets.insert(
            PRINTER_PATH.to_owned(),
            HttpResponse {
                status: 409,
                body: b"Printer is not operational".to_vec(),
            },
        );
        let client = PrinterClient::new(transport);
        assert!(!client.is_operational().unwrap());
        assert_eq!(client.state_text().unwrap(), "Offline");
        assert!(matches!(
            client.send_command("M83").unwrap(),
            SendOutcome::Skipped { .. }
        ));
    }

    #[test]
    fn connect_posts_auto_settings() {
        let client = PrinterClient::new(operational());
        client.connect().unwrap();
        let posts = client.transport().posts();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].starts_with("POST /api/connection"));
        assert!(posts[0].contains(r#""port":"AUTO""#));
        assert!(posts[0].contains(r#""printerProfile":"_default""#));
    }

    #[test]
    fn rejected_command_is_an_error() {
        let mut transport = operational();
        transport.post_status = 409;
        let client = PrinterClient::new(transport);
        assert!(matches!(
            client.send_command("G28"),
            Err(PrinterError::UnexpectedStatus { status: 409, .. })
        ));
    }

    #[test]
    fn unreachable_server_is_a_transport_error() {
        let transport = FakeTransport::default();
        let client = PrinterClient::new(transport);
        assert!(matches!(
            client.state(),
            Err(PrinterError::Transport(TransportError::Request { .. }))
        ));
    }

    #[test]
    fn flags_decode_from_camel_case() {
        let state: PrinterState = serde_json::from_str(
            r#"{"text":"Printing","flags":{"operational":true,"printing":true,"sdReady":true,"closedOrError":false}}"#,
        )
        .unwrap();
        assert!(state.is_operational());
        assert!(!state.accepts_commands());
        assert!(state.flags.sd_ready);
    }

    #[test]
    fn send_commands_counts_outcomes() {
        let client = PrinterClient::new(operational());
        let summary = client.send_commands(&["G28", "M83"]).unwrap();
        assert_eq!(summary, SendSummary { sent: 2, skipped: 0 });
    }

    #[test]
    fn send_file_skips_blank_and_comment_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("square.gcode");
        std::fs::write(&path, "; plotbed\n  G28  \n\nM83\n").unwrap();
        let client = PrinterClient::new(operational());
        let summary = client.send_file(&path).unwrap();
        assert_eq!(summary.sent, 2);
        let posts = client.transport().posts();
        assert!(posts[0].ends_with(r#"{"command":"G28"}"#));
        assert!(posts[1].ends_with(r#"{"command":"M83"}"#));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let client = PrinterClient::new(operational());
        assert!(matches!(
            client.send_file(Path::new("/nonexistent/x.gcode")),
            Err(PrinterError::Io { .. })
        ));
    }

    #[test]
    fn gcode_listing_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.gcode", "a.GCODE", "notes.txt"] {
            std::fs::write(dir.path().join(name), "G28\n").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.gcode")).unwrap();
        let files = list_gcode_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.GCODE", "b.gcode"]);
    }
}
