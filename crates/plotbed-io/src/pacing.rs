//! Motion pacing.
//!
//! The controller acknowledges a command as soon as it is queued, not
//! when the move finishes. After each accepted move the pacer sleeps for
//! the estimated move time plus a margin, then polls the printer until
//! it reports ready again or the acknowledgment timeout elapses. Only
//! then is the next command issued.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::printer::{PrinterClient, PrinterError, SendOutcome, SendSummary};
use crate::transport::Transport;

/// Time source. Abstracted so pacing can be tested without sleeping.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdClock;

impl Clock for StdClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Pacing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Added to every move estimate (ms).
    pub settle_margin_ms: u64,
    /// Interval between readiness polls (ms).
    pub poll_interval_ms: u64,
    /// Give up polling after this long (ms).
    pub ack_timeout_ms: u64,
    /// Expected duration of a homing cycle (ms).
    pub homing_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            settle_margin_ms: 500,
            poll_interval_ms: 250,
            ack_timeout_ms: 10_000,
            homing_ms: 12_000,
        }
    }
}

/// A command with the time its motion is expected to take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacedCommand {
    /// G-code text.
    pub line: String,
    /// Estimated move time; zero for non-motion commands.
    pub estimate: Duration,
}

/// Issues commands one at a time, waiting for each to settle.
#[derive(Debug)]
pub struct Pacer<C> {
    config: PacingConfig,
    clock: C,
}

impl<C: Clock> Pacer<C> {
    /// Create a pacer.
    pub const fn new(config: PacingConfig, clock: C) -> Self {
        Self { config, clock }
    }

    /// Pacing parameters.
    pub const fn config(&self) -> &PacingConfig {
        &self.config
    }

    /// Estimate for a non-motion command. `G28` takes the configured
    /// homing time, everything else is treated as instant.
    #[must_use]
    pub fn command_estimate(&self, line: &str) -> Duration {
        if line.split_whitespace().next() == Some("G28") {
            Duration::from_millis(self.config.homing_ms)
        } else {
            Duration::ZERO
        }
    }

    /// Wait for a move estimated at `estimate` to finish.
    ///
    /// # Errors
    ///
    /// Returns [`PrinterError::SettleTimeout`] if the printer is not
    /// ready within the acknowledgment timeout, or any error from the
    /// state query.
    pub fn settle<T: Transport>(
        &self,
        printer: &PrinterClient<T>,
        estimate: Duration,
    ) -> Result<(), PrinterError> {
        self.clock
            .sleep(estimate + Duration::from_millis(self.config.settle_margin_ms));

        let started = self.clock.now();
        let timeout = Duration::from_millis(self.config.ack_timeout_ms);
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            let state = printer.state()?;
            if state.accepts_commands() {
                return Ok(());
            }
            let waited = self.clock.now().duration_since(started);
            if waited >= timeout {
                return Err(PrinterError::SettleTimeout {
                    state: state.text,
                    waited_ms: waited.as_millis(),
                });
            }
            tracing::debug!(state = %state.text, "waiting for printer");
            self.clock.sleep(poll);
        }
    }

    /// Send commands in order, settling after every accepted one.
    ///
    /// The batch ends at the first skipped command: later moves would
    /// start from a position the head never reached. The skipped command
    /// and every command after it count as skipped.
    ///
    /// # Errors
    ///
    /// Stops at the first error; commands after it are not sent.
    pub fn send_paced<T: Transport>(
        &self,
        printer: &PrinterClient<T>,
        commands: &[PacedCommand],
    ) -> Result<SendSummary, PrinterError> {
        let mut summary = SendSummary::default();
        for (index, command) in commands.iter().enumerate() {
            match printer.send_command(&command.line)? {
                SendOutcome::Sent => {
                    summary.sent += 1;
                    self.settle(printer, command.estimate)?;
                }
                SendOutcome::Skipped { .. } => {
                    summary.skipped += commands.len() - index;
                    tracing::warn!(
                        unsent = commands.len() - index,
                        "batch stopped at a skipped command"
                    );
                    break;
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use serde_json::json;

    use super::*;
    use crate::transport::{HttpResponse, TransportError};

    /// Clock that advances only when slept on.
    struct FakeClock {
        base: Instant,
        elapsed: Cell<Duration>,
        sleeps: RefCell<Vec<Duration>>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                base: Instant::now(),
                elapsed: Cell::new(Duration::ZERO),
                sleeps: RefCell::default(),
            }
        }
    }

    impl Clock for &FakeClock {
        fn now(&self) -> Instant {
            self.base + self.elapsed.get()
        }

        fn sleep(&self, duration: Duration) {
            self.elapsed.set(self.elapsed.get() + duration);
            self.sleeps.borrow_mut().push(duration);
        }
    }

    /// Serves a scripted sequence of states; the last one repeats.
    struct ScriptedPrinter {
        states: RefCell<VecDeque<(&'static str, bool)>>,
        commands: RefCell<Vec<String>>,
    }

    impl ScriptedPrinter {
        fn new(states: &[(&'static str, bool)]) -> Self {
            Self {
                states: RefCell::new(states.iter().copied().collect()),
                commands: RefCell::default(),
            }
        }
    }

    impl Transport for ScriptedPrinter {
        fn get(&self, _path: &str) -> Result<HttpResponse, TransportError> {
            let mut states = self.states.borrow_mut();
            let (text, ready) = if states.len() > 1 {
                states.pop_front().unwrap()
            } else {
                states[0]
            };
            let body = json!({"state": {"text": text, "flags": {"operational": true, "printing": !ready}}});
            Ok(HttpResponse {
                status: 200,
                body: body.to_string().into_bytes(),
            })
        }

        fn post_json(
            &self,
            _path: &str,
            body: &serde_json::Value,
        ) -> Result<HttpResponse, TransportError> {
            self.commands
                .borrow_mut()
                .push(body["command"].as_str().unwrap_or_default().to_owned());
            Ok(HttpResponse {
                status: 204,
                body: Vec::new(),
            })
        }
    }

    fn config() -> PacingConfig {
        PacingConfig {
            settle_margin_ms: 100,
            poll_interval_ms: 50,
            ack_timeout_ms: 200,
            homing_ms: 1_000,
        }
    }

    #[test]
    fn waits_for_estimated_move_time() {
        let clock = FakeClock::new();
        let printer = PrinterClient::new(ScriptedPrinter::new(&[("Operational", true)]));
        let pacer = Pacer::new(config(), &clock);
        pacer.settle(&printer, Duration::from_secs(5)).unwrap();
        assert_eq!(*clock.sleeps.borrow(), vec![Duration::from_millis(5100)]);
    }

    #[test]
    fn polls_until_ready() {
        let clock = FakeClock::new();
        let printer = PrinterClient::new(ScriptedPrinter::new(&[
            ("Busy", false),
            ("Busy", false),
            ("Operational", true),
        ]));
        let pacer = Pacer::new(config(), &clock);
        pacer.settle(&printer, Duration::ZERO).unwrap();
        assert_eq!(
            *clock.sleeps.borrow(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(50),
                Duration::from_millis(50)
            ]
        );
    }

    #[test]
    fn gives_up_after_timeout() {
        let clock = FakeClock::new();
        let printer = PrinterClient::new(ScriptedPrinter::new(&[("Printing", false)]));
        let pacer = Pacer::new(config(), &clock);
        let err = pacer.settle(&printer, Duration::ZERO).unwrap_err();
        assert!(matches!(
            err,
            PrinterError::SettleTimeout { ref state, waited_ms: 200 } if state == "Printing"
        ));
    }

    #[test]
    fn paced_batch_settles_after_each_command() {
        let clock = FakeClock::new();
        let printer = PrinterClient::new(ScriptedPrinter::new(&[("Operational", true)]));
        let pacer = Pacer::new(config(), &clock);
        let commands = [
            PacedCommand {
                line: "G1 X10 Y0 Z6 F600".into(),
                estimate: Duration::from_secs(1),
            },
            PacedCommand {
                line: "G1 X20 Y0 Z6 F600".into(),
                estimate: Duration::from_secs(1),
            },
        ];
        let summary = pacer.send_paced(&printer, &commands).unwrap();
        assert_eq!(summary.sent, 2);
        assert_eq!(clock.sleeps.borrow().len(), 2);
        assert_eq!(
            *printer.transport().commands.borrow(),
            vec!["G1 X10 Y0 Z6 F600", "G1 X20 Y0 Z6 F600"]
        );
    }

    #[test]
    fn homing_has_its_own_estimate() {
        let pacer = Pacer::new(config(), StdClock);
        assert_eq!(pacer.command_estimate("G28"), Duration::from_secs(1));
        assert_eq!(pacer.command_estimate("G28 X Y"), Duration::from_secs(1));
        assert_eq!(pacer.command_estimate("M83"), Duration::ZERO);
    }

    #[test]
    fn skipped_commands_are_not_waited_for() {
        let clock = FakeClock::new();
        let printer = PrinterClient::new(ScriptedPrinter::new(&[("Printing", false)]));
        let pacer = Pacer::new(config(), &clock);
        let commands = [PacedCommand {
            line: "G28".into(),
            estimate: Duration::ZERO,
        }];
        let summary = pacer.send_paced(&printer, &commands).unwrap();
        assert_eq!(summary, SendSummary { sent: 0, skipped: 1 });
        assert!(clock.sleeps.borrow().is_empty());
    }

    #[test]
    fn batch_stops_at_first_skipped_command() {
        let clock = FakeClock::new();
        // Ready for the first move and its settle, paused for the second,
        // ready again afterwards.
        let printer = PrinterClient::new(ScriptedPrinter::new(&[
            ("Operational", true),
            ("Operational", true),
            ("Paused", false),
            ("Operational", true),
        ]));
        let pacer = Pacer::new(config(), &clock);
        let commands: Vec<PacedCommand> = [
            "G1 X10 Y0 Z6 F3000",
            "G1 X20 Y0 Z6 F400 E4",
            "G1 X30 Y0 Z6 F200",
        ]
        .into_iter()
        .map(|line| PacedCommand {
            line: line.into(),
            estimate: Duration::ZERO,
        })
        .collect();
        let summary = pacer.send_paced(&printer, &commands).unwrap();
        assert_eq!(summary, SendSummary { sent: 1, skipped: 2 });
        assert_eq!(*printer.transport().commands.borrow(), vec!["G1 X10 Y0 Z6 F3000"]);
    }
}
