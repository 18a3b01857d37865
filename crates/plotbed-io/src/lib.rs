//! plotbed-io: printer controller, camera and filesystem I/O.
//!
//! Talks to an OctoPrint server over HTTP, captures webcam snapshots,
//! paces motion commands, and persists captured and annotated images.
//! All HTTP traffic goes through the [`Transport`] trait so the
//! controller logic can be exercised without a network.

pub mod artifacts;
pub mod camera;
pub mod pacing;
pub mod printer;
pub mod transport;

pub use artifacts::{ArtifactError, ArtifactPaths};
pub use camera::{CaptureError, FileImageSource, ImageSource, SnapshotCamera};
pub use pacing::{Clock, PacedCommand, Pacer, PacingConfig, StdClock};
pub use printer::{PrinterClient, PrinterError, PrinterState, SendOutcome, SendSummary};
pub use transport::{HttpResponse, Transport, TransportError, UreqTransport};
