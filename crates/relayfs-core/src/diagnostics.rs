//! Line-oriented diagnostics side channel.
//!
//! Each call appends one record of the form `[2021-11-06 14:03:12] message`.
//! The sink is not part of the functional contract: write failures are
//! reported through `tracing` and otherwise ignored.

use parking_lot::Mutex;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, LineWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Timestamp format used for every record.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Destination for per-call diagnostic records.
pub struct DiagnosticsSink {
    writer: Option<Mutex<Box<dyn Write + Send>>>,
}

impl DiagnosticsSink {
    /// A sink that only mirrors records to `tracing`.
    pub fn disabled() -> Self {
        Self { writer: None }
    }

    /// Wraps an arbitrary writer.
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Some(Mutex::new(Box::new(writer))),
        }
    }

    /// Opens `path` for appending, creating it if needed. Records are
    /// line-buffered.
    pub fn append_to(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(LineWriter::new(file)))
    }

    /// Returns true when records reach a writer.
    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Appends one timestamped record.
    pub fn record(&self, message: fmt::Arguments<'_>) {
        debug!(target: "relayfs::diagnostics", "{message}");

        let Some(writer) = &self.writer else {
            return;
        };
        let now = chrono::Local::now().format(TIME_FORMAT);
        let mut writer = writer.lock();
        if let Err(e) = writeln!(writer, "[{now}] {message}") {
            warn!(error = %e, "failed to write diagnostics record");
        }
    }
}

impl fmt::Debug for DiagnosticsSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticsSink")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Default for DiagnosticsSink {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Appends a `format!`-style record to a [`DiagnosticsSink`].
#[macro_export]
macro_rules! diag {
    ($sink:expr, $($arg:tt)*) => {
        $sink.record(format_args!($($arg)*))
    };
}
