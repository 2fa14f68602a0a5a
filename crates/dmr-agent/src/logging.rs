//! Named file loggers and the tracing layer that feeds them.
//!
//! Loggers live in a process-wide registry keyed by name. The first
//! [`get_logger`] call for a name opens the log file in append mode and
//! attaches it as the logger's only handler; later calls for the same name
//! return the same logger untouched, so output is never duplicated.
//!
//! Code in this crate logs through the ordinary `tracing` macros. A
//! [`LoggerLayer`] installed on the subscriber renders those events into the
//! logger's file as
//!
//! ```text
//! 2025-01-31 14:02:11 [INFO] (JokeAgent) Connected to Docker Model Runner
//! ```

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Local};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// Timestamp format for log lines.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Events from targets outside this crate (HTTP internals) are not recorded.
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

static REGISTRY: OnceLock<Mutex<HashMap<String, Logger>>> = OnceLock::new();

/// Render one log line (without the trailing newline).
pub fn format_line(time: &DateTime<Local>, level: Level, name: &str, message: &str) -> String {
    format!("{} [{level}] ({name}) {message}", time.format(DATE_FORMAT))
}

/// An append-mode log file.
#[derive(Debug)]
pub struct FileHandler {
    path: PathBuf,
    file: File,
}

impl FileHandler {
    /// Open `path` for appending, creating its parent directory if needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.file, "{line}")?;
        self.file.flush()
    }
}

struct LoggerInner {
    name: String,
    handlers: Mutex<Vec<FileHandler>>,
}

/// A named logger. Cheap to clone; clones share handlers.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.inner.name)
            .field("handlers", &self.handler_count())
            .finish()
    }
}

/// Look up the logger called `name`, creating it with a file handler for
/// `path` if it has none yet.
///
/// Repeated calls for the same name never add a second handler, even if a
/// different path is passed.
pub fn get_logger(name: &str, path: &Path) -> io::Result<Logger> {
    let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
    let mut loggers = registry.lock().unwrap_or_else(|e| e.into_inner());

    let logger = loggers
        .entry(name.to_string())
        .or_insert_with(|| Logger {
            inner: Arc::new(LoggerInner {
                name: name.to_string(),
                handlers: Mutex::new(Vec::new()),
            }),
        })
        .clone();

    {
        let mut handlers = logger.lock_handlers();
        if handlers.is_empty() {
            handlers.push(FileHandler::open(path)?);
        }
    }

    Ok(logger)
}

impl Logger {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Number of attached handlers.
    pub fn handler_count(&self) -> usize {
        self.lock_handlers().len()
    }

    /// Paths of the attached handlers.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.lock_handlers()
            .iter()
            .map(|h| h.path().to_path_buf())
            .collect()
    }

    /// Write one line to every handler. Write failures are dropped; there is
    /// nowhere left to report them.
    pub fn log(&self, level: Level, message: &str) {
        let line = format_line(&Local::now(), level, self.name(), message);
        for handler in self.lock_handlers().iter_mut() {
            let _ = handler.write_line(&line);
        }
    }

    /// A tracing layer that forwards events to this logger.
    pub fn layer(&self) -> LoggerLayer {
        LoggerLayer {
            logger: self.clone(),
        }
    }

    /// Install this logger as the process-wide tracing subscriber.
    ///
    /// Returns `false` if a global subscriber was already set.
    pub fn install_global(&self) -> bool {
        tracing_subscriber::registry()
            .with(self.layer())
            .try_init()
            .is_ok()
    }

    fn lock_handlers(&self) -> std::sync::MutexGuard<'_, Vec<FileHandler>> {
        self.inner.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A [`tracing_subscriber::Layer`] that writes DEBUG-and-above events from
/// this crate to a [`Logger`].
pub struct LoggerLayer {
    logger: Logger,
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for LoggerLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let meta = event.metadata();
        if *meta.level() > Level::DEBUG || !meta.target().starts_with(OWN_TARGET) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.logger.log(*meta.level(), &visitor.into_message());
    }
}

/// Visitor that extracts the message and extra fields from a tracing event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl MessageVisitor {
    fn into_message(self) -> String {
        if self.fields.is_empty() {
            return self.message;
        }
        let extras: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        if self.message.is_empty() {
            extras.join(" ")
        } else {
            format!("{} {{{}}}", self.message, extras.join(", "))
        }
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            // `format_args!` messages debug-print without quotes.
            self.message = format!("{value:?}");
        } else {
            self.fields
                .push((field.name().to_string(), format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .push((field.name().to_string(), value.to_string()));
        }
    }
}
