// Logging setup
//
// `log` facade with an `env_logger` backend. When file logging is enabled every
// record goes to stderr and to the log file. The returned guard is the last
// thing main drops, so the file is closed after everything else has shut down.

use anyhow::{Context, Result};
use env_logger::{Target, WriteStyle};
use log::LevelFilter;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crate::config::DebugConfig;

/// Writes every byte to both sinks.
pub struct Tee<A, B> {
    first: A,
    second: B,
}

impl<A: Write, B: Write> Tee<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.first.write_all(buf)?;
        self.second.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.first.flush()?;
        self.second.flush()
    }
}

/// Log file shared between the logger and the guard.
#[derive(Clone)]
pub struct LogFile(Arc<Mutex<LineWriter<File>>>);

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.lock().flush()
    }
}

impl LogFile {
    /// Create (or truncate) the log file, creating parent directories as needed.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {:?}", parent))?;
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {:?}", path))?;

        let mut log_file = Self(Arc::new(Mutex::new(LineWriter::new(file))));
        writeln!(log_file, "=== Big Engine Log ===")?;
        writeln!(log_file, "Started: {:?}", std::time::SystemTime::now())?;
        writeln!(log_file)?;

        Ok(log_file)
    }
}

/// Keeps the log file open. Dropping it closes the log.
pub struct LogGuard {
    file: Option<LogFile>,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        log::logger().flush();

        if let Some(file) = self.file.as_mut() {
            let _ = writeln!(file);
            let _ = writeln!(file, "Stopped: {:?}", std::time::SystemTime::now());
            let _ = file.flush();
        }
    }
}

/// Install the global logger.
///
/// The filter comes from `RUST_LOG` when set, otherwise from `log_level`.
/// An unknown `log_level` falls back to `info` with a warning.
/// Fails if the log file cannot be created or a logger is already installed.
pub fn init(config: &DebugConfig) -> Result<LogGuard> {
    let mut builder = env_logger::Builder::new();

    let mut bad_level = None;
    match std::env::var("RUST_LOG") {
        Ok(filter) => {
            builder.parse_filters(&filter);
        }
        Err(_) => {
            let level = level_filter(&config.log_level).unwrap_or_else(|e| {
                bad_level = Some(e);
                LevelFilter::Info
            });
            builder.filter_level(level);
        }
    }

    let file = if config.log_to_file {
        Some(LogFile::create(Path::new(&config.log_file))?)
    } else {
        None
    };

    if let Some(file) = &file {
        // No ANSI escapes in the file copy
        builder.write_style(WriteStyle::Never);
        builder.target(Target::Pipe(Box::new(Tee::new(io::stderr(), file.clone()))));
    }

    builder.try_init().context("Failed to install logger")?;

    if let Some(e) = bad_level {
        log::warn!("{:#}, using info", e);
    }

    if config.log_to_file {
        log::info!("Logging to {}", config.log_file);
    }

    Ok(LogGuard { file })
}

/// Parse a single level name (`off`, `error` ... `trace`, any case).
fn level_filter(name: &str) -> Result<LevelFilter> {
    name.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Unknown log level '{}'", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("big-engine-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn level_names_parse_in_any_case() {
        assert_eq!(level_filter("info").unwrap(), LevelFilter::Info);
        assert_eq!(level_filter("DEBUG").unwrap(), LevelFilter::Debug);
        assert_eq!(level_filter(" warn ").unwrap(), LevelFilter::Warn);
        assert_eq!(level_filter("off").unwrap(), LevelFilter::Off);
    }

    #[test]
    fn mistyped_level_is_rejected_not_read_as_a_module() {
        let err = level_filter("verbose").unwrap_err();
        assert!(err.to_string().contains("verbose"));
        assert!(level_filter("").is_err());
    }

    #[test]
    fn tee_writes_to_both_sinks() {
        let mut tee = Tee::new(Vec::new(), Vec::new());
        tee.write_all(b"frame 1\n").unwrap();
        tee.flush().unwrap();
        assert_eq!(tee.first, b"frame 1\n");
        assert_eq!(tee.second, b"frame 1\n");
    }

    #[test]
    fn tee_fails_when_either_sink_fails() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut tee = Tee::new(Vec::new(), Broken);
        assert!(tee.write(b"x").is_err());
    }

    #[test]
    fn log_file_creates_parent_directories_and_header() {
        let dir = scratch_dir("logfile");
        let path = dir.join("nested").join("engine.log");

        let mut file = LogFile::create(&path).unwrap();
        writeln!(file, "hello").unwrap();
        file.flush().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("=== Big Engine Log ==="));
        assert!(text.contains("hello"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn log_file_is_truncated_on_create() {
        let dir = scratch_dir("truncate");
        let path = dir.join("engine.log");

        let mut first = LogFile::create(&path).unwrap();
        writeln!(first, "old run").unwrap();
        drop(first);

        LogFile::create(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("old run"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn guard_writes_closing_line() {
        let dir = scratch_dir("guard");
        let path = dir.join("engine.log");

        let guard = LogGuard {
            file: Some(LogFile::create(&path).unwrap()),
        };
        drop(guard);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Stopped:"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unwritable_log_path_is_an_error() {
        let dir = scratch_dir("blocked");
        std::fs::create_dir_all(&dir).unwrap();
        // A regular file where a directory is expected
        let blocker = dir.join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        assert!(LogFile::create(&blocker.join("engine.log")).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
