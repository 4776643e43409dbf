//! Log sink installation.
//!
//! The library only emits `tracing` events. Which sink receives them is the
//! binary's decision, made once at startup from [`LogConfig`].

use crate::config::{LogConfig, LogTarget};
use anyhow::{anyhow, Result};
use std::ffi::CString;
use std::io::{self, IsTerminal, Write};
use std::sync::OnceLock;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber for `config`.
///
/// `ident` names the process in syslog. `RUST_LOG` takes precedence over the
/// configured verbosity.
pub fn init(config: &LogConfig, ident: &str) -> Result<()> {
    let filter = build_filter(config.verbose);

    match config.target {
        LogTarget::Discard => Ok(()),
        LogTarget::Stderr => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_target(false)
            .try_init()
            .map_err(|e| anyhow!("Failed to install log subscriber: {e}")),
        LogTarget::Syslog => {
            open_syslog(ident);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(SyslogWriter)
                .with_ansi(false)
                .with_target(false)
                .with_level(false)
                .without_time()
                .try_init()
                .map_err(|e| anyhow!("Failed to install log subscriber: {e}"))
        }
    }
}

fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "info" })
    })
}

// openlog keeps the ident pointer, so it must outlive the process
static SYSLOG_IDENT: OnceLock<CString> = OnceLock::new();

fn open_syslog(ident: &str) {
    let ident = SYSLOG_IDENT.get_or_init(|| {
        CString::new(ident.replace('\0', "")).unwrap_or_default()
    });
    // SAFETY: ident lives in a static for the rest of the process.
    unsafe {
        libc::openlog(ident.as_ptr(), libc::LOG_PID, libc::LOG_DAEMON);
    }
}

fn syslog_priority(level: &Level) -> libc::c_int {
    match *level {
        Level::ERROR => libc::LOG_ERR,
        Level::WARN => libc::LOG_WARNING,
        Level::INFO => libc::LOG_INFO,
        Level::DEBUG | Level::TRACE => libc::LOG_DEBUG,
    }
}

/// `MakeWriter` that routes each formatted event to `syslog(3)`.
#[derive(Debug, Clone, Copy)]
struct SyslogWriter;

impl<'a> MakeWriter<'a> for SyslogWriter {
    type Writer = SyslogLine;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogLine::new(libc::LOG_INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SyslogLine::new(syslog_priority(meta.level()))
    }
}

/// One event's worth of output, sent to syslog when dropped.
struct SyslogLine {
    priority: libc::c_int,
    buf: Vec<u8>,
}

impl SyslogLine {
    fn new(priority: libc::c_int) -> Self {
        Self {
            priority,
            buf: Vec::with_capacity(128),
        }
    }
}

impl Write for SyslogLine {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogLine {
    fn drop(&mut self) {
        let line: Vec<u8> = self
            .buf
            .iter()
            .copied()
            .filter(|b| *b != 0)
            .collect();
        let trimmed = String::from_utf8_lossy(&line);
        let trimmed = trimmed.trim_end();
        if trimmed.is_empty() {
            return;
        }
        if let Ok(msg) = CString::new(trimmed) {
            // SAFETY: "%s" with a valid NUL-terminated argument.
            unsafe {
                libc::syslog(self.priority, b"%s\0".as_ptr() as *const libc::c_char, msg.as_ptr());
            }
        }
    }
}
