//! Advisory diagnostics for the mutation pipeline.
//!
//! Nothing emitted here influences control flow. Lines go to the `log`
//! facade under the `wiremut` target, or into an in-memory capture when the
//! sink is built with [`DiagnosticSink::capturing`].

use crate::config::DiagnosticsSettings;
use log::{Level, LevelFilter};
use std::fmt::{self, Write as _};

/// Log target used for every line the sink emits.
pub const LOG_TARGET: &str = "wiremut";

/// Number of bytes rendered per hexdump row.
const BYTES_PER_ROW: usize = 16;

#[derive(Debug, Clone)]
enum SinkOutput {
    Log,
    Capture(Vec<String>),
}

/// Runtime-configurable diagnostic sink.
///
/// The level is fixed at construction. Hexdumps are emitted only when the
/// sink was built with hexdumps enabled and the dump's level passes the
/// filter.
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    level: LevelFilter,
    hexdump: bool,
    output: SinkOutput,
}

impl DiagnosticSink {
    pub fn new(level: LevelFilter, hexdump: bool) -> Self {
        Self {
            level,
            hexdump,
            output: SinkOutput::Log,
        }
    }

    pub fn from_settings(settings: &DiagnosticsSettings) -> Self {
        Self::new(settings.level.into(), settings.hexdump)
    }

    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self::new(LevelFilter::Off, false)
    }

    /// A sink that records its lines instead of logging them.
    pub fn capturing(level: LevelFilter, hexdump: bool) -> Self {
        Self {
            level,
            hexdump,
            output: SinkOutput::Capture(Vec::new()),
        }
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }

    pub fn emit(&mut self, level: Level, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        match &mut self.output {
            SinkOutput::Log => log::log!(target: LOG_TARGET, level, "{args}"),
            SinkOutput::Capture(lines) => lines.push(args.to_string()),
        }
    }

    /// Emits a rendered hexdump of `bytes`, one line per row.
    pub fn dump(&mut self, level: Level, bytes: &[u8]) {
        if !self.hexdump || !self.enabled(level) {
            return;
        }
        for (row, chunk) in bytes.chunks(BYTES_PER_ROW).enumerate() {
            let line = hexdump_row(row * BYTES_PER_ROW, chunk);
            self.emit(level, format_args!("{line}"));
        }
    }

    /// Lines recorded by a capturing sink. Always empty for a logging sink.
    pub fn captured(&self) -> &[String] {
        match &self.output {
            SinkOutput::Log => &[],
            SinkOutput::Capture(lines) => lines,
        }
    }
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::from_settings(&DiagnosticsSettings::default())
    }
}

/// Renders one hexdump row: offset, up to 16 hex bytes, then printable ASCII.
///
/// ```text
///   0000  00 00 00 03 61 62 63                             ....abc
/// ```
pub fn hexdump_row(offset: usize, chunk: &[u8]) -> String {
    debug_assert!(chunk.len() <= BYTES_PER_ROW);
    let mut line = String::with_capacity(8 + BYTES_PER_ROW * 4 + 2);
    let _ = write!(line, "  {offset:04x} ");
    for byte in chunk {
        let _ = write!(line, " {byte:02x}");
    }
    for _ in chunk.len()..BYTES_PER_ROW {
        line.push_str("   ");
    }
    line.push_str("  ");
    line.extend(chunk.iter().map(|&b| printable(b)));
    line
}

/// Renders `bytes` as newline-terminated hexdump rows. Empty input renders
/// as an empty string.
pub fn hexdump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(BYTES_PER_ROW).enumerate() {
        out.push_str(&hexdump_row(row * BYTES_PER_ROW, chunk));
        out.push('\n');
    }
    out
}

fn printable(byte: u8) -> char {
    if byte == b' ' || byte.is_ascii_graphic() {
        byte as char
    } else {
        '.'
    }
}

/// Installs `env_logger` as the global logger. `RUST_LOG` overrides the
/// default filter. Safe to call more than once.
pub fn init_logging(default_level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .try_init();
}
