//! Injectable output sinks.
//!
//! User-visible output is routed through small traits rather than calling
//! `println!`/`eprintln!` directly from deep inside the VM, so an embedder
//! can capture program output and diagnostics without touching process
//! stdio. Two channels: program output (`print(...)`) and non-fatal
//! diagnostics (warnings that don't abort evaluation).

/// Destination for values written by the `print` built-in.
pub trait Stdout {
    fn write_line(&mut self, line: &str);
}

/// Writes directly to the process's real stdout. Used by the CLI.
#[derive(Debug, Default)]
pub struct StdOut;

impl Stdout for StdOut {
    fn write_line(&mut self, line: &str) {
        println!("{line}");
    }
}

/// Buffers output into a `String` instead of touching the real stdout.
/// Used by tests so assertions don't need to capture process stdio.
#[derive(Debug, Default)]
pub struct CollectingOut(pub String);

impl Stdout for CollectingOut {
    fn write_line(&mut self, line: &str) {
        self.0.push_str(line);
        self.0.push('\n');
    }
}

/// Destination for non-fatal warnings (missing arithmetic slot, non-callable
/// callee, unset global, ...). These never abort evaluation; they are
/// purely informational.
pub trait Diagnostics {
    fn warn(&mut self, message: &str);
}

/// Writes `warning: ...` lines to stderr. Used by the CLI.
#[derive(Debug, Default)]
pub struct StderrDiagnostics;

impl Diagnostics for StderrDiagnostics {
    fn warn(&mut self, message: &str) {
        eprintln!("warning: {message}");
    }
}

/// Buffers warnings into a `Vec<String>` instead of touching stderr. Used by
/// tests that want to assert a particular warning was raised.
#[derive(Debug, Default)]
pub struct CollectingDiagnostics(pub Vec<String>);

impl Diagnostics for CollectingDiagnostics {
    fn warn(&mut self, message: &str) {
        self.0.push(message.to_owned());
    }
}
