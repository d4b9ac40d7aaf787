//! User-facing notifications.

use std::io::{self, Write};

/// Shows a message to the person operating the camera.
///
/// Used by the relay to report that hand tracking could not be set up.
pub trait Notifier: Send {
    fn alert(&self, message: &str);
}

/// Reports notifications through the `log` facade, at *error* level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn alert(&self, message: &str) {
        log::error!("{message}");
    }
}

/// Prints notifications to *stderr*, for command-line programs.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn alert(&self, message: &str) {
        writeln!(io::stderr().lock(), "{message}").ok();
    }
}

impl<F: Fn(&str) + Send> Notifier for F {
    fn alert(&self, message: &str) {
        self(message)
    }
}
