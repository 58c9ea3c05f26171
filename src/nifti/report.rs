//! Error notification side channel.
//!
//! Decode failures are returned to the caller as [`Error`] values and are also
//! announced here, so a UI layer can show them without threading results
//! through its own plumbing. Delivery is best-effort.

use crate::error::Error;
use std::sync::mpsc::Sender;
use std::sync::Mutex;

/// Name of the event every decode failure is announced under.
pub const ERROR_EVENT: &str = "error";

/// A failure announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    /// Always [`ERROR_EVENT`].
    pub name: &'static str,
    /// Display text of the error.
    pub message: String,
}

impl ErrorEvent {
    /// Announcement for `err`.
    pub fn from_error(err: &Error) -> Self {
        Self {
            name: ERROR_EVENT,
            message: err.to_string(),
        }
    }
}

/// Receiver of failure announcements.
pub trait ErrorReporter: Send + Sync {
    /// Deliver one event. Must not panic.
    fn report(&self, event: &ErrorEvent);
}

impl<F> ErrorReporter for F
where
    F: Fn(&ErrorEvent) + Send + Sync,
{
    fn report(&self, event: &ErrorEvent) {
        self(event)
    }
}

/// Reports through the `log` facade at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, event: &ErrorEvent) {
        log::error!("{}: {}", event.name, event.message);
    }
}

/// Forwards events to an mpsc channel. Events are dropped once the receiver is gone.
#[derive(Debug)]
pub struct ChannelReporter {
    sender: Mutex<Sender<ErrorEvent>>,
}

impl ChannelReporter {
    /// Forward events to `sender`.
    pub fn new(sender: Sender<ErrorEvent>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl ErrorReporter for ChannelReporter {
    fn report(&self, event: &ErrorEvent) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(event.clone());
        }
    }
}
