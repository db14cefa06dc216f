//! Progress events emitted by commands and the reconciler.
//!
//! Events are delivered in order through an mpsc channel registered on the
//! [`CommandContext`]. A context without a channel drops them.

use std::sync::mpsc::{self, Receiver, Sender};

use tracing::debug;

/// Progress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    /// A command started.
    Start { command: String, target: String },
    /// Fetching remote content.
    Downloading { target: String },
    /// Unpacking staged content.
    Extracting { target: String },
    /// Copying into the live addon directory.
    Copying { folders: Vec<String> },
    /// A multi-folder package was registered under one parent.
    FolderOwnership {
        parent: String,
        owned_folders: Vec<String>,
    },
    /// Reconciliation finished.
    ScanComplete { processed: usize },
    /// A command finished.
    Complete { success: bool, message: String },
}

/// Execution context handed to commands.
///
/// Exposes ordered event emission and nothing else.
#[derive(Debug, Default)]
pub struct CommandContext {
    /// Sender for progress events.
    events: Option<Sender<CommandEvent>>,
}

impl CommandContext {
    /// Creates a context that drops every event.
    #[must_use]
    pub fn silent() -> Self {
        Self { events: None }
    }

    /// Creates a context that forwards events to `sender`.
    #[must_use]
    pub fn with_sender(sender: Sender<CommandEvent>) -> Self {
        Self {
            events: Some(sender),
        }
    }

    /// Creates a context together with the receiving end of its channel.
    #[must_use]
    pub fn channel() -> (Self, Receiver<CommandEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::with_sender(tx), rx)
    }

    /// Emits an event.
    pub fn emit(&mut self, event: CommandEvent) {
        debug!("[EVENT] {:?}", event);
        if let Some(ref tx) = self.events {
            // Receiver gone means nobody is listening any more
            if tx.send(event).is_err() {
                self.events = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_in_order() {
        let (mut ctx, rx) = CommandContext::channel();
        ctx.emit(CommandEvent::ScanComplete { processed: 2 });
        ctx.emit(CommandEvent::Complete {
            success: true,
            message: "done".to_string(),
        });

        let events: Vec<CommandEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                CommandEvent::ScanComplete { processed: 2 },
                CommandEvent::Complete {
                    success: true,
                    message: "done".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_dropped_receiver() {
        let (mut ctx, rx) = CommandContext::channel();
        drop(rx);
        ctx.emit(CommandEvent::ScanComplete { processed: 0 });
        assert!(ctx.events.is_none());
    }
}
