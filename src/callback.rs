//! Front-end callback interface
//!
//! The router reports chat activity to whatever presents it (console, GUI)
//! through [`UiCallback`], injected at construction. The front-end also gets
//! a say in renames.

use tracing::info;

/// Notifications from the router to the presentation layer
///
/// Called from the router task; implementations must not block.
pub trait UiCallback: Send + Sync {
    /// A chat message was relayed, already tagged with the sender's name
    fn on_message(&self, tagged: &str);

    /// Approve, rewrite or reject a rename
    ///
    /// Returns the final name, or `None` to keep `old_name`.
    fn rename_client(&self, old_name: &str, requested: &str) -> Option<String>;

    /// A client left or was removed
    fn on_removed(&self, name: &str);
}

/// Console front-end that logs every event
///
/// Accepts any non-blank rename, trimmed.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCallback;

impl UiCallback for LoggingCallback {
    fn on_message(&self, tagged: &str) {
        info!("{}", tagged);
    }

    fn rename_client(&self, old_name: &str, requested: &str) -> Option<String> {
        let requested = requested.trim();
        if requested.is_empty() {
            return None;
        }
        info!("'{}' is now known as '{}'", old_name, requested);
        Some(requested.to_string())
    }

    fn on_removed(&self, name: &str) {
        info!("'{}' left the chat", name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_callback_rename() {
        let callback = LoggingCallback;
        assert_eq!(
            callback.rename_client("Guest1", "  Alice "),
            Some("Alice".to_string())
        );
        assert_eq!(callback.rename_client("Guest1", "   "), None);
    }
}
