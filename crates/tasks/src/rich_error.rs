use serde::Serialize;
use serde_json::Value;

/// Structured failure report for the orchestration layer: the action that
/// was attempted, the arguments it was attempted with, and the underlying
/// error text. Forwarded instead of raising, so callers can render partial
/// results next to a short diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct RichError {
    pub action: String,
    pub args: Value,
    pub error: String,
}

impl RichError {
    pub fn new(action: impl Into<String>, args: Value, error: impl std::fmt::Display) -> Self {
        Self {
            action: action.into(),
            args,
            error: error.to_string(),
        }
    }

    /// Short diagnostic string derived from the captured error.
    #[must_use]
    pub fn message(&self) -> String {
        format!("failed to {}: {}", self.action, self.error)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_combines_action_and_error() {
        let rich = RichError::new(
            "write files to workspace",
            serde_json::json!({"workspace_id": "abc"}),
            "disk full",
        );
        assert_eq!(
            rich.message(),
            "failed to write files to workspace: disk full"
        );
    }

    #[test]
    fn test_serializes_with_args() {
        let rich = RichError::new("read files", serde_json::json!({"paths": ["a.txt"]}), "boom");
        let json = serde_json::to_value(&rich).unwrap();
        assert_eq!(json["action"], "read files");
        assert_eq!(json["args"]["paths"][0], "a.txt");
        assert_eq!(json["error"], "boom");
    }
}
