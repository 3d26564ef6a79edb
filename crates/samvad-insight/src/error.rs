//! Typed pipeline errors callers are expected to match on.
//!
//! Everything else in the crate uses `anyhow::Result`; these two cases are
//! part of the analysis contract (an unreadable input is fatal for the run,
//! an empty dialog produces an error object instead of a report).

use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Ошибка чтения файла {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Пустой диалог")]
    EmptyDialog { dialog_id: String },
}

impl PipelineError {
    /// JSON error object in the shape the analysis output contract uses:
    /// an empty dialog carries its `dialog_id`, a read failure does not.
    pub fn to_report(&self) -> serde_json::Value {
        match self {
            Self::Read { .. } => json!({ "error": self.to_string() }),
            Self::EmptyDialog { dialog_id } => {
                json!({ "dialog_id": dialog_id, "error": self.to_string() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dialog_report_carries_dialog_id() {
        let err = PipelineError::EmptyDialog {
            dialog_id: "x".to_string(),
        };
        let report = err.to_report();
        assert_eq!(report["dialog_id"], "x");
        assert_eq!(report["error"], "Пустой диалог");
    }

    #[test]
    fn read_error_report_has_no_dialog_id() {
        let err = PipelineError::Read {
            path: "dialogs/1.json".to_string(),
            reason: "No such file".to_string(),
        };
        let report = err.to_report();
        assert!(report.get("dialog_id").is_none());
        assert!(report["error"].as_str().unwrap().contains("dialogs/1.json"));
    }
}
