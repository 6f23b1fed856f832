//! Invocation result bodies

use serde::{Deserialize, Serialize};

use super::{Stage, UpsertOutcome};

/// Body returned for a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessStatus {
    /// Always `"ok"`
    pub status: String,
    pub track_id: String,
    #[serde(flatten)]
    pub outcome: UpsertOutcome,
    pub dimension: usize,
}

impl SuccessStatus {
    pub fn new(track_id: impl Into<String>, outcome: UpsertOutcome, dimension: usize) -> Self {
        Self {
            status: "ok".to_string(),
            track_id: track_id.into(),
            outcome,
            dimension,
        }
    }
}

/// Body returned for a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureStatus {
    /// Always `"error"`
    pub status: String,
    /// Failing stage; absent when the payload itself was rejected
    pub stage: Option<Stage>,
    pub kind: String,
    pub message: String,
}

impl FailureStatus {
    pub fn new(stage: Option<Stage>, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            stage,
            kind: kind.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_body_shape() {
        let body = serde_json::to_value(SuccessStatus::new(
            "t-1",
            UpsertOutcome::Updated { revision: 2 },
            512,
        ))
        .unwrap();

        assert_eq!(
            body,
            json!({
                "status": "ok",
                "trackId": "t-1",
                "outcome": "updated",
                "revision": 2,
                "dimension": 512
            })
        );
    }

    #[test]
    fn test_failure_body_shape() {
        let body = serde_json::to_value(FailureStatus::new(
            Some(Stage::Decode),
            "DecodeError",
            "audio contains no samples",
        ))
        .unwrap();

        assert_eq!(body["status"], "error");
        assert_eq!(body["stage"], "decode");
        assert_eq!(body["kind"], "DecodeError");

        let rejected = serde_json::to_value(FailureStatus::new(None, "MissingField", "x")).unwrap();
        assert!(rejected["stage"].is_null());
    }
}
