//! Trigger payload and the track reference extracted from it

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Webhook payload delivered when a track's audio lands in the object store
///
/// Only `record.id` and `record.mainAudioFilePath` are read; everything else
/// the sender includes (`type`, `table`, `old_record`, ...) is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerPayload {
    #[serde(default)]
    pub record: Option<TriggerRecord>,
}

/// Row image carried by the trigger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "mainAudioFilePath")]
    pub main_audio_file_path: Option<String>,
}

impl TriggerPayload {
    pub fn new(track_id: impl Into<String>, audio_path: impl Into<String>) -> Self {
        Self {
            record: Some(TriggerRecord {
                id: Some(track_id.into()),
                main_audio_file_path: Some(audio_path.into()),
            }),
        }
    }
}

/// Validated identity of the track being processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackReference {
    pub track_id: String,
    pub audio_path: String,
}

impl TrackReference {
    /// Extract a reference from a trigger payload
    ///
    /// Both fields must be present and non-blank. Surrounding whitespace is
    /// stripped.
    pub fn from_payload(payload: &TriggerPayload) -> Result<Self, PipelineError> {
        let record = payload.record.as_ref();

        let track_id = record
            .and_then(|r| r.id.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(PipelineError::MissingField("record.id"))?;

        let audio_path = record
            .and_then(|r| r.main_audio_file_path.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(PipelineError::MissingField("record.mainAudioFilePath"))?;

        Ok(Self {
            track_id: track_id.to_string(),
            audio_path: audio_path.to_string(),
        })
    }

    /// Lower-cased file extension of the audio path, used as a format hint
    pub fn extension(&self) -> Option<String> {
        extension_hint(&self.audio_path)
    }
}

/// Lower-cased extension of the last path segment
pub fn extension_hint(path: &str) -> Option<String> {
    let file_name = path.rsplit('/').next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
