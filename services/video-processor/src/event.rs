use crate::config::ProcessingConfig;
use crate::error::{PipelineError, PipelineResult};
use aws_lambda_events::event::s3::{S3Event, S3EventRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use tracing::debug;

/// One object-created notification, reduced to what the pipeline reads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Source bucket name
    pub bucket: Option<String>,
    /// Object key, URL-encoded as delivered by S3
    pub key: Option<String>,
    /// S3 event name (e.g. "ObjectCreated:Put")
    #[serde(default)]
    pub event_name: Option<String>,
    /// When S3 emitted the notification
    #[serde(default)]
    pub event_time: Option<DateTime<Utc>>,
}

impl From<&S3EventRecord> for NotificationRecord {
    fn from(record: &S3EventRecord) -> Self {
        Self {
            bucket: record.s3.bucket.name.clone(),
            key: record.s3.object.key.clone(),
            event_name: record.event_name.clone(),
            event_time: Some(record.event_time),
        }
    }
}

/// Flatten an S3 event into notification records, in delivery order
pub fn records_from_event(event: &S3Event) -> Vec<NotificationRecord> {
    event.records.iter().map(NotificationRecord::from).collect()
}

/// Work derived from one video notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoTask {
    pub source_bucket: String,
    /// Decoded object key
    pub source_key: String,
    pub target_bucket: String,
    /// Source key minus its extension; names the workspace folder and the
    /// staging key prefix
    pub video_base_name: String,
}

/// Whether a notification leads to processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDecision {
    /// Process the video described by the task
    Process(VideoTask),
    /// Leave the object alone with given reason
    Skip { key: String, reason: String },
}

impl VideoTask {
    /// Validate a notification and derive the task it describes
    pub fn from_record(
        record: &NotificationRecord,
        settings: &ProcessingConfig,
    ) -> PipelineResult<TaskDecision> {
        let source_bucket = required(record.bucket.as_deref(), "bucket name")?;
        let raw_key = required(record.key.as_deref(), "object key")?;
        let source_key = decode_object_key(raw_key)?;

        if !has_video_extension(&source_key, &settings.video_extensions) {
            debug!(key = %source_key, "Not a video object");
            return Ok(TaskDecision::Skip {
                reason: format!("Skipped non-video file: {}", source_key),
                key: source_key,
            });
        }

        let target_bucket = target_bucket_for(
            source_bucket,
            &settings.source_marker,
            &settings.stage_marker,
        )?;

        ensure_relative_key(&source_key)?;

        // The extension check above guarantees a '.' is present
        let video_base_name = match source_key.rfind('.') {
            Some(dot) => source_key[..dot].to_string(),
            None => source_key.clone(),
        };

        let base_is_usable = Path::new(&video_base_name)
            .file_name()
            .map(|name| !name.is_empty())
            .unwrap_or(false)
            && !video_base_name.ends_with('/');

        if !base_is_usable {
            return Err(PipelineError::Validation(format!(
                "Object key {} has no usable base name",
                source_key
            )));
        }

        Ok(TaskDecision::Process(VideoTask {
            source_bucket: source_bucket.to_string(),
            source_key,
            target_bucket,
            video_base_name,
        }))
    }
}

fn required<'a>(value: Option<&'a str>, what: &str) -> PipelineResult<&'a str> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(PipelineError::Validation(format!("Record is missing the {}", what))),
    }
}

/// Decode an S3 notification key. S3 form-encodes keys, so '+' is a space.
pub fn decode_object_key(raw_key: &str) -> PipelineResult<String> {
    let spaced = raw_key.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|key| key.into_owned())
        .map_err(|e| PipelineError::Validation(format!("Undecodable object key {}: {}", raw_key, e)))
}

/// Case-insensitive check of the final extension segment
pub fn has_video_extension(key: &str, extensions: &[String]) -> bool {
    let Some((_, extension)) = key.rsplit_once('.') else {
        return false;
    };

    !extension.contains('/')
        && extensions
            .iter()
            .any(|candidate| candidate.trim_start_matches('.').eq_ignore_ascii_case(extension))
}

/// Map an input bucket to its staging bucket by swapping one marker occurrence
pub fn target_bucket_for(
    source_bucket: &str,
    source_marker: &str,
    stage_marker: &str,
) -> PipelineResult<String> {
    if !source_bucket.contains(source_marker) {
        return Err(PipelineError::Validation(format!(
            "Bucket {} is not an input bucket (expected '{}' in its name)",
            source_bucket, source_marker
        )));
    }

    Ok(source_bucket.replacen(source_marker, stage_marker, 1))
}

/// Keys become paths under the scratch root; they may not climb out of it
fn ensure_relative_key(key: &str) -> PipelineResult<()> {
    let escapes = Path::new(key)
        .components()
        .any(|component| !matches!(component, Component::Normal(_)));

    if escapes {
        return Err(PipelineError::Validation(format!(
            "Object key {} is not a plain relative path",
            key
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(bucket: &str, key: &str) -> NotificationRecord {
        NotificationRecord {
            bucket: Some(bucket.to_string()),
            key: Some(key.to_string()),
            ..Default::default()
        }
    }

    fn derive(bucket: &str, key: &str) -> VideoTask {
        match VideoTask::from_record(&record(bucket, key), &ProcessingConfig::default()).unwrap() {
            TaskDecision::Process(task) => task,
            other => panic!("expected a task, got {:?}", other),
        }
    }

    #[test]
    fn test_derives_target_bucket_and_base_name() {
        let task = derive("videos-input", "clip.mp4");
        assert_eq!(task.source_bucket, "videos-input");
        assert_eq!(task.target_bucket, "videos-stage-1");
        assert_eq!(task.video_base_name, "clip");
    }

    #[test]
    fn test_decodes_url_encoded_key() {
        let task = derive("videos-input", "demo%20clip.mp4");
        assert_eq!(task.source_key, "demo clip.mp4");
        assert_eq!(task.video_base_name, "demo clip");

        let task = derive("videos-input", "demo+clip.mp4");
        assert_eq!(task.source_key, "demo clip.mp4");
    }

    #[test]
    fn test_extension_check_is_case_insensitive() {
        let task = derive("videos-input", "Holiday.MP4");
        assert_eq!(task.video_base_name, "Holiday");
    }

    #[test]
    fn test_base_name_strips_only_final_extension() {
        let task = derive("videos-input", "2024/archive.v2.mp4");
        assert_eq!(task.video_base_name, "2024/archive.v2");
    }

    #[test]
    fn test_non_video_keys_are_skipped() {
        let settings = ProcessingConfig::default();
        for key in ["notes.txt", "clip.mp4.bak", "clip", "folder.mp4/readme", "mp4"] {
            let decision = VideoTask::from_record(&record("videos-input", key), &settings).unwrap();
            assert!(
                matches!(decision, TaskDecision::Skip { .. }),
                "{} should be skipped",
                key
            );
        }
    }

    #[test]
    fn test_skip_precedes_bucket_validation() {
        let decision =
            VideoTask::from_record(&record("plain-bucket", "notes.txt"), &ProcessingConfig::default())
                .unwrap();
        assert!(matches!(decision, TaskDecision::Skip { .. }));
    }

    #[test]
    fn test_missing_fields_are_validation_errors() {
        let settings = ProcessingConfig::default();

        let missing_key = NotificationRecord {
            bucket: Some("videos-input".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            VideoTask::from_record(&missing_key, &settings),
            Err(PipelineError::Validation(_))
        ));

        assert!(matches!(
            VideoTask::from_record(&record("", "clip.mp4"), &settings),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn test_bucket_without_marker_is_rejected() {
        let result = VideoTask::from_record(&record("videos", "clip.mp4"), &ProcessingConfig::default());
        assert!(matches!(result, Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_only_first_marker_is_replaced() {
        assert_eq!(
            target_bucket_for("a-input-b-input", "-input", "-stage-1").unwrap(),
            "a-stage-1-b-input"
        );
    }

    #[test]
    fn test_traversal_keys_are_rejected() {
        let settings = ProcessingConfig::default();
        for key in ["../etc/clip.mp4", "/abs/clip.mp4", "a/../../clip.mp4", ".mp4", "dir/.mp4"] {
            assert!(
                VideoTask::from_record(&record("videos-input", key), &settings).is_err(),
                "{} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_records_from_s3_event() {
        let json = r#"{
            "Records": [{
                "eventVersion": "2.1",
                "eventSource": "aws:s3",
                "awsRegion": "us-east-1",
                "eventTime": "2024-01-15T10:30:00.000Z",
                "eventName": "ObjectCreated:Put",
                "userIdentity": { "principalId": "EXAMPLE" },
                "requestParameters": { "sourceIPAddress": "127.0.0.1" },
                "responseElements": {
                    "x-amz-request-id": "EXAMPLE123456789",
                    "x-amz-id-2": "EXAMPLE123/5678abcdefghijklambdaisawesome/mnopqrstuvwxyzABCDEFGH"
                },
                "s3": {
                    "s3SchemaVersion": "1.0",
                    "configurationId": "testConfigRule",
                    "bucket": {
                        "name": "videos-input",
                        "ownerIdentity": { "principalId": "EXAMPLE" },
                        "arn": "arn:aws:s3:::videos-input"
                    },
                    "object": {
                        "key": "demo%20clip.mp4",
                        "size": 1024,
                        "eTag": "0123456789abcdef0123456789abcdef",
                        "sequencer": "0A1B2C3D4E5F678901"
                    }
                }
            }]
        }"#;

        let event: S3Event = serde_json::from_str(json).unwrap();
        let records = records_from_event(&event);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bucket.as_deref(), Some("videos-input"));
        assert_eq!(records[0].key.as_deref(), Some("demo%20clip.mp4"));
        assert_eq!(records[0].event_name.as_deref(), Some("ObjectCreated:Put"));
        assert!(records[0].event_time.is_some());
    }
}
