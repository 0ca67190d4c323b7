use crate::config::ProcessingConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::event::{NotificationRecord, TaskDecision, VideoTask};
use crate::frame_extractor::{list_frames, FrameExtractor};
use crate::object_store::{BatchUploader, ObjectStore};
use crate::workspace::Workspace;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Result of handling one notification record
#[derive(Debug)]
pub enum Outcome {
    /// The object is not a video; nothing was fetched or run
    Skipped { key: String, reason: String },
    /// Frames were extracted and uploaded
    Succeeded {
        key: String,
        target_bucket: String,
        frames_uploaded: usize,
        summary: String,
    },
    /// The first fatal failure of the run, after cleanup
    Failed {
        key: Option<String>,
        cause: PipelineError,
    },
}

impl Outcome {
    /// Message for the invocation result, or the failure cause
    pub fn into_result(self) -> PipelineResult<String> {
        match self {
            Outcome::Skipped { reason, .. } => Ok(reason),
            Outcome::Succeeded { summary, .. } => Ok(summary),
            Outcome::Failed { cause, .. } => Err(cause),
        }
    }
}

/// Drives one video through download, extraction, upload and cleanup
pub struct Orchestrator {
    store: Arc<dyn ObjectStore>,
    uploader: BatchUploader,
    extractor: FrameExtractor,
    settings: ProcessingConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        extractor: FrameExtractor,
        settings: ProcessingConfig,
        upload_concurrency: usize,
    ) -> Self {
        Self {
            uploader: BatchUploader::new(store.clone(), upload_concurrency),
            store,
            extractor,
            settings,
        }
    }

    /// Handle every record of an event in order, stopping at the first failure
    pub async fn handle_all(
        &self,
        records: &[NotificationRecord],
        cancel: &CancellationToken,
    ) -> PipelineResult<String> {
        if records.is_empty() {
            return Err(PipelineError::Validation(
                "Event contains no records".to_string(),
            ));
        }

        let mut messages = Vec::with_capacity(records.len());
        for record in records {
            messages.push(self.handle(record, cancel).await.into_result()?);
        }

        Ok(messages.join("\n"))
    }

    /// Handle one notification record.
    ///
    /// The workspace is released before returning whether or not the
    /// download, extraction and upload stages succeeded.
    #[instrument(skip_all, fields(bucket = ?record.bucket, key = ?record.key))]
    pub async fn handle(&self, record: &NotificationRecord, cancel: &CancellationToken) -> Outcome {
        let task = match VideoTask::from_record(record, &self.settings) {
            Ok(TaskDecision::Process(task)) => task,
            Ok(TaskDecision::Skip { key, reason }) => {
                info!(key = %key, reason = %reason, "Skipping object");
                metrics::counter!("video.tasks.skipped").increment(1);
                return Outcome::Skipped { key, reason };
            }
            Err(cause) => return failed(record.key.clone(), cause),
        };

        info!(
            source_bucket = %task.source_bucket,
            source_key = %task.source_key,
            target_bucket = %task.target_bucket,
            "Processing video"
        );

        let workspace = match Workspace::acquire(&self.settings.scratch_root, &task).await {
            Ok(workspace) => workspace,
            Err(cause) => return failed(Some(task.source_key), cause),
        };

        let result = self.run_stages(&task, &workspace, cancel).await;

        let report = workspace.release();
        if !report.is_clean() {
            warn!(
                warnings = report.warnings.len(),
                "Workspace only partially reclaimed"
            );
        }

        match result {
            Ok(frames_uploaded) => {
                metrics::counter!("video.tasks.succeeded").increment(1);
                let summary = format!(
                    "Video processing completed successfully for {} ({} frames uploaded to {})",
                    task.source_key, frames_uploaded, task.target_bucket
                );
                info!(frames_uploaded, "{}", summary);

                Outcome::Succeeded {
                    key: task.source_key,
                    target_bucket: task.target_bucket,
                    frames_uploaded,
                    summary,
                }
            }
            Err(cause) => failed(Some(task.source_key), cause),
        }
    }

    /// Download, extract and upload; returns the number of frames uploaded
    async fn run_stages(
        &self,
        task: &VideoTask,
        workspace: &Workspace,
        cancel: &CancellationToken,
    ) -> PipelineResult<usize> {
        let size_bytes = tokio::select! {
            downloaded = self.store.download(&task.source_bucket, &task.source_key, workspace.input_path()) => {
                downloaded.map_err(|source| PipelineError::Transfer {
                    bucket: task.source_bucket.clone(),
                    key: task.source_key.clone(),
                    source,
                })?
            }
            _ = cancel.cancelled() => return Err(PipelineError::DeadlineExceeded { stage: "download" }),
        };
        info!(size_bytes, "Video downloaded successfully");

        self.extractor
            .extract(workspace.input_path(), workspace.output_dir(), cancel)
            .await?;

        let frames = list_frames(workspace.output_dir(), &task.video_base_name).await?;
        info!(frame_count = frames.len(), "Video processed successfully");

        let results = tokio::select! {
            results = self.uploader.upload_batch(&task.target_bucket, &frames) => results,
            _ = cancel.cancelled() => return Err(PipelineError::DeadlineExceeded { stage: "upload" }),
        };

        let mut uploaded = 0;
        let mut first_failure = None;
        for (key, result) in results {
            match result {
                Ok(()) => uploaded += 1,
                Err(source) => {
                    error!(key = %key, error = %source, "Frame upload failed");
                    if first_failure.is_none() {
                        first_failure = Some(PipelineError::Transfer {
                            bucket: task.target_bucket.clone(),
                            key,
                            source,
                        });
                    }
                }
            }
        }

        metrics::counter!("video.frames.uploaded").increment(uploaded as u64);

        match first_failure {
            Some(cause) => Err(cause),
            None => {
                info!(frames_uploaded = uploaded, "Frames uploaded successfully");
                Ok(uploaded)
            }
        }
    }
}

fn failed(key: Option<String>, cause: PipelineError) -> Outcome {
    error!(kind = cause.kind(), error = %cause, "Error processing video");
    metrics::counter!("video.tasks.failed").increment(1);
    Outcome::Failed { key, cause }
}
