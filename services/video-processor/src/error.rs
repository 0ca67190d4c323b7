//! Error taxonomy for the frame extraction pipeline.
//!
//! A skipped (non-video) object is not an error and never appears here; see
//! [`crate::orchestrator::Outcome`]. Cleanup problems are also absent: they are
//! logged as warnings by the workspace and never escalated.

use crate::object_store::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// A fatal failure of one pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Malformed or unacceptable notification record
    #[error("Invalid event: {0}")]
    Validation(String),

    /// Download or upload failed; recovery is left to platform redelivery
    #[error("Transfer of s3://{bucket}/{key} failed: {source}")]
    Transfer {
        bucket: String,
        key: String,
        #[source]
        source: StorageError,
    },

    /// The decoder could not be started at all
    #[error("Failed to spawn decoder {program}: {source}")]
    DecoderSpawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The decoder ran and exited unsuccessfully
    #[error("FFmpeg process failed with exit code: {}\nOutput: {output}", exit_code_display(.exit_code))]
    ExtractionFailed {
        exit_code: Option<i32>,
        output: String,
    },

    /// Local filesystem error while preparing the workspace or listing frames
    #[error("Workspace error at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The invocation deadline fired while a stage was still running
    #[error("Invocation deadline reached during {stage}")]
    DeadlineExceeded { stage: &'static str },
}

fn exit_code_display(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

impl PipelineError {
    pub(crate) fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Workspace {
            path: path.into(),
            source,
        }
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::Transfer { .. } => "transfer",
            PipelineError::DecoderSpawn { .. } => "decoder_spawn",
            PipelineError::ExtractionFailed { .. } => "extraction_failed",
            PipelineError::Workspace { .. } => "workspace",
            PipelineError::DeadlineExceeded { .. } => "deadline_exceeded",
        }
    }
}

/// Failure returned across the invocation boundary, wrapping the pipeline cause
#[derive(Error, Debug)]
#[error("Failed to process video: {source}")]
pub struct InvocationError {
    #[from]
    source: PipelineError,
}

impl InvocationError {
    pub fn cause(&self) -> &PipelineError {
        &self.source
    }
}

/// Result type for pipeline stages
pub type PipelineResult<T> = Result<T, PipelineError>;
