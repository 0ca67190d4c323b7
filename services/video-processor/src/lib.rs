//! Video Processor
//!
//! Event-driven frame extraction for uploaded videos. Each S3 object-created
//! notification on an input bucket (`*-input*`) is turned into a short series
//! of JPEG stills written to the matching staging bucket (`*-stage-1*`).
//!
//! ## Pipeline
//!
//! - **Validation**: decode the object key, skip anything that is not a video,
//!   derive the staging bucket and the video's base name
//! - **Workspace**: a scratch directory scoped to the video, reclaimed on every
//!   exit path
//! - **Extraction**: ffmpeg samples one frame every 10 seconds, at most 10 frames
//!   (`output-00.jpg` .. `output-09.jpg`)
//! - **Upload**: frames land under `{base name}/` in the staging bucket
//!
//! ```text
//! S3 (videos-input)          Scratch root               S3 (videos-stage-1)
//! ┌──────────────┐           ┌──────────────┐           ┌──────────────┐
//! │ clip.mp4     │──────────▶│ clip.mp4     │           │ clip/        │
//! └──────────────┘ download  │ clip/        │  upload   │  output-00   │
//!                            │  output-NN ──┼──────────▶│  ...         │
//!                            └──────────────┘           │  output-09   │
//!                                   ▲                   └──────────────┘
//!                                   │ ffmpeg
//!                            ┌──────────────┐
//!                            │ Frame        │
//!                            │ Extractor    │
//!                            └──────────────┘
//! ```
//!
//! Every run either returns a summary string or a single failure; retries are
//! left to the platform's at-least-once redelivery, which the pipeline
//! tolerates because all writes are overwrites.

pub mod config;
pub mod deadline;
pub mod error;
pub mod event;
pub mod frame_extractor;
pub mod object_store;
pub mod orchestrator;
pub mod workspace;

pub use config::Config;
pub use deadline::DeadlineGuard;
pub use error::{InvocationError, PipelineError, PipelineResult};
pub use event::{records_from_event, NotificationRecord, TaskDecision, VideoTask};
pub use frame_extractor::{Frame, FrameExtractor};
pub use object_store::{BatchUploader, ObjectStore, S3ObjectStore, StorageError};
pub use orchestrator::{Orchestrator, Outcome};
pub use workspace::{CleanupReport, Workspace};
