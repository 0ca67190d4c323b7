use crate::config::DecoderConfig;
use crate::error::{PipelineError, PipelineResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Seconds between two sampled frames
pub const SAMPLE_INTERVAL_SECS: u32 = 10;

/// Upper bound on frames produced per video
pub const MAX_FRAMES: u32 = 10;

/// Output naming pattern handed to the decoder (`output-00.jpg` .. `output-09.jpg`)
pub const FRAME_PATTERN: &str = "output-%02d.jpg";

/// An extracted frame ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position of the frame in the sorted output listing
    pub sequence_index: usize,
    /// Location of the image in the workspace
    pub local_path: PathBuf,
    /// Staging store key: `{video_base_name}/{file_name}`
    pub destination_key: String,
}

/// Runs the external decoder with a fixed sampling configuration
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    program: PathBuf,
    extra_args: Vec<String>,
}

impl FrameExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn from_config(config: &DecoderConfig) -> Self {
        Self::new(config.path.clone()).with_extra_args(config.extra_args.clone())
    }

    /// Arguments placed ahead of the sampling parameters
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Full decoder argument list for one input file and output directory
    pub fn command_args(&self, input_path: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.extra_args.iter().map(OsString::from).collect();

        args.extend(
            ["-ss", "0", "-r", "1", "-i"]
                .into_iter()
                .map(OsString::from),
        );
        args.push(input_path.as_os_str().to_owned());
        args.extend(
            [
                "-vf".to_string(),
                format!("fps=1/{}", SAMPLE_INTERVAL_SECS),
                "-start_number".to_string(),
                "0".to_string(),
                "-vframes".to_string(),
                MAX_FRAMES.to_string(),
            ]
            .into_iter()
            .map(OsString::from),
        );
        args.push(output_dir.join(FRAME_PATTERN).into_os_string());
        args.push(OsString::from("-y"));

        args
    }

    /// Sample frames from `input_path` into `output_dir`.
    ///
    /// Only the exit status decides success: a short video that yields fewer
    /// than [`MAX_FRAMES`] images still succeeds.
    #[instrument(skip(self, cancel), fields(input = %input_path.display(), output_dir = %output_dir.display()))]
    pub async fn extract(
        &self,
        input_path: &Path,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        if cancel.is_cancelled() {
            return Err(PipelineError::DeadlineExceeded {
                stage: "frame extraction",
            });
        }

        let started = Instant::now();

        let child = Command::new(&self.program)
            .args(self.command_args(input_path, output_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::DecoderSpawn {
                program: self.program.clone(),
                source,
            })?;

        debug!(program = %self.program.display(), "Decoder started");

        // Dropping the wait future on cancellation drops the child, which kills it
        let output = tokio::select! {
            output = child.wait_with_output() => output.map_err(|source| PipelineError::DecoderSpawn {
                program: self.program.clone(),
                source,
            })?,
            _ = cancel.cancelled() => {
                warn!("Deadline reached, decoder killed");
                return Err(PipelineError::DeadlineExceeded { stage: "frame extraction" });
            }
        };

        metrics::histogram!("video.extract.duration_seconds")
            .record(started.elapsed().as_secs_f64());

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));

            return Err(PipelineError::ExtractionFailed {
                exit_code: output.status.code(),
                output: combined,
            });
        }

        info!(
            duration_ms = started.elapsed().as_millis() as u64,
            "Frames extracted"
        );

        Ok(())
    }
}

/// List the images in `output_dir` as frames keyed under `video_base_name`.
///
/// Frames are ordered by file name, which matches decoder numbering because
/// the sequence is zero-padded.
pub async fn list_frames(output_dir: &Path, video_base_name: &str) -> PipelineResult<Vec<Frame>> {
    let mut entries = tokio::fs::read_dir(output_dir)
        .await
        .map_err(|e| PipelineError::workspace(output_dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| PipelineError::workspace(output_dir, e))?
    {
        let path = entry.path();
        let is_jpeg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("jpg"))
            .unwrap_or(false);

        if !is_jpeg || !path.is_file() {
            continue;
        }

        if let Some(file_name) = path.file_name().and_then(|name| name.to_str()) {
            files.push((file_name.to_string(), path.clone()));
        }
    }

    files.sort();

    Ok(files
        .into_iter()
        .enumerate()
        .map(|(sequence_index, (file_name, local_path))| Frame {
            sequence_index,
            local_path,
            destination_key: format!("{}/{}", video_base_name, file_name),
        })
        .collect())
}
