//! Whole-payload audio transcoding through an external encoder.
//!
//! The encoder receives the complete compressed payload on stdin and its
//! complete stdout becomes the new body. Nothing is streamed: both sides are
//! buffered in memory.
//!
//! # Failure policy
//!
//! Transcoding is experimental and favours availability. A spawn failure
//! yields an empty payload and a failed encode yields whatever the encoder had
//! written. Either way the response is still sent and the failure is only
//! logged.

use std::io;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::protocol_constants::DEFAULT_ENCODER_PROGRAM;

/// Arguments converting an OGG payload to 16-bit FLAC, keeping metadata.
const FLAC_ARGS: [&str; 12] = [
    "-y",
    "-i",
    "pipe:0",
    "-c:a",
    "flac",
    "-f",
    "flac",
    "-map_metadata",
    "0",
    "-sample_fmt",
    "s16",
    "pipe:1",
];

/// Converts one compressed audio payload into another.
///
/// The pipeline only depends on this trait, so an in-process codec can
/// replace the external encoder without touching it.
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    /// Transcodes `input`, returning the encoded payload.
    ///
    /// Never fails: on encoder failure the result is partial or empty.
    async fn transcode(&self, input: Bytes) -> Bytes;
}

/// Errors from a single encoder run. Logged, never propagated to clients.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The encoder process could not be started.
    #[error("failed to start encoder `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Waiting for the encoder failed.
    #[error("encoder I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The encoder exited unsuccessfully; `captured` holds its partial output.
    #[error("encoder exited with {status} after {} bytes", captured.len())]
    Exit { status: ExitStatus, captured: Bytes },
}

impl TranscodeError {
    /// Returns the bytes to forward despite the failure.
    pub fn into_partial_output(self) -> Bytes {
        match self {
            Self::Exit { captured, .. } => captured,
            Self::Spawn { .. } | Self::Io(_) => Bytes::new(),
        }
    }
}

/// Transcoder backed by an external program speaking stdin/stdout.
#[derive(Debug, Clone)]
pub struct ExternalTranscoder {
    program: String,
    args: Vec<String>,
}

impl ExternalTranscoder {
    /// Creates a transcoder running `program` with fixed `args`.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// OGG → FLAC through ffmpeg (or a compatible binary at `program`).
    pub fn ffmpeg(program: impl Into<String>) -> Self {
        Self::new(program, FLAC_ARGS)
    }

    /// Returns the program this transcoder runs.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Runs the encoder once over `input`.
    ///
    /// Stdin is fed from a separate task so a chatty encoder cannot block on a
    /// full stdout pipe while we are still writing.
    pub async fn run(&self, input: Bytes) -> Result<Bytes, TranscodeError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    log::debug!("[Transcode] Encoder closed stdin early: {}", e);
                }
                // Dropping stdin closes the pipe so the encoder sees EOF.
            });
        }

        let output = child.wait_with_output().await?;
        let captured = Bytes::from(output.stdout);
        if output.status.success() {
            Ok(captured)
        } else {
            Err(TranscodeError::Exit {
                status: output.status,
                captured,
            })
        }
    }
}

impl Default for ExternalTranscoder {
    fn default() -> Self {
        Self::ffmpeg(DEFAULT_ENCODER_PROGRAM)
    }
}

#[async_trait]
impl AudioTranscoder for ExternalTranscoder {
    async fn transcode(&self, input: Bytes) -> Bytes {
        let input_len = input.len();
        match self.run(input).await {
            Ok(output) => {
                log::debug!(
                    "[Transcode] Encoded {} bytes into {} bytes",
                    input_len,
                    output.len()
                );
                output
            }
            Err(e) => {
                log::warn!("[Transcode] {}; forwarding partial output", e);
                e.into_partial_output()
            }
        }
    }
}
