//! Response rewriting: address substitution and audio transcoding.

pub mod address;
pub mod pipeline;
pub mod transcode;

pub use address::AddressRewriter;
pub use pipeline::{ProxyResponse, ResponseRewritePipeline, RewriteAction, RewriteError};
pub use transcode::{AudioTranscoder, ExternalTranscoder, TranscodeError};
