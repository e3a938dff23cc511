//! Collaborator contracts (C5 §6): the three external services a job's
//! pipeline stages call out to. Each is a trait so the scheduler can run
//! against a fake in tests and a real integration in production, the way
//! the teacher's `LlmProvider` trait decouples turn execution from any one
//! model backend.

use async_trait::async_trait;
use sa_domain::Result;

#[derive(Debug, Clone)]
pub struct ScriptRequest {
    pub topic: String,
    pub style: Option<String>,
    pub target_duration_secs: u32,
}

#[derive(Debug, Clone)]
pub struct ScriptResponse {
    pub text: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

/// Synthesizes a script (and its metadata) for a topic. Network and
/// rate-limit failures are retryable; validation failures (empty topic,
/// disallowed style) are permanent.
#[async_trait]
pub trait ScriptSynthesizer: Send + Sync {
    async fn synthesize(&self, request: ScriptRequest) -> Result<ScriptResponse>;
}

#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    pub script_text: String,
    pub assets_dir: std::path::PathBuf,
    pub output_dir: std::path::PathBuf,
}

#[derive(Debug, Clone)]
pub struct AssemblyResponse {
    pub media_path: std::path::PathBuf,
    pub thumbnail_path: std::path::PathBuf,
    pub duration_seconds: u32,
}

/// Assembles a script plus an assets directory into a rendered media
/// file. Idempotent — running it twice on the same inputs produces the
/// same output and may overwrite in place.
#[async_trait]
pub trait MediaAssembler: Send + Sync {
    async fn assemble(&self, request: AssemblyRequest) -> Result<AssemblyResponse>;
}

#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub privacy: String,
    pub publish_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub account: String,
    pub media_path: std::path::PathBuf,
    pub thumbnail_path: std::path::PathBuf,
    pub metadata: UploadMetadata,
}

#[derive(Debug, Clone)]
pub struct UploadResponse {
    pub remote_id: String,
    pub url: String,
}

/// Publishes an assembled media file. Transport failures are retryable;
/// quota exhaustion and auth failures are not.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<UploadResponse>;
}

/// Placeholder collaborators wired in by default until a real
/// script/media/upload integration is configured. Every call settles
/// into a permanent `StageFailed` so a job reaches `Failed` immediately
/// rather than burning its retry budget on a collaborator that was
/// never plugged in.
pub struct UnconfiguredCollaborator {
    stage: &'static str,
}

impl UnconfiguredCollaborator {
    pub fn new(stage: &'static str) -> Self {
        Self { stage }
    }

    fn error(&self) -> sa_domain::Error {
        sa_domain::Error::StageFailed {
            stage: self.stage.into(),
            message: format!("no {} collaborator is configured", self.stage),
            retryable: false,
        }
    }
}

#[async_trait]
impl ScriptSynthesizer for UnconfiguredCollaborator {
    async fn synthesize(&self, _request: ScriptRequest) -> Result<ScriptResponse> {
        Err(self.error())
    }
}

#[async_trait]
impl MediaAssembler for UnconfiguredCollaborator {
    async fn assemble(&self, _request: AssemblyRequest) -> Result<AssemblyResponse> {
        Err(self.error())
    }
}

#[async_trait]
impl Uploader for UnconfiguredCollaborator {
    async fn upload(&self, _request: UploadRequest) -> Result<UploadResponse> {
        Err(self.error())
    }
}
