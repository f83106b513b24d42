//! External loop-push process management.
//!
//! The waiting-room video reaches a room by pushing it into an RTMP media
//! bridge with ffmpeg, looping the source until the duration budget runs
//! out. One [`MediaPusher::push`] call covers a single process lifetime;
//! the injector owns the restart loop.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// How a single push process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The process ran until the remaining budget expired and was killed.
    BudgetExhausted,
    /// The process exited on its own before the budget expired. Treated as
    /// transient by the caller.
    ExitedEarly(Option<i32>),
}

#[async_trait]
pub trait MediaPusher: Send + Sync {
    /// Push `video_url` into `rtmp_target`, looping the source, for at most
    /// `budget`.
    async fn push(&self, video_url: &str, rtmp_target: &str, budget: Duration)
        -> Result<PushOutcome>;
}

pub fn ffmpeg_available() -> bool {
    which::which("ffmpeg").is_ok()
}

pub struct FfmpegPusher;

#[async_trait]
impl MediaPusher for FfmpegPusher {
    async fn push(
        &self,
        video_url: &str,
        rtmp_target: &str,
        budget: Duration,
    ) -> Result<PushOutcome> {
        let mut child = Command::new("ffmpeg")
            .args(["-re", "-stream_loop", "-1"])
            .args(["-i", video_url])
            .args(["-vf", "scale=1280:720"])
            .args(["-c:v", "libx264", "-preset", "veryfast"])
            .args(["-b:v", "1300k", "-maxrate", "1500k", "-bufsize", "2200k"])
            .args(["-c:a", "aac", "-b:a", "96k", "-ac", "2", "-ar", "22050"])
            .args(["-f", "flv", rtmp_target])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn ffmpeg")?;

        debug!("ffmpeg push started (pid {:?})", child.id());

        match timeout(budget, child.wait()).await {
            Ok(Ok(status)) => Ok(PushOutcome::ExitedEarly(status.code())),
            Ok(Err(e)) => Err(e).context("Failed waiting on ffmpeg"),
            Err(_) => {
                let _ = child.kill().await;
                Ok(PushOutcome::BudgetExhausted)
            }
        }
    }
}
