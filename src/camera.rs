use crate::types::Result;
use async_trait::async_trait;
use image::DynamicImage;
use log::{debug, info};

#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source has nothing more to give.
    async fn next_frame(&mut self) -> Result<Option<DynamicImage>>;
}

/// Opened once per session and dropped when the session ends.
#[async_trait]
pub trait Camera: Send + Sync {
    async fn open(&self) -> Result<Box<dyn FrameSource>>;
}

/// An IP camera exposing a JPEG snapshot URL.
pub struct SnapshotCamera {
    client: reqwest::Client,
    url: String,
}

impl SnapshotCamera {
    pub fn new(client: reqwest::Client, url: &str) -> SnapshotCamera {
        SnapshotCamera {
            client,
            url: url.to_string(),
        }
    }
}

struct SnapshotStream {
    client: reqwest::Client,
    url: String,
    frames: u64,
}

#[async_trait]
impl Camera for SnapshotCamera {
    async fn open(&self) -> Result<Box<dyn FrameSource>> {
        info!("Starting camera {}", self.url);
        Ok(Box::new(SnapshotStream {
            client: self.client.clone(),
            url: self.url.clone(),
            frames: 0,
        }))
    }
}

#[async_trait]
impl FrameSource for SnapshotStream {
    async fn next_frame(&mut self) -> Result<Option<DynamicImage>> {
        let bytes = self
            .client
            .get(self.url.as_str())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let frame = image::load_from_memory(&bytes)
            .map_err(|e| format_err!("Undecodable frame from {}: {}", self.url, e))?;
        self.frames += 1;
        debug!("Frame {} from {}", self.frames, self.url);
        Ok(Some(frame))
    }
}

impl Drop for SnapshotStream {
    fn drop(&mut self) {
        info!("Stopping camera {} after {} frames", self.url, self.frames);
    }
}
