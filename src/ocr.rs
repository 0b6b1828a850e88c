use crate::types::Result;
use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageOutputFormat};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[async_trait]
pub trait Ocr: Send + Sync {
    /// Raw text recognized in a preprocessed plate image.
    async fn recognize(&self, plate: &GrayImage) -> Result<String>;
}

/// Runs the tesseract CLI in single-line mode, piping a PNG on stdin.
pub struct TesseractOcr {
    program: String,
}

impl TesseractOcr {
    pub fn new(program: &str) -> TesseractOcr {
        TesseractOcr {
            program: program.to_string(),
        }
    }

    fn args() -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "--psm".to_string(),
            "7".to_string(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={}", WHITELIST),
        ]
    }
}

#[async_trait]
impl Ocr for TesseractOcr {
    async fn recognize(&self, plate: &GrayImage) -> Result<String> {
        let mut png = Vec::new();
        DynamicImage::ImageLuma8(plate.clone()).write_to(&mut png, ImageOutputFormat::Png)?;

        let mut child = Command::new(&self.program)
            .args(TesseractOcr::args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format_err!("Unable to run {}: {}", self.program, e))?;
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| format_err!("No stdin for {}", self.program))?;
            stdin.write_all(&png).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            bail!(
                "{} failed: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
