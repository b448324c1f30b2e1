//! JSON configuration and report helpers for document detection.

use crate::{DocumentDetectError, DocumentDetector, DocumentDetectorParams, RectificationResult};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum DocumentIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Configuration for a single detect-and-rectify run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDetectConfig {
    pub image_path: String,
    /// Where to write the rectified (or passed-through) image.
    #[serde(default)]
    pub rectified_path: Option<String>,
    /// Where to write the JSON report.
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub params: DocumentDetectorParams,
}

impl DocumentDetectConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, DocumentIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), DocumentIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Resolve the output report path.
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("document_detect_report.json"))
    }

    /// Resolve the rectified image path.
    pub fn rectified_path(&self) -> PathBuf {
        self.rectified_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("rectified.png"))
    }

    pub fn build_detector(&self) -> DocumentDetector {
        DocumentDetector::new(self.params.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDetectReport {
    pub image_path: String,
    pub config_path: String,
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub detected: bool,
    /// Detected corners (TL, TR, BR, BL) in source pixels.
    #[serde(default)]
    pub corners: Option<[[f32; 2]; 4]>,
    #[serde(default)]
    pub suggested_corners: Option<[[f32; 2]; 4]>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub rectified_size: Option<[usize; 2]>,
    #[serde(default)]
    pub h_img_from_rect: Option<[[f64; 3]; 3]>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DocumentDetectReport {
    /// Base report describing the input image.
    pub fn new(
        cfg: &DocumentDetectConfig,
        config_path: &Path,
        width: usize,
        height: usize,
        channels: usize,
    ) -> Self {
        Self {
            image_path: cfg.image_path.clone(),
            config_path: config_path.to_string_lossy().into_owned(),
            width,
            height,
            channels,
            detected: false,
            corners: None,
            suggested_corners: None,
            confidence: None,
            rectified_size: None,
            h_img_from_rect: None,
            error: None,
        }
    }

    /// Populate report fields from a finished run.
    pub fn set_result(&mut self, res: &RectificationResult) {
        self.detected = res.detected();
        self.confidence = res.confidence();
        match res {
            RectificationResult::Detected { document, .. } => {
                self.corners = Some(document.quad.to_array());
                self.rectified_size = Some([document.image.width(), document.image.height()]);
                self.h_img_from_rect = Some(document.h_img_from_rect.to_array());
            }
            RectificationResult::NotDetected {
                suggested_corners, ..
            } => {
                self.suggested_corners = suggested_corners.map(|q| q.to_array());
            }
        }
        self.error = None;
    }

    /// Record a detection error.
    pub fn set_error(&mut self, err: &DocumentDetectError) {
        self.detected = false;
        self.error = Some(err.to_string());
    }

    /// Load a report from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, DocumentIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), DocumentIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
