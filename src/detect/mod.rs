mod yolo;

pub use yolo::YoloDetector;

use opencv::core::Mat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("failed to load model {path}: {source}")]
    Load { path: String, source: ort::Error },
    #[error("inference failed: {0}")]
    Inference(#[from] ort::Error),
    #[error("frame conversion failed: {0}")]
    Image(#[from] opencv::Error),
    #[error("unsupported model output: {0}")]
    ModelFormat(&'static str),
}

/// One detected object, in coordinates of the frame it was found in.
#[derive(Debug, Clone)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Inference seam in front of the concrete model backend.
pub trait Infer: Send {
    /// Detections above the backend's confidence threshold.
    fn infer(&mut self, frame: &Mat) -> Result<Vec<Detection>, DetectError>;
}
