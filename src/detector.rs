//! Detector interfaces the benchmark cases drive.

use crate::{
    pico::{CascadeParams, Detection, ImageParams},
    BenchError, Rect,
};
use opencv::core::Mat;

/// A sliding-window detector that scans every scale in one call and returns grouped regions.
pub trait MultiScaleDetector {
    fn detect_multi_scale(&self, image: &Mat) -> Result<Vec<Rect<i32>>, BenchError>;
}

/// A detector whose raw window hits are merged in a separate clustering pass.
pub trait ClusteringDetector {
    /// Scans `image` at every scale described by `params`. `angle` is a fraction of a full turn.
    fn run_cascade(
        &self,
        params: &CascadeParams,
        image: &ImageParams<'_>,
        angle: f64,
    ) -> Vec<Detection>;

    /// Merges detections whose overlap exceeds `iou_threshold`.
    fn cluster_detections(&self, detections: Vec<Detection>, iou_threshold: f64)
        -> Vec<Detection>;
}
