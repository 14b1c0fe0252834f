//! The two benchmark cases: the Haar cascade detector and the pixel-comparison cascade with
//! clustering. Both read their inputs from fixed paths relative to the working directory.

use crate::{
    frame,
    haar::{self, HaarCascade},
    harness::Benchmark,
    pico::{CascadeParams, Detection, ImageParams, PicoCascade},
    BenchError, ClusteringDetector, MultiScaleDetector, Rect,
};
use image::DynamicImage;
use log::debug;
use opencv::core::Mat;
use std::path::{Path, PathBuf};

pub const SAMPLE_IMAGE_FILE: &str = "sample.jpg";
pub const HAAR_CASCADE_FILE: &str = "haarcascade_frontalface_default.xml";
pub const PICO_CASCADE_FILE: &str = "facefinder.bin";

/// Window geometry of the pixel-comparison case. Fixed so runs stay comparable.
pub const PICO_PARAMS: CascadeParams =
    CascadeParams { min_size: 20, max_size: 1000, shift_factor: 0.2, scale_factor: 1.1 };

/// Upright detection. Windows are kept when their score exceeds 0.
pub const DETECTION_ANGLE: f64 = 0.0;

/// Detections overlapping by more than this are merged into one.
pub const IOU_THRESHOLD: f64 = 0.1;

pub struct HaarContext<D> {
    pub image: Mat,
    pub detector: D,
}

impl<D: MultiScaleDetector> HaarContext<D> {
    /// One full multi-scale pass over the image.
    pub fn detect(&self) -> Result<Vec<Rect<i32>>, BenchError> {
        self.detector.detect_multi_scale(&self.image)
    }
}

pub struct HaarBenchmark {
    image_path: PathBuf,
    cascade_path: PathBuf,
}

impl HaarBenchmark {
    pub fn with_paths(image_path: impl AsRef<Path>, cascade_path: impl AsRef<Path>) -> Self {
        Self {
            image_path: image_path.as_ref().to_owned(),
            cascade_path: cascade_path.as_ref().to_owned(),
        }
    }
}

impl Default for HaarBenchmark {
    fn default() -> Self {
        Self::with_paths(SAMPLE_IMAGE_FILE, HAAR_CASCADE_FILE)
    }
}

impl Benchmark for HaarBenchmark {
    type Context = HaarContext<HaarCascade>;
    type Output = Vec<Rect<i32>>;

    fn name(&self) -> &str {
        "haar_cascade"
    }

    fn setup(&self) -> Result<Self::Context, BenchError> {
        // The image is validated before the classifier is touched.
        let image = haar::read_image(&self.image_path)?;
        let detector = HaarCascade::load(&self.cascade_path)?;
        Ok(HaarContext { image, detector })
    }

    fn iterate(&self, context: &Self::Context) -> Result<Self::Output, BenchError> {
        context.detect()
    }
}

pub struct PicoContext<D> {
    pub image: DynamicImage,
    /// Greyscale frame computed at setup. Iterations convert again from `image`.
    pub pixels: Vec<u8>,
    pub rows: usize,
    pub cols: usize,
    pub params: CascadeParams,
    pub detector: D,
}

impl<D: ClusteringDetector> PicoContext<D> {
    pub fn new(image: DynamicImage, detector: D) -> Self {
        let pixels = frame::rgb_to_grayscale(&image);
        let (rows, cols) = (image.height() as usize, image.width() as usize);
        Self { image, pixels, rows, cols, params: PICO_PARAMS, detector }
    }

    pub fn image_params(&self) -> ImageParams<'_> {
        ImageParams { pixels: &self.pixels, rows: self.rows, cols: self.cols, dim: self.cols }
    }

    /// Greyscale conversion, cascade run and clustering of this frame's raw detections.
    pub fn detect(&self) -> Vec<Detection> {
        let pixels = frame::rgb_to_grayscale(&self.image);
        let image = ImageParams { pixels: &pixels, ..self.image_params() };
        let detections = self.detector.run_cascade(&self.params, &image, DETECTION_ANGLE);
        self.detector.cluster_detections(detections, IOU_THRESHOLD)
    }
}

pub struct PicoBenchmark {
    image_path: PathBuf,
    cascade_path: PathBuf,
}

impl PicoBenchmark {
    pub fn with_paths(image_path: impl AsRef<Path>, cascade_path: impl AsRef<Path>) -> Self {
        Self {
            image_path: image_path.as_ref().to_owned(),
            cascade_path: cascade_path.as_ref().to_owned(),
        }
    }
}

impl Default for PicoBenchmark {
    fn default() -> Self {
        Self::with_paths(SAMPLE_IMAGE_FILE, PICO_CASCADE_FILE)
    }
}

impl Benchmark for PicoBenchmark {
    type Context = PicoContext<PicoCascade>;
    type Output = Vec<Detection>;

    fn name(&self) -> &str {
        "pico_cascade"
    }

    fn setup(&self) -> Result<Self::Context, BenchError> {
        let image = frame::load_image(&self.image_path)?;
        let detector = PicoCascade::load(&self.cascade_path)?;
        debug!(
            "{}: {} trees of depth {}",
            self.name(),
            detector.tree_count(),
            detector.tree_depth()
        );
        Ok(PicoContext::new(image, detector))
    }

    fn iterate(&self, context: &Self::Context) -> Result<Self::Output, BenchError> {
        Ok(context.detect())
    }
}
