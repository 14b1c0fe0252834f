#![warn(clippy::all, clippy::clone_on_ref_ptr, clippy::mod_module_files)]

//! Throughput comparison of two cascade face detectors on a single still image.
//!
//! [`haar::HaarCascade`] wraps OpenCV's Haar cascade classifier, [`pico::PicoCascade`] is a
//! pixel-intensity-comparison cascade unpacked from its binary parameter file. [`cases`] wires
//! each of them into a [`harness::Benchmark`] that does its one-time setup outside the timed
//! region.

pub mod cases;
pub mod detector;
pub mod frame;
pub mod haar;
pub mod harness;
pub mod pico;
pub mod rect;

use std::path::PathBuf;
use thiserror::Error;

pub use detector::{ClusteringDetector, MultiScaleDetector};
pub use rect::Rect;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Unable to read image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("Error reading cascade file {}: {source}", path.display())]
    CascadeIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
    #[error("Malformed cascade: {0}")]
    MalformedCascade(String),
    #[error("Truncated cascade: needed {needed} bytes, found {available}")]
    TruncatedCascade { needed: usize, available: usize },
}
