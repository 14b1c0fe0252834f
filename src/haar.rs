//! Haar cascade detection through OpenCV's `CascadeClassifier`.
//!
//! The image is decoded with `imgcodecs::imread` as stored on disk and handed to
//! `detect_multi_scale` with OpenCV's default parameters (scale factor 1.1, three neighbours,
//! no size limits).

use crate::{BenchError, MultiScaleDetector, Rect};
use log::debug;
use opencv::{
    core::{self, Mat, Vector},
    imgcodecs,
    objdetect::CascadeClassifier,
    prelude::*,
};
use std::{cell::RefCell, fs::File, path::Path};

/// Decodes the image at `path` unchanged. OpenCV signals unreadable files with an empty
/// matrix, so those surface as [`BenchError::EmptyImage`].
pub fn read_image(path: impl AsRef<Path>) -> Result<Mat, BenchError> {
    let path = path.as_ref();
    let image = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_UNCHANGED)?;
    if image.cols() == 0 || image.rows() == 0 {
        return Err(BenchError::EmptyImage {
            width: image.cols().max(0) as u32,
            height: image.rows().max(0) as u32,
        });
    }
    debug!(
        "Read {} ({}x{}, {} channels)",
        path.display(),
        image.cols(),
        image.rows(),
        image.channels()
    );
    Ok(image)
}

pub struct HaarCascade {
    // Detection needs the classifier mutably; iterations only hold a shared context.
    classifier: RefCell<CascadeClassifier>,
}

impl HaarCascade {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BenchError> {
        let path = path.as_ref();
        // A missing file only yields an empty classifier from OpenCV.
        File::open(path)
            .map_err(|source| BenchError::CascadeIo { path: path.to_owned(), source })?;
        let classifier = CascadeClassifier::new(&path.to_string_lossy())?;
        if classifier.empty()? {
            return Err(BenchError::MalformedCascade(format!(
                "{} holds no usable cascade",
                path.display()
            )));
        }
        debug!("Loaded Haar cascade {}", path.display());
        Ok(Self { classifier: RefCell::new(classifier) })
    }
}

impl MultiScaleDetector for HaarCascade {
    fn detect_multi_scale(&self, image: &Mat) -> Result<Vec<Rect<i32>>, BenchError> {
        let mut objects = Vector::<core::Rect>::new();
        self.classifier.borrow_mut().detect_multi_scale_def(image, &mut objects)?;
        Ok(objects.iter().map(|r| Rect::with_size(r.x, r.y, r.width, r.height)).collect())
    }
}
