//! Pixel-intensity-comparison cascade.
//!
//! Every internal node of every tree compares the intensities of two pixels whose positions
//! are stored relative to the window centre in 1/256ths of the window size, so a window is
//! classified with nothing but lookups and integer arithmetic. The binary parameter file
//! holds the tree depth, tree count and, per tree, the packed node offsets, the leaf
//! predictions and a rejection threshold.

use crate::{BenchError, ClusteringDetector};
use log::debug;
use serde::Serialize;
use std::{fs, path::Path};

/// Deepest tree accepted from a parameter file.
pub const MAX_TREE_DEPTH: u32 = 16;

const HEADER_LEN: usize = 8;

#[rustfmt::skip]
const COS_TABLE: [i64; 33] = [
    256, 251, 236, 212, 181, 142, 97, 49, 0, -49, -97, -142, -181, -212, -236, -251,
    -256, -251, -236, -212, -181, -142, -97, -49, 0, 49, 97, 142, 181, 212, 236, 251, 256,
];
#[rustfmt::skip]
const SIN_TABLE: [i64; 33] = [
    0, 49, 97, 142, 181, 212, 236, 251, 256, 251, 236, 212, 181, 142, 97, 49,
    0, -49, -97, -142, -181, -212, -236, -251, -256, -251, -236, -212, -181, -142, -97, -49, 0,
];

/// Window geometry of a cascade run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CascadeParams {
    /// Smallest window side in pixels.
    pub min_size: usize,
    /// Largest window side in pixels.
    pub max_size: usize,
    /// Window shift as a fraction of the window side.
    pub shift_factor: f64,
    /// Window growth between scales.
    pub scale_factor: f64,
}

/// Borrowed greyscale frame.
#[derive(Debug, Clone, Copy)]
pub struct ImageParams<'a> {
    pub pixels: &'a [u8],
    pub rows: usize,
    pub cols: usize,
    /// Row stride in pixels.
    pub dim: usize,
}

impl ImageParams<'_> {
    /// Intensity at (`row`, `col`), clamped to the frame.
    fn pixel(&self, row: i64, col: i64) -> u8 {
        let row = row.clamp(0, self.rows.saturating_sub(1) as i64) as usize;
        let col = col.clamp(0, self.cols.saturating_sub(1) as i64) as usize;
        self.pixels.get(row * self.dim + col).copied().unwrap_or(0)
    }
}

/// A square window centred on (`row`, `col`) with side `scale` and its score `q`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub row: i32,
    pub col: i32,
    pub scale: i32,
    pub q: f32,
}

impl Detection {
    /// Intersection over union of the two square windows.
    pub fn iou(&self, other: &Self) -> f64 {
        let (r1, c1, s1) = (f64::from(self.row), f64::from(self.col), f64::from(self.scale));
        let (r2, c2, s2) = (f64::from(other.row), f64::from(other.col), f64::from(other.scale));
        let overlap = |a: f64, b: f64| {
            ((a + s1 / 2.0).min(b + s2 / 2.0) - (a - s1 / 2.0).max(b - s2 / 2.0)).max(0.0)
        };
        let inter = overlap(r1, r2) * overlap(c1, c2);
        let union = s1 * s1 + s2 * s2 - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }
}

#[derive(Debug, Clone)]
pub struct PicoCascade {
    tree_depth: u32,
    tree_count: usize,
    /// Four signed offsets per node; each tree is padded with one unused leading node so node
    /// indices start at 1.
    codes: Vec<i8>,
    predictions: Vec<f32>,
    thresholds: Vec<f32>,
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], BenchError> {
        let end = self.pos + len;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(BenchError::TruncatedCascade { needed: end, available: self.data.len() })?;
        self.pos = end;
        Ok(bytes)
    }

    fn word(&mut self) -> Result<[u8; 4], BenchError> {
        let mut word = [0; 4];
        word.copy_from_slice(self.take(4)?);
        Ok(word)
    }

    fn u32(&mut self) -> Result<u32, BenchError> {
        self.word().map(u32::from_le_bytes)
    }

    fn f32(&mut self) -> Result<f32, BenchError> {
        self.word().map(f32::from_le_bytes)
    }
}

impl PicoCascade {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BenchError> {
        let path = path.as_ref();
        let packet = fs::read(path)
            .map_err(|source| BenchError::CascadeIo { path: path.to_owned(), source })?;
        debug!("Read pixel cascade {} ({} bytes)", path.display(), packet.len());
        Self::unpack(&packet)
    }

    /// Decodes the binary parameter file. The first eight bytes are a header and are skipped.
    pub fn unpack(packet: &[u8]) -> Result<Self, BenchError> {
        let mut reader = Reader { data: packet, pos: HEADER_LEN };
        let tree_depth = reader.u32()?;
        if tree_depth > MAX_TREE_DEPTH {
            return Err(BenchError::MalformedCascade(format!(
                "tree depth {tree_depth} is too deep"
            )));
        }
        let tree_count = reader.u32()? as usize;

        let leaves = 1usize << tree_depth;
        let code_len = 4 * leaves - 4;
        let tree_len = code_len + 4 * leaves + 4;
        let needed = tree_len
            .checked_mul(tree_count)
            .and_then(|len| len.checked_add(reader.pos))
            .ok_or_else(|| BenchError::MalformedCascade(format!("{tree_count} trees")))?;
        if packet.len() < needed {
            return Err(BenchError::TruncatedCascade { needed, available: packet.len() });
        }

        let mut codes = Vec::with_capacity(4 * leaves * tree_count);
        let mut predictions = Vec::with_capacity(leaves * tree_count);
        let mut thresholds = Vec::with_capacity(tree_count);
        for _ in 0..tree_count {
            codes.extend([0; 4]);
            codes.extend(reader.take(code_len)?.iter().map(|&b| b as i8));
            for _ in 0..leaves {
                predictions.push(reader.f32()?);
            }
            thresholds.push(reader.f32()?);
        }

        Ok(Self { tree_depth, tree_count, codes, predictions, thresholds })
    }

    pub fn tree_depth(&self) -> u32 {
        self.tree_depth
    }

    pub fn tree_count(&self) -> usize {
        self.tree_count
    }

    /// Runs every tree over a window; `bintest` compares the two pixels a node addresses.
    fn classify(&self, mut bintest: impl FnMut(&[i8]) -> bool) -> f32 {
        if self.tree_count == 0 {
            return 0.0;
        }
        let leaves = 1usize << self.tree_depth;
        let mut root = 0;
        let mut out = 0.0;
        for tree in 0..self.tree_count {
            let mut idx = 1;
            for _ in 0..self.tree_depth {
                let node = &self.codes[root + 4 * idx..root + 4 * idx + 4];
                idx = 2 * idx + usize::from(bintest(node));
            }
            out += self.predictions[leaves * tree + idx - leaves];
            if out <= self.thresholds[tree] {
                return -1.0;
            }
            root += 4 * leaves;
        }
        out - self.thresholds[self.tree_count - 1]
    }

    fn classify_region(&self, row: i64, col: i64, scale: i64, image: &ImageParams<'_>) -> f32 {
        let (r, c) = (row * 256, col * 256);
        self.classify(|node| {
            let at = |dr: i8, dc: i8| {
                image.pixel((r + i64::from(dr) * scale) >> 8, (c + i64::from(dc) * scale) >> 8)
            };
            at(node[0], node[1]) <= at(node[2], node[3])
        })
    }

    /// `angle` is a fraction of a full turn, quantised to 32 steps.
    fn classify_rotated_region(
        &self,
        row: i64,
        col: i64,
        scale: i64,
        angle: f64,
        image: &ImageParams<'_>,
    ) -> f32 {
        let step = ((32.0 * angle) as usize).min(32);
        let (qsin, qcos) = (scale * SIN_TABLE[step], scale * COS_TABLE[step]);
        self.classify(|node| {
            let at = |dr: i8, dc: i8| {
                let (dr, dc) = (i64::from(dr), i64::from(dc));
                image.pixel(
                    (65536 * row + qcos * dr - qsin * dc) >> 16,
                    (65536 * col + qsin * dr + qcos * dc) >> 16,
                )
            };
            at(node[0], node[1]) <= at(node[2], node[3])
        })
    }
}

impl ClusteringDetector for PicoCascade {
    fn run_cascade(
        &self,
        params: &CascadeParams,
        image: &ImageParams<'_>,
        angle: f64,
    ) -> Vec<Detection> {
        let mut detections = Vec::new();
        let mut scale = params.min_size;
        while scale <= params.max_size {
            let step = (params.shift_factor * scale as f64).max(1.0) as usize;
            let offset = scale / 2 + 1;
            if image.rows >= offset && image.cols >= offset {
                for row in (offset..=image.rows - offset).step_by(step) {
                    for col in (offset..=image.cols - offset).step_by(step) {
                        let (r, c, s) = (row as i64, col as i64, scale as i64);
                        let q = if angle > 0.0 {
                            self.classify_rotated_region(r, c, s, angle, image)
                        } else {
                            self.classify_region(r, c, s, image)
                        };
                        if q > 0.0 {
                            detections.push(Detection {
                                row: row as i32,
                                col: col as i32,
                                scale: scale as i32,
                                q,
                            });
                        }
                    }
                }
            }
            // Small windows with a small factor would otherwise never grow.
            scale = ((scale as f64 * params.scale_factor) as usize).max(scale + 1);
        }
        detections
    }

    fn cluster_detections(
        &self,
        mut detections: Vec<Detection>,
        iou_threshold: f64,
    ) -> Vec<Detection> {
        detections.sort_by(|a, b| b.q.total_cmp(&a.q));

        let mut assigned = vec![false; detections.len()];
        let mut clusters = Vec::new();
        for i in 0..detections.len() {
            if assigned[i] {
                continue;
            }
            let (mut row, mut col, mut scale, mut n) = (0i64, 0i64, 0i64, 0i64);
            let mut q = 0.0;
            for j in i..detections.len() {
                if detections[i].iou(&detections[j]) > iou_threshold {
                    assigned[j] = true;
                    row += i64::from(detections[j].row);
                    col += i64::from(detections[j].col);
                    scale += i64::from(detections[j].scale);
                    q += detections[j].q;
                    n += 1;
                }
            }
            if n > 0 {
                clusters.push(Detection {
                    row: (row / n) as i32,
                    col: (col / n) as i32,
                    scale: (scale / n) as i32,
                    q,
                });
            }
        }
        clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serialises trees of `(node codes, leaf predictions, threshold)` in the parameter file
    /// layout.
    fn pack(depth: u32, trees: &[(Vec<i8>, Vec<f32>, f32)]) -> Vec<u8> {
        let mut packet = vec![0u8; HEADER_LEN];
        packet.extend(depth.to_le_bytes());
        packet.extend((trees.len() as u32).to_le_bytes());
        for (codes, predictions, threshold) in trees {
            packet.extend(codes.iter().map(|&c| c as u8));
            for p in predictions {
                packet.extend(p.to_le_bytes());
            }
            packet.extend(threshold.to_le_bytes());
        }
        packet
    }

    /// One depth-1 tree firing when the pixel a quarter window above the centre is brighter
    /// than the one a quarter window below.
    fn bright_over_dark() -> Vec<u8> {
        pack(1, &[(vec![-64, 0, 64, 0], vec![1.0, -1.0], -0.5)])
    }

    /// Bright upper half, dark lower half, edge at row 30.
    fn split_frame() -> (Vec<u8>, usize, usize) {
        let (rows, cols) = (60, 60);
        let pixels = (0..rows * cols).map(|i| if i / cols < 30 { 200 } else { 0 }).collect();
        (pixels, rows, cols)
    }

    fn params() -> CascadeParams {
        CascadeParams { min_size: 20, max_size: 40, shift_factor: 0.2, scale_factor: 1.1 }
    }

    #[test]
    fn unpacks_layout() {
        let cascade = PicoCascade::unpack(&bright_over_dark()).unwrap();
        assert_eq!(cascade.tree_depth(), 1);
        assert_eq!(cascade.tree_count(), 1);
        assert_eq!(cascade.codes, vec![0, 0, 0, 0, -64, 0, 64, 0]);
        assert_eq!(cascade.predictions, vec![1.0, -1.0]);
        assert_eq!(cascade.thresholds, vec![-0.5]);
    }

    #[test]
    fn truncated_packets_are_rejected() {
        let mut packet = bright_over_dark();
        packet.pop();
        assert!(matches!(
            PicoCascade::unpack(&packet),
            Err(BenchError::TruncatedCascade { needed: 32, available: 31 })
        ));
        assert!(matches!(PicoCascade::unpack(&[0; 10]), Err(BenchError::TruncatedCascade { .. })));
    }

    #[test]
    fn huge_tree_count_is_truncated_not_allocated() {
        let mut packet = vec![0u8; HEADER_LEN];
        packet.extend(MAX_TREE_DEPTH.to_le_bytes());
        packet.extend(u32::MAX.to_le_bytes());
        assert!(matches!(
            PicoCascade::unpack(&packet),
            Err(BenchError::TruncatedCascade { available: 16, .. })
        ));
    }

    #[test]
    fn absurd_depth_is_rejected() {
        let packet = pack(40, &[]);
        assert!(matches!(PicoCascade::unpack(&packet), Err(BenchError::MalformedCascade(_))));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut packet = bright_over_dark();
        packet.extend([1, 2, 3]);
        assert!(PicoCascade::unpack(&packet).is_ok());
    }

    #[test]
    fn detections_straddle_the_edge() {
        let cascade = PicoCascade::unpack(&bright_over_dark()).unwrap();
        let (pixels, rows, cols) = split_frame();
        let image = ImageParams { pixels: &pixels, rows, cols, dim: cols };
        let detections = cascade.run_cascade(&params(), &image, 0.0);
        assert!(!detections.is_empty());
        for det in &detections {
            assert!((det.row - 30).abs() <= det.scale / 4 + 1, "{det:?}");
            assert!((det.q - 1.5).abs() < 1e-6);
        }
    }

    #[test]
    fn flat_frame_has_no_detections() {
        let cascade = PicoCascade::unpack(&bright_over_dark()).unwrap();
        let pixels = vec![90; 50 * 50];
        let image = ImageParams { pixels: &pixels, rows: 50, cols: 50, dim: 50 };
        assert!(cascade.run_cascade(&params(), &image, 0.0).is_empty());
    }

    #[test]
    fn half_turn_flips_the_comparison() {
        let cascade = PicoCascade::unpack(&bright_over_dark()).unwrap();
        let (pixels, rows, cols) = split_frame();
        let image = ImageParams { pixels: &pixels, rows, cols, dim: cols };
        // Upside down the cascade looks for dark over bright, which this frame lacks.
        assert!(cascade.run_cascade(&params(), &image, 0.5).is_empty());
        // A full turn is the upright cascade again.
        assert_eq!(
            cascade.run_cascade(&params(), &image, 1.0).len(),
            cascade.run_cascade(&params(), &image, 0.0).len()
        );
    }

    #[test]
    fn nan_factors_still_terminate() {
        let cascade = PicoCascade::unpack(&bright_over_dark()).unwrap();
        let (pixels, rows, cols) = split_frame();
        let image = ImageParams { pixels: &pixels, rows, cols, dim: cols };
        let params = CascadeParams {
            min_size: 20,
            max_size: 24,
            shift_factor: f64::NAN,
            scale_factor: f64::NAN,
        };
        // One-pixel steps, one-pixel growth.
        let detections = cascade.run_cascade(&params, &image, 0.0);
        assert!(!detections.is_empty());
        assert!(detections.iter().all(|det| (20..=24).contains(&det.scale)));
    }

    #[test]
    fn frame_smaller_than_window() {
        let cascade = PicoCascade::unpack(&bright_over_dark()).unwrap();
        let pixels = vec![0; 5 * 5];
        let image = ImageParams { pixels: &pixels, rows: 5, cols: 5, dim: 5 };
        assert!(cascade.run_cascade(&params(), &image, 0.0).is_empty());
    }

    #[test]
    fn clusters_overlapping_detections() {
        let cascade = PicoCascade::unpack(&bright_over_dark()).unwrap();
        let detections = vec![
            Detection { row: 30, col: 30, scale: 20, q: 1.0 },
            Detection { row: 100, col: 100, scale: 20, q: 1.0 },
            Detection { row: 31, col: 30, scale: 20, q: 2.0 },
        ];
        let clusters = cascade.cluster_detections(detections, 0.1);
        assert_eq!(
            clusters,
            vec![
                Detection { row: 30, col: 30, scale: 20, q: 3.0 },
                Detection { row: 100, col: 100, scale: 20, q: 1.0 },
            ]
        );
    }

    #[test]
    fn clustering_collapses_a_face_to_few_detections() {
        let cascade = PicoCascade::unpack(&bright_over_dark()).unwrap();
        let (pixels, rows, cols) = split_frame();
        let image = ImageParams { pixels: &pixels, rows, cols, dim: cols };
        let raw = cascade.run_cascade(&params(), &image, 0.0);
        let raw_len = raw.len();
        let clusters = cascade.cluster_detections(raw, 0.1);
        assert!(!clusters.is_empty());
        assert!(clusters.len() < raw_len);
    }

    #[test]
    fn iou_of_squares() {
        let a = Detection { row: 10, col: 10, scale: 10, q: 1.0 };
        let b = Detection { row: 10, col: 15, scale: 10, q: 1.0 };
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-9);
        assert_eq!(a.iou(&Detection { row: 50, ..a }), 0.0);
        // Different sizes overlap by the smaller square when centred together.
        let big = Detection { scale: 20, ..a };
        assert!((a.iou(&big) - 100.0 / 400.0).abs() < 1e-9);
    }
}
