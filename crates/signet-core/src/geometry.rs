//! Face alignment via 4-DOF similarity transform.
//!
//! Estimates scale + rotation + translation from detected landmarks to a
//! canonical five-point layout, then warps the face into a square crop via
//! inverse sampling. All solver arithmetic is f64.

use crate::detector::{DetectionResult, FaceDetector};
use crate::landmarks::FaceLandmarkSet;
use crate::raster::Raster;
use thiserror::Error;

/// Canonical five-point layout for a 112×112 output:
/// left eye, right eye, nose, left mouth, right mouth.
const REFERENCE_LANDMARKS_112: [(f64, f64); 5] = [
    (31.0, 46.0),
    (81.0, 46.0),
    (56.0, 76.0),
    (41.0, 96.0),
    (71.0, 96.0),
];

/// Below this the source points carry no usable spread.
const DEGENERATE_VARIANCE: f64 = 1e-12;

#[derive(Error, Debug)]
pub enum AlignmentError {
    #[error("landmark set is degenerate and cannot define a similarity transform")]
    DegenerateLandmarks,
    #[error("image decode failed: {0}")]
    DecodeFailure(String),
}

/// Side length of the aligned output crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSize {
    Px112,
    Px224,
}

impl OutputSize {
    pub fn side(self) -> u32 {
        match self {
            OutputSize::Px112 => 112,
            OutputSize::Px224 => 224,
        }
    }

    /// The canonical layout at this size (224 is the 2× variant of 112).
    fn reference_layout(self) -> [(f64, f64); 5] {
        match self {
            OutputSize::Px112 => REFERENCE_LANDMARKS_112,
            OutputSize::Px224 => REFERENCE_LANDMARKS_112.map(|(x, y)| (x * 2.0, y * 2.0)),
        }
    }
}

/// A 2×3 affine of the form rotation + uniform scale + translation (no shear):
///
/// ```text
/// | m0  m1  m2 |   | s·cosθ  -s·sinθ  tx |
/// | m3  m4  m5 | = | s·sinθ   s·cosθ  ty |
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub scale: f64,
    pub rotation: f64,
    pub matrix: [f64; 6],
}

impl SimilarityTransform {
    /// Map a source point into destination space.
    pub fn apply(&self, (x, y): (f64, f64)) -> (f64, f64) {
        let m = &self.matrix;
        (m[0] * x + m[1] * y + m[2], m[3] * x + m[4] * y + m[5])
    }

    /// Inverse transform, mapping destination space back to source.
    /// `None` when the linear part is singular; transforms produced by
    /// [`compute_similarity_transform`] always invert.
    pub fn inverse(&self) -> Option<SimilarityTransform> {
        let m = &self.matrix;
        let det = m[0] * m[4] - m[1] * m[3];
        if det.abs() < DEGENERATE_VARIANCE {
            return None;
        }
        let i00 = m[4] / det;
        let i01 = -m[1] / det;
        let i10 = -m[3] / det;
        let i11 = m[0] / det;
        Some(SimilarityTransform {
            scale: 1.0 / self.scale,
            rotation: -self.rotation,
            matrix: [
                i00,
                i01,
                -(i00 * m[2] + i01 * m[5]),
                i10,
                i11,
                -(i10 * m[2] + i11 * m[5]),
            ],
        })
    }
}

/// Closed-form Procrustes solve: the similarity transform mapping `src`
/// onto `dst` in the least-squares sense.
///
/// Requires equal cardinality and at least two points. All-coincident source
/// points (zero variance) are rejected; the solve would otherwise divide by
/// zero and propagate NaN through every downstream pixel.
pub fn compute_similarity_transform(
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
) -> Result<SimilarityTransform, AlignmentError> {
    if src.len() < 2 || src.len() != dst.len() {
        return Err(AlignmentError::DegenerateLandmarks);
    }

    let n = src.len() as f64;
    let (scx, scy) = src
        .iter()
        .fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
    let (dcx, dcy) = dst
        .iter()
        .fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
    let (scx, scy) = (scx / n, scy / n);
    let (dcx, dcy) = (dcx / n, dcy / n);

    let mut src_var = 0.0;
    let mut cov00 = 0.0;
    let mut cov01 = 0.0;
    let mut cov10 = 0.0;
    let mut cov11 = 0.0;

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let (sx, sy) = (sx - scx, sy - scy);
        let (dx, dy) = (dx - dcx, dy - dcy);
        src_var += sx * sx + sy * sy;
        cov00 += dx * sx;
        cov01 += dx * sy;
        cov10 += dy * sx;
        cov11 += dy * sy;
    }

    if src_var < DEGENERATE_VARIANCE {
        return Err(AlignmentError::DegenerateLandmarks);
    }

    let a = cov00 + cov11;
    let b = cov10 - cov01;
    let norm = (a * a + b * b).sqrt();
    let scale = norm / src_var;

    if !(scale.is_finite() && scale > 0.0) {
        return Err(AlignmentError::DegenerateLandmarks);
    }

    let cos = a / norm;
    let sin = b / norm;
    let rotation = b.atan2(a);

    let m0 = scale * cos;
    let m1 = -scale * sin;
    let m3 = scale * sin;
    let m4 = scale * cos;
    // Translation places the transformed source centroid on the destination centroid.
    let tx = dcx - (m0 * scx + m1 * scy);
    let ty = dcy - (m3 * scx + m4 * scy);

    Ok(SimilarityTransform {
        scale,
        rotation,
        matrix: [m0, m1, tx, m3, m4, ty],
    })
}

/// Warp the source image through the inverse of `transform` into an
/// `out_size × out_size` canvas (inverse sampling, so the output has no
/// holes). Pixels mapping outside the source are black.
pub fn warp_affine(image: &Raster, transform: &SimilarityTransform, out_size: u32) -> Raster {
    let mut out = Raster::new(out_size, out_size);
    let Some(inv) = transform.inverse() else {
        // Guarded at construction; unreachable for transforms produced by
        // compute_similarity_transform.
        return out;
    };

    for oy in 0..out_size {
        for ox in 0..out_size {
            let (sx, sy) = inv.apply((ox as f64, oy as f64));
            let rgb = image.sample(sx, sy);
            out.put_pixel(
                ox,
                oy,
                [
                    rgb[0].round().clamp(0.0, 255.0) as u8,
                    rgb[1].round().clamp(0.0, 255.0) as u8,
                    rgb[2].round().clamp(0.0, 255.0) as u8,
                ],
            );
        }
    }
    out
}

/// An aligned face crop together with its provenance: the transform that
/// produced it and, when known, the capture sequence number of the frame it
/// came from.
#[derive(Debug, Clone)]
pub struct AlignedFace {
    pub raster: Raster,
    pub transform: SimilarityTransform,
    pub source_frame_id: Option<u64>,
}

impl AlignedFace {
    /// Record which captured frame this crop was taken from.
    pub fn with_source_frame(mut self, id: u64) -> Self {
        self.source_frame_id = Some(id);
        self
    }
}

/// Align a face to the canonical layout at the requested output size.
pub fn align_face(
    image: &Raster,
    landmarks: &FaceLandmarkSet,
    size: OutputSize,
) -> Result<AlignedFace, AlignmentError> {
    let transform =
        compute_similarity_transform(&landmarks.as_array(), &size.reference_layout())?;
    let raster = warp_affine(image, &transform, size.side());
    Ok(AlignedFace {
        raster,
        transform,
        source_frame_id: None,
    })
}

/// Decode encoded image bytes for alignment, mapping codec failures into
/// the alignment error taxonomy.
pub fn decode_for_alignment(bytes: &[u8]) -> Result<Raster, AlignmentError> {
    Raster::decode(bytes).map_err(|e| AlignmentError::DecodeFailure(e.to_string()))
}

/// Align a face carried as encoded image bytes.
///
/// Decode failures degrade to returning the input unchanged; alignment is
/// best-effort and must never hard-block the verification flow. A degenerate
/// landmark set still surfaces as an error.
pub fn align_face_bytes(
    bytes: &[u8],
    landmarks: &FaceLandmarkSet,
    size: OutputSize,
) -> Result<Vec<u8>, AlignmentError> {
    let image = match decode_for_alignment(bytes) {
        Ok(img) => img,
        Err(e) => {
            tracing::warn!(error = %e, "alignment input decode failed; passing image through");
            return Ok(bytes.to_vec());
        }
    };

    let aligned = align_face(&image, landmarks, size)?;
    match aligned.raster.to_encoded_bytes() {
        Ok(out) => Ok(out),
        Err(e) => {
            tracing::warn!(error = %e, "aligned face encode failed; passing image through");
            Ok(bytes.to_vec())
        }
    }
}

/// Two-pass refinement: crop to the padded detection box, re-run the
/// detector on the crop, and align on the refined landmarks. Falls back to
/// the unaligned crop when the second pass finds nothing, since the initial
/// framing was already face-dominated.
pub fn extract_aligned_face(
    image: &Raster,
    detection: &DetectionResult,
    padding: f64,
    size: OutputSize,
    min_confidence: f64,
    detector: &mut dyn FaceDetector,
) -> Result<Raster, AlignmentError> {
    let bb = &detection.bounding_box;
    let pad_x = bb.width * padding;
    let pad_y = bb.height * padding;

    let crop_x = (bb.x - pad_x).floor() as i64;
    let crop_y = (bb.y - pad_y).floor() as i64;
    let crop = image.crop(
        crop_x,
        crop_y,
        (bb.width + 2.0 * pad_x).ceil() as u32,
        (bb.height + 2.0 * pad_y).ceil() as u32,
    );
    if crop.is_empty() {
        return Err(AlignmentError::DegenerateLandmarks);
    }

    let refined = match detector.detect(&crop, min_confidence) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "refinement detection failed; using unaligned crop");
            None
        }
    };

    match refined.and_then(|d| FaceLandmarkSet::from_points68(&d.landmarks68)) {
        Some(landmarks) => {
            // Refined landmarks are in crop coordinates; express them in
            // full-image space so the warp samples the original frame.
            let origin_x = crop_x.clamp(0, image.width() as i64) as f64;
            let origin_y = crop_y.clamp(0, image.height() as i64) as f64;
            let full = landmarks.translated(origin_x, origin_y);
            align_face(image, &full, size).map(|a| a.raster)
        }
        None => {
            tracing::debug!("no refined detection on crop; returning unaligned crop");
            Ok(crop)
        }
    }
}

/// Roll angle of the eye line, `atan2(Δy, Δx)` between eye centers.
/// Cheap rotation-only correction when a full similarity solve is overkill.
pub fn calculate_eye_angle(landmarks: &FaceLandmarkSet) -> f64 {
    let (lx, ly) = landmarks.left_eye;
    let (rx, ry) = landmarks.right_eye;
    (ry - ly).atan2(rx - lx)
}
