//! Five-point face landmark model.
//!
//! Detectors emit a 68-point contour; alignment only needs five stable
//! anchors (eye centers, nose tip, mouth corners). The reduction follows the
//! standard 68-point indexing: eyes 36–41 / 42–47, mouth corners 48 / 54,
//! nose tip 30.

const LEFT_EYE_RANGE: std::ops::Range<usize> = 36..42;
const RIGHT_EYE_RANGE: std::ops::Range<usize> = 42..48;
const LEFT_MOUTH_INDEX: usize = 48;
const RIGHT_MOUTH_INDEX: usize = 54;
const NOSE_TIP_INDEX: usize = 30;

/// The five anchor points used for canonical alignment, in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceLandmarkSet {
    pub left_eye: (f64, f64),
    pub right_eye: (f64, f64),
    pub nose_tip: (f64, f64),
    pub left_mouth: (f64, f64),
    pub right_mouth: (f64, f64),
}

impl FaceLandmarkSet {
    /// Reduce a 68-point detector contour to the five anchors.
    ///
    /// Eye centers are centroids of the eye contour points. The nose tip is
    /// the designated index, degrading to the median point of the whole set
    /// when the array is too short to hold it. Returns `None` if the mouth
    /// corners are missing.
    pub fn from_points68(points: &[(f64, f64)]) -> Option<Self> {
        if points.len() <= RIGHT_MOUTH_INDEX {
            return None;
        }

        let left_eye = centroid(&points[LEFT_EYE_RANGE]);
        let right_eye = centroid(&points[RIGHT_EYE_RANGE]);

        let nose_tip = points
            .get(NOSE_TIP_INDEX)
            .copied()
            .unwrap_or_else(|| median_point(points));

        Some(Self {
            left_eye,
            right_eye,
            nose_tip,
            left_mouth: points[LEFT_MOUTH_INDEX],
            right_mouth: points[RIGHT_MOUTH_INDEX],
        })
    }

    /// The five points in canonical order:
    /// left eye, right eye, nose, left mouth, right mouth.
    pub fn as_array(&self) -> [(f64, f64); 5] {
        [
            self.left_eye,
            self.right_eye,
            self.nose_tip,
            self.left_mouth,
            self.right_mouth,
        ]
    }

    /// Translate every point by `(dx, dy)`, used when landmarks detected on
    /// a crop must be expressed in full-image coordinates or vice versa.
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        let shift = |(x, y): (f64, f64)| (x + dx, y + dy);
        Self {
            left_eye: shift(self.left_eye),
            right_eye: shift(self.right_eye),
            nose_tip: shift(self.nose_tip),
            left_mouth: shift(self.left_mouth),
            right_mouth: shift(self.right_mouth),
        }
    }
}

fn centroid(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
    (sx / n, sy / n)
}

/// Median point by x then y, used as the nose fallback.
fn median_point(points: &[(f64, f64)]) -> (f64, f64) {
    let mut sorted: Vec<(f64, f64)> = points.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted[sorted.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_points68() -> Vec<(f64, f64)> {
        // Flat contour everywhere except the regions we assert on.
        let mut pts = vec![(0.0, 0.0); 68];
        // Left eye contour centered on (40, 60)
        for (i, p) in pts[36..42].iter_mut().enumerate() {
            *p = (38.0 + i as f64 * 0.8, 60.0);
        }
        // Right eye contour centered on (90, 60)
        for (i, p) in pts[42..48].iter_mut().enumerate() {
            *p = (88.0 + i as f64 * 0.8, 60.0);
        }
        pts[30] = (65.0, 90.0);
        pts[48] = (50.0, 110.0);
        pts[54] = (80.0, 110.0);
        pts
    }

    #[test]
    fn test_reduction_picks_expected_anchors() {
        let set = FaceLandmarkSet::from_points68(&synthetic_points68()).unwrap();
        assert!((set.left_eye.0 - 40.0).abs() < 1e-9);
        assert!((set.left_eye.1 - 60.0).abs() < 1e-9);
        assert!((set.right_eye.0 - 90.0).abs() < 1e-9);
        assert_eq!(set.nose_tip, (65.0, 90.0));
        assert_eq!(set.left_mouth, (50.0, 110.0));
        assert_eq!(set.right_mouth, (80.0, 110.0));
    }

    #[test]
    fn test_too_few_points_rejected() {
        let pts = vec![(1.0, 1.0); 54];
        assert!(FaceLandmarkSet::from_points68(&pts).is_none());
    }

    #[test]
    fn test_nose_fallback_to_median() {
        let pts = vec![(5.0, 1.0), (1.0, 1.0), (3.0, 2.0)];
        assert_eq!(median_point(&pts), (3.0, 2.0));
    }

    #[test]
    fn test_translated() {
        let set = FaceLandmarkSet::from_points68(&synthetic_points68()).unwrap();
        let moved = set.translated(10.0, -5.0);
        assert!((moved.nose_tip.0 - 75.0).abs() < 1e-9);
        assert!((moved.nose_tip.1 - 85.0).abs() < 1e-9);
    }

    #[test]
    fn test_as_array_order() {
        let set = FaceLandmarkSet::from_points68(&synthetic_points68()).unwrap();
        let arr = set.as_array();
        assert_eq!(arr[2], set.nose_tip);
        assert_eq!(arr[4], set.right_mouth);
    }
}
