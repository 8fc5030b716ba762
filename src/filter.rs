use crate::Keypoint;
use float_ord::FloatOrd;

/// The most keypoints kept per frame when capping is enabled.
pub const MAX_KEYPOINTS: usize = 50;

/// The bounding box of the preceding vehicle in the KITTI sequence.
pub const VEHICLE_ROI: Roi = Roi {
    x: 535.0,
    y: 180.0,
    width: 180.0,
    height: 150.0,
};

/// An axis aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Roi {
    /// Containment includes the top and left edges but not the bottom and right ones.
    pub fn contains(&self, (x, y): (f32, f32)) -> bool {
        self.x <= x && x < self.x + self.width && self.y <= y && y < self.y + self.height
    }
}

/// Drops every keypoint outside of `roi`, keeping the order of the rest.
pub fn restrict_to_region(keypoints: &mut Vec<Keypoint>, roi: &Roi) {
    keypoints.retain(|kp| roi.contains(kp.point));
}

/// Keeps the first `count` keypoints.
///
/// Used for detectors that emit keypoints sorted by quality without a response.
pub fn keep_leading(keypoints: &mut Vec<Keypoint>, count: usize) {
    keypoints.truncate(count);
}

/// Keeps the `count` keypoints with the strongest response.
///
/// Ties keep their detection order, and the result never holds more than `count`.
pub fn retain_best(keypoints: &mut Vec<Keypoint>, count: usize) {
    if keypoints.len() <= count {
        return;
    }
    keypoints.sort_by_key(|kp| std::cmp::Reverse(FloatOrd(kp.response)));
    keypoints.truncate(count);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kp(x: f32, y: f32, response: f32) -> Keypoint {
        Keypoint::new(x, y, 4.0, response)
    }

    #[test]
    fn roi_edges() {
        assert!(VEHICLE_ROI.contains((535.0, 180.0)));
        assert!(VEHICLE_ROI.contains((714.9, 329.9)));
        assert!(!VEHICLE_ROI.contains((715.0, 200.0)));
        assert!(!VEHICLE_ROI.contains((600.0, 330.0)));
        assert!(!VEHICLE_ROI.contains((534.9, 200.0)));
    }

    #[test]
    fn restriction_keeps_order() {
        let mut keypoints = vec![
            kp(600.0, 200.0, 1.0),
            kp(10.0, 10.0, 2.0),
            kp(540.0, 300.0, 3.0),
        ];
        restrict_to_region(&mut keypoints, &VEHICLE_ROI);
        assert_eq!(keypoints, vec![kp(600.0, 200.0, 1.0), kp(540.0, 300.0, 3.0)]);
    }

    #[test]
    fn best_keeps_strongest_and_ties_in_order() {
        let mut keypoints = vec![
            kp(0.0, 0.0, 1.0),
            kp(1.0, 0.0, 5.0),
            kp(2.0, 0.0, 3.0),
            kp(3.0, 0.0, 5.0),
        ];
        retain_best(&mut keypoints, 2);
        assert_eq!(keypoints, vec![kp(1.0, 0.0, 5.0), kp(3.0, 0.0, 5.0)]);
    }

    #[test]
    fn leading_is_a_prefix() {
        let mut keypoints: Vec<_> = (0..60).map(|i| kp(i as f32, 0.0, 0.0)).collect();
        let expected = keypoints[..MAX_KEYPOINTS].to_vec();
        keep_leading(&mut keypoints, MAX_KEYPOINTS);
        assert_eq!(keypoints, expected);
    }
}
