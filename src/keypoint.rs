use bitarray::BitArray;
use derive_more::Constructor;
use std::fmt;

/// A point of interest in an image.
///
/// Field meanings follow OpenCV conventions so that keypoints survive a round
/// trip through any backend unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Pixel coordinates, +x to the right and +y down from the top left corner.
    pub point: (f32, f32),
    /// Diameter of the meaningful neighbourhood, in pixels.
    pub size: f32,
    /// The magnitude of response from the detector.
    pub response: f32,
    /// Orientation in degrees, or -1 if not applicable.
    pub angle: f32,
    /// The level of scale space in which the keypoint was detected.
    pub octave: i32,
    /// Set by scale space detectors, -1 everywhere else.
    pub class_id: i32,
}

impl Keypoint {
    /// A keypoint without scale space information.
    pub fn new(x: f32, y: f32, size: f32, response: f32) -> Self {
        Self {
            point: (x, y),
            size,
            response,
            angle: -1.0,
            octave: 0,
            class_id: -1,
        }
    }

    pub fn x(&self) -> f32 {
        self.point.0
    }

    pub fn y(&self) -> f32 {
        self.point.1
    }
}

/// Binary descriptors are packed into 512 bits, the widest any backend emits.
///
/// Shorter descriptors are zero padded, which leaves Hamming distances intact.
pub type BinaryDescriptor = BitArray<64>;

/// One descriptor row per keypoint.
#[derive(Clone)]
pub enum Descriptors {
    Binary(Vec<BinaryDescriptor>),
    Float(Vec<Vec<f32>>),
}

impl Descriptors {
    pub fn len(&self) -> usize {
        match self {
            Self::Binary(rows) => rows.len(),
            Self::Float(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Binary(_) => "binary",
            Self::Float(_) => "float",
        }
    }

    /// Pads a row of packed bytes into a [`BinaryDescriptor`].
    ///
    /// Returns `None` if the row is wider than 512 bits.
    pub fn binary_row(bytes: &[u8]) -> Option<BinaryDescriptor> {
        if bytes.len() > 64 {
            return None;
        }
        let mut row = BitArray::zeros();
        row.bytes_mut()[..bytes.len()].copy_from_slice(bytes);
        Some(row)
    }
}

impl fmt::Debug for Descriptors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Descriptors::{}({} rows)", self.kind(), self.len())
    }
}

/// A pairing of a keypoint in the previous frame with one in the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Constructor)]
pub struct Correspondence {
    /// Index into the previous frame's keypoints.
    pub query: usize,
    /// Index into the current frame's keypoints.
    pub train: usize,
    pub distance: f32,
}

/// Borrowed keypoints together with their descriptors.
#[derive(Debug, Clone, Copy, Constructor)]
pub struct FeatureView<'a> {
    pub keypoints: &'a [Keypoint],
    pub descriptors: &'a Descriptors,
}
