use crate::{Correspondence, Descriptors, Keypoint};
use image::GrayImage;
use std::collections::VecDeque;

/// The number of frames held in memory at the same time.
pub const WINDOW_CAPACITY: usize = 2;

/// One ingested image and everything derived from it.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: GrayImage,
    pub keypoints: Vec<Keypoint>,
    /// `None` until the describe stage has run.
    pub descriptors: Option<Descriptors>,
    /// Correspondences to the frame before this one.
    ///
    /// Only filled once both frames carry keypoints and descriptors.
    pub matches: Vec<Correspondence>,
}

impl Frame {
    pub fn new(image: GrayImage) -> Self {
        Self {
            image,
            keypoints: vec![],
            descriptors: None,
            matches: vec![],
        }
    }

    pub fn is_described(&self) -> bool {
        self.descriptors.is_some()
    }
}

/// How full a [`FrameWindow`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Empty,
    OneFrame,
    /// At least two frames are resident and new ones push the oldest out.
    Sliding,
}

/// A bounded sequence of recent frames where the oldest frame is evicted first.
#[derive(Debug, Clone)]
pub struct FrameWindow {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl Default for FrameWindow {
    fn default() -> Self {
        Self::new(WINDOW_CAPACITY)
    }
}

impl FrameWindow {
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "a frame window must hold at least one frame");
        Self {
            frames: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Appends `frame` as the newest frame, evicting the oldest ones beyond capacity.
    pub fn push(&mut self, frame: Frame) {
        self.frames.push_back(frame);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    pub fn newest(&self) -> Option<&Frame> {
        self.frames.back()
    }

    pub fn newest_mut(&mut self) -> Option<&mut Frame> {
        self.frames.back_mut()
    }

    pub fn second_newest(&self) -> Option<&Frame> {
        self.frames
            .len()
            .checked_sub(2)
            .and_then(|ix| self.frames.get(ix))
    }

    /// The second newest and the newest frame, in push order.
    pub fn pair(&self) -> Option<(&Frame, &Frame)> {
        Some((self.second_newest()?, self.newest()?))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> WindowState {
        match self.frames.len() {
            0 => WindowState::Empty,
            1 => WindowState::OneFrame,
            _ => WindowState::Sliding,
        }
    }

    /// Iterates from the oldest to the newest frame.
    pub fn iter(&self) -> impl Iterator<Item = &Frame> + '_ {
        self.frames.iter()
    }
}
