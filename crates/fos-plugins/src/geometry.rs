//! Integer Geometry
//!
//! Rectangles and points in device pixels, plus the clip computation used to
//! keep a plugin's window in step with its element.

use fos_npapi::NPRect;

/// Point in integer coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IntPoint {
    pub x: i32,
    pub y: i32,
}

impl IntPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in integer coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IntRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl IntRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn location(&self) -> IntPoint {
        IntPoint::new(self.x, self.y)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn same_size(&self, other: &IntRect) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Check if point is inside (right and bottom edges excluded)
    pub fn contains(&self, point: IntPoint) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    pub fn intersects(&self, other: &IntRect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Intersection; disjoint rectangles give an empty rect at the origin.
    pub fn intersection(&self, other: &IntRect) -> IntRect {
        if !self.intersects(other) {
            return IntRect::default();
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        IntRect::new(x, y, right - x, bottom - y)
    }

    pub fn translated(&self, dx: i32, dy: i32) -> IntRect {
        IntRect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Clamp into the `u16` rectangle the plugin ABI uses.
    pub fn to_np_rect(&self) -> NPRect {
        let clamp = |v: i32| v.clamp(0, u16::MAX as i32) as u16;
        NPRect {
            top: clamp(self.y),
            left: clamp(self.x),
            bottom: clamp(self.bottom()),
            right: clamp(self.right()),
        }
    }

    pub fn from_np_rect(rect: &NPRect) -> IntRect {
        IntRect::new(
            rect.left as i32,
            rect.top as i32,
            rect.right as i32 - rect.left as i32,
            rect.bottom as i32 - rect.top as i32,
        )
    }
}

/// Layout snapshot for one plugin element, in document coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutGeometry {
    /// Border box of the element
    pub frame_rect: IntRect,
    /// Offset from document coordinates to the native window's
    pub contents_to_window: IntPoint,
    /// Clip of every scrollable ancestor up to the root
    pub ancestor_clips: Vec<IntRect>,
    /// Visible part of the document
    pub viewport: IntRect,
}

impl LayoutGeometry {
    /// Window rect in native coordinates.
    pub fn window_rect(&self) -> IntRect {
        self.frame_rect
            .translated(self.contents_to_window.x, self.contents_to_window.y)
    }

    /// Visible part of the element relative to its own top-left corner.
    pub fn local_clip_rect(&self) -> IntRect {
        let mut clips = self.ancestor_clips.clone();
        clips.push(self.viewport);
        let clip = compute_clip_rect(self.frame_rect, &clips);
        if clip.is_empty() {
            return IntRect::default();
        }
        clip.translated(-self.frame_rect.x, -self.frame_rect.y)
    }
}

/// `rect` intersected with every clip, in their shared coordinate space.
pub fn compute_clip_rect(rect: IntRect, clips: &[IntRect]) -> IntRect {
    clips.iter().fold(rect, |acc, clip| acc.intersection(clip))
}
