//! Plugin drawing surfaces
//!
//! A windowed plugin owns a native child window that draws itself. A
//! windowless plugin draws into a host-owned pixel buffer when asked, and the
//! host composites that buffer into the page.

use std::rc::Rc;

use tiny_skia::{Color, Paint, Pixmap, PixmapPaint, Rect, Transform};

use crate::geometry::{IntPoint, IntRect};
use crate::host::NativeWindow;

/// Placeholder fill (RGBA) for elements whose plugin could not load
pub const PLACEHOLDER_RGBA: [u8; 4] = [0xd0, 0xd0, 0xd0, 0xff];

/// Where a plugin instance draws.
pub enum NativeSurface {
    Windowed(Rc<dyn NativeWindow>),
    Windowless(WindowlessBuffer),
}

impl NativeSurface {
    pub fn is_windowed(&self) -> bool {
        matches!(self, NativeSurface::Windowed(_))
    }

    /// Shared handle, so messages can be dispatched without holding a borrow.
    pub fn window(&self) -> Option<Rc<dyn NativeWindow>> {
        match self {
            NativeSurface::Windowed(window) => Some(window.clone()),
            NativeSurface::Windowless(_) => None,
        }
    }

    pub fn buffer_mut(&mut self) -> Option<&mut WindowlessBuffer> {
        match self {
            NativeSurface::Windowed(_) => None,
            NativeSurface::Windowless(buffer) => Some(buffer),
        }
    }

    /// Capture what the plugin last drew.
    pub fn snapshot(&self) -> Option<Pixmap> {
        match self {
            NativeSurface::Windowed(window) => window.snapshot(),
            NativeSurface::Windowless(buffer) => buffer.pixmap.clone(),
        }
    }

    pub fn set_visible(&self, visible: bool) {
        if let NativeSurface::Windowed(window) = self {
            window.set_visible(visible);
        }
    }
}

impl std::fmt::Debug for NativeSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeSurface::Windowed(window) => write!(f, "Windowed({:p})", window.handle()),
            NativeSurface::Windowless(buffer) => write!(f, "Windowless({:?})", buffer.size()),
        }
    }
}

/// Pixel buffer a windowless plugin paints into.
#[derive(Debug, Default)]
pub struct WindowlessBuffer {
    pixmap: Option<Pixmap>,
}

impl WindowlessBuffer {
    /// Zero-sized buffers hold no pixels until resized.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixmap: Pixmap::new(width, height),
        }
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.pixmap.as_ref().map(|p| (p.width(), p.height()))
    }

    /// Reallocate for a new size. Contents are discarded.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.size() != Some((width, height)) {
            self.pixmap = Pixmap::new(width, height);
        }
    }

    /// Take the pixels out for the duration of a plugin paint call.
    pub fn take(&mut self) -> Option<Pixmap> {
        self.pixmap.take()
    }

    /// Return pixels taken with [`Self::take`], unless a resize replaced them.
    pub fn restore(&mut self, pixmap: Pixmap) {
        if self.pixmap.is_none() {
            self.pixmap = Some(pixmap);
        }
    }

    pub fn pixmap(&self) -> Option<&Pixmap> {
        self.pixmap.as_ref()
    }
}

/// Copy `source_clip` (in source coordinates) of `source` into `target`,
/// with the source's origin placed at `dest`.
pub fn blit(target: &mut Pixmap, source: &Pixmap, dest: IntPoint, source_clip: IntRect) {
    let bounds = IntRect::new(0, 0, source.width() as i32, source.height() as i32);
    let clip = source_clip.intersection(&bounds);
    if clip.is_empty() {
        return;
    }
    let Some(rect) = tiny_skia::IntRect::from_xywh(clip.x, clip.y, clip.width as u32, clip.height as u32) else {
        return;
    };
    let Some(region) = source.clone_rect(rect) else {
        return;
    };
    target.draw_pixmap(
        dest.x + clip.x,
        dest.y + clip.y,
        region.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
}

/// Draw `snapshot` with its top-left corner at `dest`.
pub fn draw_snapshot(target: &mut Pixmap, snapshot: &Pixmap, dest: IntPoint) {
    target.draw_pixmap(
        dest.x,
        dest.y,
        snapshot.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );
}

/// Fill the element box of a plugin that could not load.
pub fn paint_placeholder(target: &mut Pixmap, rect: IntRect) {
    if rect.is_empty() {
        return;
    }
    let Some(area) = Rect::from_xywh(rect.x as f32, rect.y as f32, rect.width as f32, rect.height as f32) else {
        return;
    };
    let mut paint = Paint::default();
    let [r, g, b, a] = PLACEHOLDER_RGBA;
    paint.set_color(Color::from_rgba8(r, g, b, a));
    target.fill_rect(area, &paint, Transform::identity(), None);
}
