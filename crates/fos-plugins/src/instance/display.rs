//! Geometry and painting
//!
//! Layout hands the view a geometry snapshot whenever the element moves,
//! resizes or gets clipped differently. The plugin learns about it through
//! `setwindow`, which is normally deferred to the next paint.

use std::ffi::c_void;

use fos_npapi::*;
use tiny_skia::Pixmap;

use super::{LifecycleState, PluginStatus, PluginView};
use crate::context;
use crate::geometry::{IntRect, LayoutGeometry};
use crate::quirks::QuirkSet;
use crate::surface::{self, NativeSurface};

impl PluginView {
    pub fn frame_rect(&self) -> IntRect {
        self.frame_rect.get()
    }

    /// Element rect in native window coordinates.
    pub fn window_rect(&self) -> IntRect {
        self.window_rect.get()
    }

    /// Visible part of the element, relative to its top-left corner.
    pub fn clip_rect(&self) -> IntRect {
        self.clip_rect.get()
    }

    pub fn has_pending_geometry_change(&self) -> bool {
        self.has_pending_geometry_change.get()
    }

    /// Snapshot of the window record last handed to `setwindow`.
    pub fn np_window(&self) -> (i32, i32, u32, u32, NPRect) {
        // SAFETY: read outside any plugin call.
        let w = unsafe { &*self.np_window.get() };
        (w.x, w.y, w.width, w.height, w.clip_rect)
    }

    /// Apply a new layout snapshot.
    pub fn update_geometry(&self, layout: &LayoutGeometry) {
        let window_rect = layout.window_rect();
        let clip_rect = layout.local_clip_rect();
        self.frame_rect.set(layout.frame_rect);

        let old_window_rect = self.window_rect.replace(window_rect);
        let old_clip_rect = self.clip_rect.replace(clip_rect);
        if window_rect == old_window_rect && clip_rect == old_clip_rect {
            return;
        }

        let window = self.surface.borrow().as_ref().and_then(NativeSurface::window);
        if let Some(window) = &window {
            if !self.quirks.has(QuirkSet::DONT_CLIP_TO_ZERO_RECT_WHEN_SCROLLING) {
                // Hide drawing while the window moves.
                window.set_clip(IntRect::default());
            }
            window.set_geometry(window_rect);
            window.set_clip(clip_rect);
            if old_clip_rect.is_empty() != clip_rect.is_empty() {
                window.set_visible(!clip_rect.is_empty());
            }
        } else if !window_rect.same_size(&old_window_rect) {
            if let Some(buffer) = self.surface.borrow_mut().as_mut().and_then(NativeSurface::buffer_mut) {
                buffer.resize(window_rect.width.max(0) as u32, window_rect.height.max(0) as u32);
            }
        }

        self.has_pending_geometry_change.set(true);

        // Normally the next paint calls setwindow. Go now when the plugin
        // must stop drawing, or when a live window has already moved.
        let window_visible = window.as_ref().is_some_and(|w| w.is_visible());
        if !window_rect.is_empty() && (clip_rect.is_empty() || window_visible) {
            self.set_np_window_if_needed();
        }
    }

    /// Send pending geometry to the plugin.
    pub fn set_np_window_if_needed(&self) {
        if !self.is_started() || !self.has_pending_geometry_change.get() {
            return;
        }
        let Some(setwindow) = self.plugin_funcs.get().and_then(|f| f.setwindow) else {
            return;
        };

        let window_rect = self.window_rect.get();
        let clip_rect = self.clip_rect.get();
        let clip_empty = clip_rect.is_empty() || window_rect.is_empty();
        if clip_empty && self.sent_empty_clip.get() {
            return;
        }
        self.has_pending_geometry_change.set(false);
        self.sent_empty_clip.set(clip_empty);

        let handle = self
            .surface
            .borrow()
            .as_ref()
            .and_then(NativeSurface::window)
            .map_or(std::ptr::null_mut(), |w| w.handle());
        let windowed = self.is_windowed.get();
        let keep_size = windowed && self.quirks.has(QuirkSet::DONT_CALL_SET_WINDOW_MORE_THAN_ONCE) && self.set_window_called.get();

        // SAFETY: no plugin call is in progress that reads the window record.
        unsafe {
            let w = &mut *self.np_window.get();
            w.window = if windowed { handle } else { std::ptr::null_mut() };
            w.window_type = if windowed { NP_WINDOW_TYPE_WINDOW } else { NP_WINDOW_TYPE_DRAWABLE };
            w.x = window_rect.x;
            w.y = window_rect.y;
            if !keep_size {
                w.width = window_rect.width.max(0) as u32;
                w.height = window_rect.height.max(0) as u32;
            }
            w.clip_rect = if clip_empty { NPRect::ZERO } else { clip_rect.to_np_rect() };
        }

        let np_window = self.np_window.get();
        // The size a quirked module keeps is the first real one.
        if !window_rect.is_empty() {
            self.set_window_called.set(true);
        }
        let code = self.with_plugin_call(|_, npp| {
            // SAFETY: the window record lives as long as the view.
            unsafe { setwindow(npp, np_window) }
        });
        if let Some(code) = code.filter(|c| *c != NPERR_NO_ERROR) {
            tracing::debug!("setwindow for {} returned {}", self.mime_type(), code);
        }
    }

    /// Paint the element into `target`, which is in document coordinates.
    pub fn paint(&self, target: &mut Pixmap) {
        let frame_rect = self.frame_rect.get();

        // A module running a modal loop can pump host paints from inside a
        // call. Drawing then would re-enter it, so repaint on a later turn.
        if context::is_calling_plugin() {
            let weak = self.weak();
            self.scheduler.post(move || {
                if let Some(view) = weak.upgrade() {
                    view.frame.invalidate_rect(view.frame_rect());
                }
            });
            return;
        }
        if self.status.get() != PluginStatus::LoadedSuccessfully && self.init_done.get() {
            surface::paint_placeholder(target, frame_rect);
            return;
        }

        if self.state.get() == LifecycleState::Halted {
            if let Some(snapshot) = self.snapshot.borrow().as_ref() {
                surface::draw_snapshot(target, snapshot, frame_rect.location());
            }
            return;
        }

        if !self.is_started() {
            return;
        }
        self.set_np_window_if_needed();

        if self.is_windowed.get() || self.clip_rect.get().is_empty() {
            return;
        }
        self.paint_windowless(target);
    }

    fn paint_windowless(&self, target: &mut Pixmap) {
        let Some(mut pixels) = self.surface.borrow_mut().as_mut().and_then(NativeSurface::buffer_mut).and_then(|b| b.take())
        else {
            return;
        };

        let clip = self.clip_rect.get();
        let mut event = NPEvent::draw(NPDrawEvent {
            width: pixels.width(),
            height: pixels.height(),
            row_bytes: pixels.width() * 4,
            pixels: pixels.data_mut().as_mut_ptr() as *mut c_void,
            clip_left: clip.x,
            clip_top: clip.y,
            clip_right: clip.right(),
            clip_bottom: clip.bottom(),
        });
        self.dispatch_np_event(&mut event);

        surface::blit(target, &pixels, self.frame_rect.get().location(), clip);
        if let Some(buffer) = self.surface.borrow_mut().as_mut().and_then(NativeSurface::buffer_mut) {
            buffer.restore(pixels);
        }
    }
}
