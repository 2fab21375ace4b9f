//! Plugin instance behaviour against an in-process fake plugin

mod common;

use std::cell::RefCell;
use std::ffi::{CStr, c_void};
use std::rc::Rc;
use std::time::Duration;

use common::*;
use fos_npapi::*;
use fos_plugins::events::{MouseButton, MouseEventType, MouseInput};
use fos_plugins::request::Method;
use fos_plugins::throttler::{NativeMessage, WM_USER};
use fos_plugins::{
    IntPoint, IntRect, LayoutGeometry, LifecycleState, ModuleError, NotifyData, NpError, PluginInputEvent,
    PluginStatus, PluginView, ScriptValue,
};
use tiny_skia::Pixmap;
use url::Url;

fn flash() -> PluginBehavior {
    PluginBehavior {
        mime_description: c"application/x-shockwave-flash:swf:Shockwave Flash",
        name: c"Shockwave Flash",
        description: c"Shockwave Flash 10.1 r53",
        ..Default::default()
    }
}

fn windowless() -> PluginBehavior {
    PluginBehavior {
        windowless: true,
        ..Default::default()
    }
}

fn visible_at(x: i32, y: i32, width: i32, height: i32) -> LayoutGeometry {
    LayoutGeometry {
        frame_rect: IntRect::new(x, y, width, height),
        contents_to_window: IntPoint::default(),
        ancestor_clips: Vec::new(),
        viewport: IntRect::new(0, 0, 800, 600),
    }
}

fn mouse_down(x: i32, y: i32) -> PluginInputEvent {
    PluginInputEvent::Mouse(MouseInput::new(MouseEventType::MouseDown, MouseButton::Primary, IntPoint::new(x, y)))
}

// ============================================================================
// Module lifetime
// ============================================================================

#[test]
fn test_module_reads_capabilities() {
    let h = Harness::new();
    let module = h.module();
    assert_eq!(module.name(), "Fake Plugin");
    assert_eq!(module.version().major, 1);
    assert_eq!(module.version().minor, 2);
    assert!(module.handles_mime("application/x-fake"));
    assert_eq!(module.mime_for_extension("fake"), Some("application/x-fake"));
    assert!(!module.is_loaded());
    assert!(module.quirks().is_empty());
}

#[test]
fn test_load_count_and_deferred_teardown() {
    let h = Harness::new();
    let module = h.module();

    module.load().unwrap();
    module.load().unwrap();
    assert_eq!(module.load_count(), 2);
    assert_eq!(count_calls("initialize"), 1);

    module.unload();
    assert!(module.is_loaded());
    assert!(!module.is_teardown_pending());

    module.unload();
    assert!(module.is_loaded());
    assert!(module.is_teardown_pending());

    // A reload before the teardown turn keeps the binding alive.
    module.load().unwrap();
    assert!(!module.is_teardown_pending());
    h.run();
    assert!(module.is_loaded());
    assert_eq!(count_calls("shutdown"), 0);

    module.unload();
    h.run();
    assert!(!module.is_loaded());
    assert_eq!(count_calls("shutdown"), 1);
    assert_eq!(count_calls("initialize"), 1);
}

#[test]
fn test_newer_table_major_is_rejected() {
    let h = Harness::with_behavior(PluginBehavior {
        table_version: 1 << 8,
        ..Default::default()
    });
    let module = h.module();
    assert!(matches!(module.load(), Err(ModuleError::IncompatibleVersion { major: 1 })));
    assert!(!module.is_loaded());
    assert_eq!(count_calls("shutdown"), 1);
}

// ============================================================================
// Instance lifecycle
// ============================================================================

#[test]
fn test_start_is_idempotent() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    assert_eq!(view.state(), LifecycleState::Started);
    assert_eq!(view.status(), PluginStatus::LoadedSuccessfully);

    assert!(view.start());
    assert_eq!(count_calls("new mode"), 1);
}

#[test]
fn test_params_and_mode_reach_plugin() {
    let h = Harness::new();
    let module = h.module();
    let mut params = h.params(&module);
    params.params = vec![
        ("src".to_string(), "movie.fake".to_string()),
        ("pluginspage".to_string(), "http://example.com/get".to_string()),
    ];
    let view = PluginView::new(params);
    assert!(view.init());

    assert_eq!(view.mode(), NP_EMBED);
    assert_eq!(view.plugins_page(), Some("http://example.com/get"));
    assert!(calls().contains(&"new mode=1 args=src,pluginspage".to_string()));
}

#[test]
fn test_missing_module_reports_cannot_find() {
    let h = Harness::new();
    let params = fos_plugins::InstanceParams::new(h.frame.clone(), None, h.scheduler.clone(), "application/x-none");
    let view = PluginView::new(params);
    assert!(!view.init());
    assert_eq!(view.status(), PluginStatus::CannotFindPlugin);
}

#[test]
fn test_disabled_plugins_do_not_load() {
    let h = Harness::new();
    let module = h.module();
    let mut params = h.params(&module);
    params.settings.enabled = false;
    let view = PluginView::new(params);

    assert!(!view.init());
    assert_eq!(view.status(), PluginStatus::CannotLoad);
    assert!(!view.is_started());
    assert!(!module.is_loaded());
    assert_eq!(count_calls("initialize"), 0);
    assert_eq!(count_calls("new mode"), 0);
}

#[test]
fn test_start_waits_for_media_permission() {
    let h = Harness::new();
    h.frame.can_start_media.set(false);
    let (_module, view) = h.started_view();

    assert_eq!(view.state(), LifecycleState::WaitingToStart);
    assert_eq!(count_calls("new mode"), 0);

    h.frame.fire_media_listeners();
    assert_eq!(view.state(), LifecycleState::Started);
    assert_eq!(count_calls("new mode"), 1);
}

#[test]
fn test_stop_closes_open_streams() {
    let h = Harness::new();
    let module = h.module();
    let mut params = h.params(&module);
    params.url = Some(Url::parse("http://example.com/movie.fake").unwrap());
    let view = PluginView::new(params);
    assert!(view.init());
    h.run();

    assert_eq!(view.open_stream_count(), 1);
    let load = &h.frame.loads.borrow()[0];
    let response = fos_plugins::ResourceResponse::new(load.request.url.clone(), "application/x-fake");
    load.client().did_receive_response(&response);
    load.client().did_receive_data(b"partial");

    view.stop();
    assert_eq!(view.state(), LifecycleState::Stopped);
    assert_eq!(view.open_stream_count(), 0);
    assert!(load.handle.cancelled.get());
    assert_eq!(count_calls("destroystream"), 0);
    assert!(calls().contains(&"destroy".to_string()));
}

#[test]
fn test_detach_releases_module() {
    let h = Harness::new();
    let (module, view) = h.started_view();
    assert_eq!(module.load_count(), 1);

    view.detach();
    assert_eq!(module.load_count(), 0);
    assert!(calls().contains(&"destroy".to_string()));
    h.run();
    assert!(!module.is_loaded());
    assert_eq!(count_calls("shutdown"), 1);
}

#[test]
fn test_detach_inside_plugin_call_defers_shutdown() {
    let h = Harness::with_behavior(windowless());
    let (module, view) = h.started_view();

    let weak = Rc::downgrade(&view);
    on_event(move |event_type| {
        if event_type == NP_MOUSE_EVENT {
            if let Some(view) = weak.upgrade() {
                view.detach();
            }
        }
    });
    view.handle_event(mouse_down(3, 4));

    // The instance is gone but the library stays bound until a later turn.
    assert!(calls().contains(&"destroy".to_string()));
    assert_eq!(view.state(), LifecycleState::Stopped);
    assert_eq!(module.load_count(), 0);
    assert!(module.is_loaded());
    assert!(module.is_teardown_pending());
    assert_eq!(count_calls("shutdown"), 0);

    h.scheduler.run_turn();
    assert!(!module.is_loaded());
    assert_eq!(count_calls("shutdown"), 1);
}

#[test]
fn test_halted_instance_restarts_on_click() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    assert!(view.halt());
    assert!(view.is_halted());

    assert!(view.handle_event(mouse_down(5, 5)));
    assert_eq!(view.state(), LifecycleState::Started);
    assert_eq!(count_calls("new mode"), 2);
}

// ============================================================================
// Requests and streams
// ============================================================================

#[test]
fn test_requests_run_in_order_on_later_turns() {
    let h = Harness::new();
    let (_module, view) = h.started_view();

    for url in ["a", "b", "c"] {
        view.get_url(url, None).unwrap();
    }
    assert_eq!(view.queued_request_count(), 3);
    assert!(h.frame.loads.borrow().is_empty());

    // One request per turn.
    let mut started = Vec::new();
    for _ in 0..4 {
        h.scheduler.run_turn();
        started.push(h.frame.loads.borrow().len());
    }
    assert_eq!(started, vec![1, 2, 3, 3]);
    assert_eq!(view.queued_request_count(), 0);
    assert_eq!(
        h.frame.load_urls(),
        vec!["http://example.com/a", "http://example.com/b", "http://example.com/c"]
    );
}

#[test]
fn test_stream_delivers_body() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    view.get_url_notify("data.txt", None, NotifyData::null()).unwrap();
    h.run();

    h.frame.loads.borrow()[0].respond("text/plain", b"hello");
    assert_eq!(received(), b"hello");
    assert!(calls().contains(&"newstream text/plain http://example.com/data.txt".to_string()));
    assert!(calls().contains(&"write 0 5".to_string()));
    assert!(calls().contains(&"destroystream 0".to_string()));
    assert!(calls().contains(&"urlnotify http://example.com/data.txt 0".to_string()));
    assert_eq!(view.open_stream_count(), 0);
}

#[test]
fn test_stream_as_file() {
    let h = Harness::with_behavior(PluginBehavior {
        transfer_mode: NP_ASFILE,
        ..Default::default()
    });
    let (_module, view) = h.started_view();
    view.get_url("doc.bin", None).unwrap();
    h.run();

    h.frame.loads.borrow()[0].respond("application/octet-stream", b"spooled bytes");
    assert_eq!(received(), b"spooled bytes");
    assert_eq!(as_file_contents().as_deref(), Some(&b"spooled bytes"[..]));
    let asfile = calls().iter().position(|c| c == "asfile").unwrap();
    let destroy = calls().iter().position(|c| c == "destroystream 0").unwrap();
    assert!(asfile < destroy);
}

#[test]
fn test_stalled_write_is_retried() {
    let h = Harness::with_behavior(PluginBehavior {
        write_result: Some(0),
        ..Default::default()
    });
    let (_module, view) = h.started_view();
    view.get_url("slow", None).unwrap();
    h.run();

    h.frame.loads.borrow()[0].respond("text/plain", b"later");
    assert!(received().is_empty());
    assert_eq!(count_calls("destroystream"), 0);

    set_behavior(PluginBehavior::default());
    h.run();
    assert_eq!(received(), b"later");
    assert!(calls().contains(&"destroystream 0".to_string()));
    assert_eq!(view.open_stream_count(), 0);
}

#[test]
fn test_refused_load_notifies_network_error() {
    let h = Harness::new();
    h.frame.refuse_loads.set(true);
    let (_module, view) = h.started_view();
    view.get_url_notify("gone", None, NotifyData::null()).unwrap();
    h.run();

    assert!(calls().contains(&"urlnotify http://example.com/gone 1".to_string()));
    assert_eq!(count_calls("newstream"), 0);
    assert_eq!(view.open_stream_count(), 0);
}

#[test]
fn test_plugin_destroys_its_stream() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    view.get_url("big", None).unwrap();
    h.run();

    let load = &h.frame.loads.borrow()[0];
    let response = fos_plugins::ResourceResponse::new(load.request.url.clone(), "text/plain");
    load.client().did_receive_response(&response);
    assert_eq!(view.open_stream_count(), 1);

    let destroy = host().destroystream.unwrap();
    let code = unsafe { destroy(view.npp(), last_stream(), NPRES_USER_BREAK) };
    assert_eq!(code, NPERR_NO_ERROR);
    assert!(calls().contains(&"destroystream 2".to_string()));
    assert!(load.handle.cancelled.get());
    assert_eq!(view.open_stream_count(), 0);

    // The record is gone; a second destroy is refused.
    assert_eq!(view.destroy_stream(last_stream(), NPRES_USER_BREAK), Err(NpError::InvalidInstance));
}

#[test]
fn test_targeted_get_notifies_without_stream() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    view.get_url_notify("next.html", Some("_blank"), NotifyData::null()).unwrap();
    h.run();

    assert_eq!(
        *h.frame.navigations.borrow(),
        vec![("http://example.com/next.html".to_string(), "_blank".to_string())]
    );
    assert!(h.frame.loads.borrow().is_empty());
    assert!(calls().contains(&"urlnotify http://example.com/next.html 0".to_string()));
}

#[test]
fn test_script_url_into_other_frame_is_refused() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    assert_eq!(view.get_url("javascript:alert(1)", Some("other")), Err(NpError::InvalidParam));
    assert_eq!(view.get_url("", None), Err(NpError::InvalidUrl));
    assert_eq!(view.queued_request_count(), 0);
}

#[test]
fn test_script_result_streams_to_plugin() {
    let h = Harness::new();
    *h.frame.script_result.borrow_mut() = ScriptValue::String("42".to_string());
    let (_module, view) = h.started_view();
    view.get_url("javascript:6*7", None).unwrap();
    h.run();

    assert_eq!(*h.frame.scripts.borrow(), vec!["6*7".to_string()]);
    assert_eq!(received(), b"42");
    assert!(calls().iter().any(|c| c.starts_with("newstream text/plain javascript:")));
    assert!(calls().contains(&"destroystream 0".to_string()));
}

#[test]
fn test_post_headers_are_split_from_body() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    view.post_url("submit", None, b"Content-Type: text/plain\nContent-Length: 4\n\nbodyextra", false)
        .unwrap();
    h.run();

    let loads = h.frame.loads.borrow();
    let request = &loads[0].request;
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.header("Content-Type"), Some("text/plain"));
    assert_eq!(request.header("Content-Length"), None);
    assert_eq!(request.body.as_deref(), Some(&b"body"[..]));
}

#[test]
fn test_post_rejects_empty_buffer() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    assert_eq!(view.post_url("submit", None, b"", false), Err(NpError::InvalidParam));
}

// ============================================================================
// Geometry and input
// ============================================================================

#[test]
fn test_scrolled_out_window_gets_zero_clip() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    assert!(view.is_windowed());

    view.update_geometry(&visible_at(10, 20, 100, 50));
    assert!(h.frame.window.visible.get());
    let shown = *windows().last().unwrap();
    assert!(shown.has_window);
    assert_eq!((shown.width, shown.height), (100, 50));
    assert_eq!(IntRect::from_np_rect(&shown.clip), IntRect::new(0, 0, 100, 50));

    view.update_geometry(&visible_at(10, 900, 100, 50));
    assert!(!h.frame.window.visible.get());
    let hidden = *windows().last().unwrap();
    assert_eq!(hidden.clip, NPRect::ZERO);

    // A second empty clip is not repeated.
    let sent = windows().len();
    view.update_geometry(&visible_at(10, 950, 100, 50));
    assert_eq!(windows().len(), sent);
}

#[test]
fn test_moving_window_is_hidden_behind_zero_clip() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    view.update_geometry(&visible_at(10, 20, 100, 50));
    h.frame.window.clips.borrow_mut().clear();

    view.update_geometry(&visible_at(10, 30, 100, 50));
    assert_eq!(*h.frame.window.clips.borrow(), vec![IntRect::default(), IntRect::new(0, 0, 100, 50)]);
    assert_eq!(h.frame.window.geometry.get(), IntRect::new(10, 30, 100, 50));
}

#[test]
fn test_java_window_keeps_clip_while_moving() {
    let h = Harness::new();
    let module = h.module_at("/plugins/libnpjp2.so");
    assert!(module.quirks().has(fos_plugins::QuirkSet::DONT_CLIP_TO_ZERO_RECT_WHEN_SCROLLING));
    let view = PluginView::new(h.params(&module));
    assert!(view.init());
    view.update_geometry(&visible_at(10, 20, 100, 50));
    h.frame.window.clips.borrow_mut().clear();

    view.update_geometry(&visible_at(10, 30, 100, 50));
    assert_eq!(*h.frame.window.clips.borrow(), vec![IntRect::new(0, 0, 100, 50)]);
    assert!(h.frame.window.visible.get());
}

#[test]
fn test_flash_keeps_first_window_size() {
    let h = Harness::with_behavior(flash());
    let (module, view) = h.started_view();
    assert!(module.quirks().has(fos_plugins::QuirkSet::DONT_CALL_SET_WINDOW_MORE_THAN_ONCE));
    assert!(view.is_windowed());

    view.update_geometry(&visible_at(10, 20, 100, 50));
    let first = *windows().last().unwrap();
    assert_eq!((first.width, first.height), (100, 50));

    let sent = windows().len();
    view.update_geometry(&visible_at(30, 40, 200, 80));
    assert_eq!(windows().len(), sent + 1);
    let moved = *windows().last().unwrap();
    assert_eq!((moved.x, moved.y), (30, 40));
    assert_eq!((moved.width, moved.height), (100, 50));
    // The native window itself still follows layout.
    assert_eq!(h.frame.window.geometry.get(), IntRect::new(30, 40, 200, 80));
}

#[test]
fn test_resized_window_reaches_plugin() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    view.update_geometry(&visible_at(10, 20, 100, 50));
    view.update_geometry(&visible_at(30, 40, 200, 80));
    let resized = *windows().last().unwrap();
    assert_eq!((resized.width, resized.height), (200, 80));
}

#[test]
fn test_flash_window_uses_default_screen_depth() {
    let h = Harness::with_behavior(flash());
    let (module, view) = h.started_view();
    assert!(module.quirks().has(fos_plugins::QuirkSet::REQUIRES_DEFAULT_SCREEN_DEPTH));
    assert!(view.is_windowed());
    assert!(h.frame.window.default_depth.get());
}

#[test]
fn test_plain_window_inherits_parent_depth() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    assert!(view.is_windowed());
    assert!(!h.frame.window.default_depth.get());
}

#[test]
fn test_old_plugin_gets_popups_for_the_click_only() {
    let h = Harness::with_behavior(PluginBehavior {
        table_version: NPVERS_HAS_POPUPS_ENABLED_STATE - 1,
        ..windowless()
    });
    let (_module, view) = h.started_view();
    assert!(!view.are_popups_allowed());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let record = seen.clone();
    let weak = Rc::downgrade(&view);
    on_event(move |event_type| {
        if let Some(view) = weak.upgrade() {
            record.borrow_mut().push((event_type, view.are_popups_allowed()));
        }
    });

    assert!(view.handle_event(mouse_down(3, 4)));
    assert_eq!(*seen.borrow(), vec![(NP_FOCUS_EVENT, false), (NP_MOUSE_EVENT, true)]);

    // Popped on the next turn, not inside the event call.
    assert!(view.are_popups_allowed());
    h.scheduler.run_turn();
    assert!(!view.are_popups_allowed());
}

#[test]
fn test_current_plugin_gets_no_implicit_popups() {
    let h = Harness::with_behavior(windowless());
    let (_module, view) = h.started_view();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let record = seen.clone();
    let weak = Rc::downgrade(&view);
    on_event(move |_| {
        if let Some(view) = weak.upgrade() {
            record.borrow_mut().push(view.are_popups_allowed());
        }
    });

    assert!(view.handle_event(mouse_down(3, 4)));
    assert_eq!(*seen.borrow(), vec![false, false]);
    assert_eq!(h.scheduler.pending_count(), 0);
}

#[test]
fn test_paint_inside_modal_plugin_call_is_deferred() {
    let h = Harness::with_behavior(PluginBehavior {
        name: c"VLC Web Plugin",
        description: c"VLC media player Web Plugin 2.0.8",
        ..windowless()
    });
    let (module, view) = h.started_view();
    assert!(module.quirks().has(fos_plugins::QuirkSet::HAS_MODAL_MESSAGE_LOOP));
    view.update_geometry(&visible_at(10, 20, 100, 50));
    h.frame.invalidations.borrow_mut().clear();

    let weak = Rc::downgrade(&view);
    on_event(move |event_type| {
        if event_type != NP_MOUSE_EVENT {
            return;
        }
        if let Some(view) = weak.upgrade() {
            let mut target = Pixmap::new(800, 600).unwrap();
            view.paint(&mut target);
        }
    });
    view.handle_event(mouse_down(3, 4));

    assert_eq!(events(), vec![NP_FOCUS_EVENT, NP_MOUSE_EVENT]);
    assert!(h.frame.invalidations.borrow().is_empty());

    h.scheduler.run_turn();
    assert_eq!(*h.frame.invalidations.borrow(), vec![IntRect::new(10, 20, 100, 50)]);

    let mut target = Pixmap::new(800, 600).unwrap();
    view.paint(&mut target);
    assert_eq!(events().last(), Some(&NP_DRAW_EVENT));
}

#[test]
fn test_focus_precedes_button_down() {
    let h = Harness::with_behavior(windowless());
    let (_module, view) = h.started_view();
    assert!(!view.is_windowed());

    assert!(view.handle_event(mouse_down(3, 4)));
    assert_eq!(events(), vec![NP_FOCUS_EVENT, NP_MOUSE_EVENT]);
    assert!(view.has_focus());
}

#[test]
fn test_windowed_instance_ignores_host_input() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    assert!(!view.handle_event(mouse_down(3, 4)));
    assert!(events().is_empty());
}

#[test]
fn test_user_plus_one_messages_are_throttled() {
    let h = Harness::with_behavior(flash());
    let (module, view) = h.started_view();
    assert!(module.quirks().has(fos_plugins::QuirkSet::THROTTLE_USER_PLUS_ONE_MESSAGES));

    let message = NativeMessage {
        message: WM_USER + 1,
        wparam: 0,
        lparam: 0,
    };
    assert!(view.handle_native_message(message));
    assert!(view.handle_native_message(message));
    assert_eq!(h.frame.window.messages.borrow().len(), 1);
    assert_eq!(view.queued_native_messages(), 1);

    h.advance(Duration::from_millis(1));
    assert_eq!(h.frame.window.messages.borrow().len(), 2);
    assert_eq!(view.queued_native_messages(), 0);
}

// ============================================================================
// Host services
// ============================================================================

thread_local! {
    static TIMER_FIRES: std::cell::Cell<u32> = const { std::cell::Cell::new(0) };
}

unsafe extern "C" fn count_timer(_npp: NPP, _id: u32) {
    TIMER_FIRES.with(|c| c.set(c.get() + 1));
}

#[test]
fn test_repeating_timer() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    let schedule = host().scheduletimer.unwrap();
    let unschedule = host().unscheduletimer.unwrap();

    let id = unsafe { schedule(view.npp(), 10, 1, Some(count_timer)) };
    assert_ne!(id, 0);

    h.advance(Duration::from_millis(10));
    h.advance(Duration::from_millis(10));
    assert_eq!(TIMER_FIRES.with(|c| c.get()), 2);

    unsafe { unschedule(view.npp(), id) };
    h.advance(Duration::from_millis(10));
    assert_eq!(TIMER_FIRES.with(|c| c.get()), 2);
    assert_eq!(view.active_timer_count(), 0);
}

#[test]
fn test_stop_cancels_timers() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    let schedule = host().scheduletimer.unwrap();
    unsafe { schedule(view.npp(), 5, 1, Some(count_timer)) };
    assert_eq!(view.active_timer_count(), 1);

    view.stop();
    assert_eq!(view.active_timer_count(), 0);
}

thread_local! {
    static ASYNC_DATA: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

unsafe extern "C" fn record_async(data: *mut c_void) {
    ASYNC_DATA.with(|c| c.set(data as usize));
}

#[test]
fn test_async_call_runs_on_later_turn() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    let async_call = host().pluginthreadasynccall.unwrap();

    unsafe { async_call(view.npp(), Some(record_async), 7usize as *mut c_void) };
    assert_eq!(ASYNC_DATA.with(|c| c.get()), 0);
    h.run();
    assert_eq!(ASYNC_DATA.with(|c| c.get()), 7);
}

#[test]
fn test_user_agent_and_values() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    let funcs = host();

    let agent = unsafe { CStr::from_ptr(funcs.uagent.unwrap()(view.npp())) };
    assert!(agent.to_str().unwrap().starts_with("fOS-Engine/"));

    let mut enabled: NPBool = 0;
    let code = unsafe {
        funcs.getvalue.unwrap()(view.npp(), NPNV_JAVASCRIPT_ENABLED_BOOL, &mut enabled as *mut NPBool as *mut c_void)
    };
    assert_eq!(code, NPERR_NO_ERROR);
    assert_eq!(enabled, 1);

    let status = c"Loading movie";
    unsafe { funcs.status.unwrap()(view.npp(), status.as_ptr()) };
    assert_eq!(*h.frame.status_text.borrow(), "Loading movie");
}

#[test]
fn test_old_flash_sees_mozilla_agent() {
    let h = Harness::with_behavior(PluginBehavior {
        description: c"Shockwave Flash 9.0 r124",
        ..flash()
    });
    let (_module, view) = h.started_view();
    let agent = unsafe { CStr::from_ptr(view.user_agent()) };
    assert_eq!(agent.to_str().unwrap(), fos_plugins::config::MOZILLA_USER_AGENT);
}

#[test]
fn test_cookies_round_trip_through_frame() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    view.set_value_for_url(NPNURLV_COOKIE, "/", "a=1").unwrap();
    assert_eq!(view.value_for_url(NPNURLV_COOKIE, "/").unwrap().as_deref(), Some("a=1"));
    assert_eq!(view.value_for_url(NPNURLV_PROXY, "/").unwrap().as_deref(), Some("DIRECT"));
}

#[test]
fn test_windowless_invalidate_maps_to_document() {
    let h = Harness::with_behavior(windowless());
    let (_module, view) = h.started_view();
    view.update_geometry(&visible_at(100, 200, 50, 50));
    h.frame.invalidations.borrow_mut().clear();

    view.invalidate_rect(NPRect {
        top: 0,
        left: 0,
        bottom: 10,
        right: 20,
    });
    assert_eq!(*h.frame.invalidations.borrow(), vec![IntRect::new(100, 200, 20, 10)]);
}

#[test]
fn test_popup_state_stack_through_host_table() {
    let h = Harness::new();
    let (_module, view) = h.started_view();
    let funcs = host();
    assert!(!view.are_popups_allowed());

    unsafe { funcs.pushpopupsenabledstate.unwrap()(view.npp(), 1) };
    assert!(view.are_popups_allowed());
    unsafe { funcs.poppopupsenabledstate.unwrap()(view.npp()) };
    assert!(!view.are_popups_allowed());
    // Popping an empty stack is harmless.
    unsafe { funcs.poppopupsenabledstate.unwrap()(view.npp()) };
    assert!(!view.are_popups_allowed());
}
