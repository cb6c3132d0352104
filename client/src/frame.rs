use std::cell::{Cell, RefCell};

use gloo::render::{request_animation_frame, AnimationFrame};
use gloo::timers::callback::Interval;

/// Roughly one blink step per display frame.
pub const BLINK_INTERVAL_MS: u32 = 16;

/// Coalesces redraw requests into at most one pending animation frame.
#[derive(Default)]
pub struct FrameScheduler {
    handle: RefCell<Option<AnimationFrame>>,
    panels_dirty: Cell<bool>,
}

impl FrameScheduler {
    /// `panels` also asks for the side panels to be rebuilt.
    pub fn request(&self, panels: bool, on_frame: impl FnOnce() + 'static) {
        if panels {
            self.panels_dirty.set(true);
        }
        if self.handle.borrow().is_some() {
            return;
        }
        let handle = request_animation_frame(move |_| on_frame());
        *self.handle.borrow_mut() = Some(handle);
    }

    /// Called first thing in the frame callback; returns whether panels
    /// were requested since the last frame.
    pub fn begin(&self) -> bool {
        self.handle.borrow_mut().take();
        self.panels_dirty.replace(false)
    }
}

/// Drives the blink of the annotation under an edit session.
#[derive(Default)]
pub struct Blink {
    interval: RefCell<Option<Interval>>,
    tick: Cell<u32>,
}

impl Blink {
    pub fn is_running(&self) -> bool {
        self.interval.borrow().is_some()
    }

    pub fn start(&self, on_tick: impl FnMut() + 'static) {
        if self.is_running() {
            return;
        }
        self.tick.set(0);
        *self.interval.borrow_mut() = Some(Interval::new(BLINK_INTERVAL_MS, on_tick));
    }

    pub fn stop(&self) {
        self.interval.borrow_mut().take();
    }

    pub fn advance(&self) {
        self.tick.set((self.tick.get() + 1) % 1_000_000);
    }

    pub fn alpha(&self) -> Option<f64> {
        self.is_running().then(|| blink_alpha(self.tick.get()))
    }
}

pub fn blink_alpha(tick: u32) -> f64 {
    0.15 + 0.85 * (0.5 + 0.5 * (f64::from(tick) * 0.45).sin())
}
