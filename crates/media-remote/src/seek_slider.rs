//! Seek bar state.
//!
//! While the user scrubs, incoming positions are ignored so the bar does not
//! jump under them. After a commit the bar holds the committed value for a
//! short loading window, then resumes following the player.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct SeekSlider {
    value: i64,
    dragging: bool,
    loading_until: Option<Instant>,
    last_drag: Option<i64>,
    loading_window: Duration,
}

impl SeekSlider {
    pub fn new(loading_window: Duration) -> Self {
        Self {
            value: 0,
            dragging: false,
            loading_until: None,
            last_drag: None,
            loading_window,
        }
    }

    /// Feed the latest player position; returns the value to display.
    pub fn update(&mut self, position_us: i64, now: Instant) -> i64 {
        if let Some(until) = self.loading_until {
            if now < until {
                return self.value;
            }
            self.loading_until = None;
            self.dragging = false;
        }
        if self.dragging {
            return self.value;
        }
        self.value = match self.last_drag.take() {
            Some(committed) if committed != 0 => committed,
            _ => position_us,
        };
        self.value
    }

    /// Move the thumb to `value_us`. No-op for tracks without a length.
    pub fn drag_to(&mut self, value_us: i64, length_us: i64) {
        if length_us <= 0 {
            return;
        }
        self.dragging = true;
        self.value = value_us.clamp(0, length_us);
    }

    pub fn nudge(&mut self, delta_us: i64, length_us: i64) {
        self.drag_to(self.value.saturating_add(delta_us), length_us);
    }

    /// Finish the drag. Returns the position to seek to.
    pub fn commit(&mut self, now: Instant) -> Option<i64> {
        if !self.dragging || self.loading_until.is_some() {
            return None;
        }
        self.loading_until = Some(now + self.loading_window);
        self.last_drag = Some(self.value);
        Some(self.value)
    }

    /// Abandon the drag; the bar snaps back to the player on the next update.
    pub fn cancel(&mut self) {
        if self.loading_until.is_none() {
            self.dragging = false;
        }
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn is_loading(&self) -> bool {
        self.loading_until.is_some()
    }
}
