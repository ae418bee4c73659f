use std::time::{Duration, Instant};

/// Longest step handed to the light motion pass. A window drag or a stalled
/// swapchain can produce a multi-second gap that would teleport every light.
pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(100);

/// Frame clock advanced once per presented frame by the window loop.
pub struct Time {
    startup: Instant,
    last_update: Instant,
    delta: Duration,
    frame: u64,
}

impl Default for Time {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            startup: now,
            last_update: now,
            delta: Duration::ZERO,
            frame: 0,
        }
    }
}

impl Time {
    /// Called by the engine loop once per frame
    pub fn update(&mut self) {
        let now = Instant::now();
        self.advance_by((now - self.last_update).min(MAX_FRAME_DELTA));
        self.last_update = now;
    }

    /// Steps the clock by a fixed amount. Used by headless rendering where
    /// wall-clock time is meaningless.
    pub fn advance_by(&mut self, delta: Duration) {
        self.delta = delta;
        self.frame += 1;
    }

    /// Returns time in seconds since last frame (e.g., 0.016 for 60fps)
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Returns total time since app started
    pub fn elapsed_seconds(&self) -> f32 {
        self.startup.elapsed().as_secs_f32()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }
}
