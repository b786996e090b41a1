use std::collections::VecDeque;
use std::time::{Duration, Instant};

const AVERAGE_WINDOW: usize = 60;

/// Wall-clock frame timer.
///
/// The first tick reports a zero delta. Deltas are clamped to
/// `max_delta`, so a debugger pause or a slow load does not become one
/// huge step.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    max_delta: f32,
    last: Option<Instant>,
    frame_count: u64,
    total_seconds: f64,
    recent: VecDeque<f32>,
}

impl FrameTimer {
    pub fn new(max_delta_seconds: f32) -> Self {
        Self {
            max_delta: max_delta_seconds,
            last: None,
            frame_count: 0,
            total_seconds: 0.0,
            recent: VecDeque::with_capacity(AVERAGE_WINDOW),
        }
    }

    /// Start the next frame and return its delta in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let elapsed = self.last.map_or(Duration::ZERO, |last| now - last);
        self.last = Some(now);
        self.advance(elapsed)
    }

    /// Start the next frame as if `elapsed` had passed since the last one.
    pub fn advance(&mut self, elapsed: Duration) -> f32 {
        let dt = elapsed.as_secs_f32().min(self.max_delta);
        self.frame_count += 1;
        self.total_seconds += f64::from(dt);
        if self.recent.len() == AVERAGE_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(dt);
        dt
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Sum of all clamped deltas.
    pub fn total_seconds(&self) -> f64 {
        self.total_seconds
    }

    /// Mean delta over the last 60 frames.
    pub fn average_delta(&self) -> f32 {
        if self.recent.is_empty() {
            return 0.0;
        }
        self.recent.iter().sum::<f32>() / self.recent.len() as f32
    }

    pub fn max_delta(&self) -> f32 {
        self.max_delta
    }
}
