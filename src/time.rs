use bevy_ecs::prelude::Resource;

/// Fixed-step frame clock. The host advances it explicitly; scripts read `delta` through
/// `UE.GetDeltaTime()`.
#[derive(Debug, Clone, Copy, Default, Resource)]
pub struct FrameClock {
    pub delta: f32,
    pub elapsed: f64,
    pub frame: u64,
}

impl FrameClock {
    pub fn advance(&mut self, dt: f32) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.delta = dt;
        self.elapsed += dt as f64;
        self.frame += 1;
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed
    }
}
