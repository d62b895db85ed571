//! Progressive accumulation.
//!
//! While the camera and scene stay still, each frame's `raw` sample is folded
//! into the `accumulated` target with weight `1 / (n + 1)`, where `n` is the
//! number of samples already in it. After `n` frames `accumulated` holds the
//! arithmetic mean of every sample in the episode.
//!
//! [`Compositor`] only decides what to do with a frame; the blend itself runs
//! on the GPU (`accumulate.comp`). [`blend_pixels`] is the same arithmetic on
//! the CPU and is what the mock backend uses.

use tracing::{debug, trace};

use crate::settings::RenderMode;

/// Where the compositor is in the progressive cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositorState {
    /// `raw` goes straight to the display.
    RealTime,
    /// Next blend overwrites `accumulated` with `raw`.
    ProgressiveFirstFrame,
    /// Blending into an existing running average.
    ProgressiveAccumulating,
}

/// Samples accumulated in the current still episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SampleCounter(u32);

impl SampleCounter {
    pub const fn get(self) -> u32 {
        self.0
    }

    fn reset(&mut self) {
        self.0 = 0;
    }

    fn increment(&mut self) {
        self.0 = self.0.saturating_add(1);
    }
}

/// What to do with the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompositePass {
    /// Present `raw` unchanged.
    Direct,
    /// Blend `raw` into `accumulated`, then present `accumulated`.
    Blend { weight: f32 },
    /// Sample cap reached: skip tracing and present `accumulated` again.
    Hold,
}

/// Blend weight for the sample following `counter` existing samples.
pub fn blend_weight(counter: u32) -> f32 {
    1.0 / (counter as f32 + 1.0)
}

/// `accumulated = raw * weight + accumulated * (1 - weight)`, per channel.
///
/// At `weight >= 1` the old contents are not read, so whatever the target
/// held before the first sample (even NaN) cannot leak through.
pub fn blend_pixels(accumulated: &mut [[f32; 4]], raw: &[[f32; 4]], weight: f32) {
    debug_assert_eq!(accumulated.len(), raw.len());
    let overwrite = weight >= 1.0;
    let keep = if overwrite { 0.0 } else { 1.0 - weight };
    for (acc, sample) in accumulated.iter_mut().zip(raw) {
        for (a, s) in acc.iter_mut().zip(sample) {
            let history = if overwrite { 0.0 } else { *a };
            *a = s * weight + history * keep;
        }
    }
}

/// Drives the real-time / progressive state machine and owns the
/// [`SampleCounter`].
#[derive(Debug, Clone)]
pub struct Compositor {
    state: CompositorState,
    counter: SampleCounter,
    max_samples: u32,
}

impl Compositor {
    pub fn new(mode: RenderMode) -> Self {
        let state = match mode {
            RenderMode::RealTime => CompositorState::RealTime,
            RenderMode::Progressive => CompositorState::ProgressiveFirstFrame,
        };
        Self {
            state,
            counter: SampleCounter::default(),
            max_samples: 0,
        }
    }

    /// Stop blending once an episode has `max_samples` samples (0 = never).
    #[must_use]
    pub const fn with_max_samples(mut self, max_samples: u32) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn set_max_samples(&mut self, max_samples: u32) {
        self.max_samples = max_samples;
    }

    pub const fn state(&self) -> CompositorState {
        self.state
    }

    pub const fn samples(&self) -> u32 {
        self.counter.get()
    }

    /// The episode has reached its sample cap.
    pub const fn is_converged(&self) -> bool {
        self.max_samples > 0 && self.counter.get() >= self.max_samples
    }

    /// Choose the pass for this frame.
    ///
    /// `reset` reports that the camera or scene changed since the previous
    /// frame. In progressive mode it, or arriving from real-time mode, starts
    /// a new episode.
    pub fn plan(&mut self, mode: RenderMode, reset: bool) -> CompositePass {
        match mode {
            RenderMode::RealTime => {
                if self.state != CompositorState::RealTime {
                    debug!("Compositor switched to real-time");
                }
                self.state = CompositorState::RealTime;
                self.counter.reset();
                CompositePass::Direct
            }
            RenderMode::Progressive => {
                if reset || self.state == CompositorState::RealTime {
                    self.begin_episode();
                }
                if self.is_converged() {
                    CompositePass::Hold
                } else {
                    CompositePass::Blend {
                        weight: blend_weight(self.counter.get()),
                    }
                }
            }
        }
    }

    /// Record that `pass` was executed.
    pub fn complete(&mut self, pass: CompositePass) {
        if let CompositePass::Blend { .. } = pass {
            self.counter.increment();
            self.state = CompositorState::ProgressiveAccumulating;
            if self.is_converged() {
                debug!("Progressive image converged at {} samples", self.counter.get());
            }
        }
    }

    fn begin_episode(&mut self) {
        if self.counter.get() > 0 {
            trace!("Restarting accumulation after {} samples", self.counter.get());
        }
        self.state = CompositorState::ProgressiveFirstFrame;
        self.counter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn run(compositor: &mut Compositor, mode: RenderMode, reset: bool) -> CompositePass {
        let pass = compositor.plan(mode, reset);
        compositor.complete(pass);
        pass
    }

    #[test]
    fn weights_follow_counter() {
        assert_relative_eq!(blend_weight(0), 1.0);
        assert_relative_eq!(blend_weight(1), 0.5);
        assert_relative_eq!(blend_weight(3), 0.25);
    }

    #[test]
    fn first_blend_overwrites() {
        let mut acc = vec![[9.0; 4]; 4];
        let raw = vec![[0.25, 0.5, 0.75, 1.0]; 4];
        blend_pixels(&mut acc, &raw, blend_weight(0));
        assert_eq!(acc, raw);
    }

    #[test]
    fn first_blend_ignores_uninitialized_history() {
        let mut acc = vec![[f32::NAN, f32::INFINITY, f32::NAN, f32::NEG_INFINITY]; 3];
        let raw = vec![[0.1, 0.2, 0.3, 1.0]; 3];
        blend_pixels(&mut acc, &raw, blend_weight(0));
        assert_eq!(acc, raw);

        // Later samples do read history again.
        blend_pixels(&mut acc, &[[0.3, 0.4, 0.5, 1.0]; 3], blend_weight(1));
        assert_relative_eq!(acc[2][0], 0.2);
        assert_relative_eq!(acc[2][1], 0.3);
    }

    #[test]
    fn accumulated_is_mean_of_samples() {
        let mut compositor = Compositor::new(RenderMode::Progressive);
        let mut acc = vec![[0.0; 4]; 2];
        let n = 10;
        for k in 1..=n {
            let raw = vec![[k as f32; 4]; 2];
            match run(&mut compositor, RenderMode::Progressive, false) {
                CompositePass::Blend { weight } => blend_pixels(&mut acc, &raw, weight),
                other => panic!("unexpected pass {other:?}"),
            }
        }
        assert_eq!(compositor.samples(), n);
        for px in &acc {
            for c in px {
                assert_relative_eq!(*c, 5.5, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn real_time_never_counts() {
        let mut compositor = Compositor::new(RenderMode::RealTime);
        for _ in 0..5 {
            assert_eq!(run(&mut compositor, RenderMode::RealTime, false), CompositePass::Direct);
        }
        assert_eq!(compositor.samples(), 0);
        assert_eq!(compositor.state(), CompositorState::RealTime);
    }

    #[test]
    fn motion_restarts_episode() {
        let mut compositor = Compositor::new(RenderMode::Progressive);
        for _ in 0..4 {
            run(&mut compositor, RenderMode::Progressive, false);
        }
        assert_eq!(compositor.samples(), 4);
        assert_eq!(compositor.state(), CompositorState::ProgressiveAccumulating);

        let pass = compositor.plan(RenderMode::Progressive, true);
        assert_eq!(pass, CompositePass::Blend { weight: 1.0 });
        assert_eq!(compositor.state(), CompositorState::ProgressiveFirstFrame);
        compositor.complete(pass);
        assert_eq!(compositor.samples(), 1);
    }

    #[test]
    fn leaving_real_time_restarts_episode() {
        let mut compositor = Compositor::new(RenderMode::Progressive);
        for _ in 0..3 {
            run(&mut compositor, RenderMode::Progressive, false);
        }
        run(&mut compositor, RenderMode::RealTime, false);
        assert_eq!(compositor.samples(), 0);

        let pass = compositor.plan(RenderMode::Progressive, false);
        assert_eq!(pass, CompositePass::Blend { weight: 1.0 });
    }

    #[test]
    fn sample_cap_holds_image() {
        let mut compositor = Compositor::new(RenderMode::Progressive).with_max_samples(3);
        for _ in 0..3 {
            assert!(matches!(
                run(&mut compositor, RenderMode::Progressive, false),
                CompositePass::Blend { .. }
            ));
        }
        assert!(compositor.is_converged());
        assert_eq!(run(&mut compositor, RenderMode::Progressive, false), CompositePass::Hold);
        assert_eq!(compositor.samples(), 3);

        // Moving again starts over even when converged.
        assert_eq!(
            compositor.plan(RenderMode::Progressive, true),
            CompositePass::Blend { weight: 1.0 }
        );
    }
}
