//! CPU/GPU synchronization for the frame-resource ring.
//!
//! The GPU advances a monotonically increasing fence counter (a Vulkan
//! timeline semaphore) as it finishes submissions. Every ring slot remembers
//! the value its last submission will signal. [`FrameGate::advance_frame`]
//! moves to the next slot and blocks until that value has been reached, so a
//! slot is never rewritten while the GPU may still read it.
//!
//! ```text
//! frame K   : advance -> slot K mod N, wait(fence[K mod N]) -> record -> submit
//!             post_submission -> fence[K mod N] = K + 1, GPU signals K + 1
//! frame K+N : advance -> slot K mod N, wait(K + 1) ...
//! ```

use std::cell::{Cell, RefCell};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::RendererResult;

/// How long a debug build waits before reporting a slow fence.
pub const SLOW_FENCE_WAIT: Duration = Duration::from_secs(2);

/// The GPU side of the fence protocol.
pub trait GpuTimeline {
    /// The largest fence value the GPU has signaled.
    fn completed_value(&self) -> RendererResult<u64>;

    /// Blocks until `value` is reached. Returns `false` if `timeout`
    /// elapsed first; `None` waits without bound.
    fn wait_until(&self, value: u64, timeout: Option<Duration>) -> RendererResult<bool>;
}

/// Fence bookkeeping for `N` ring slots.
#[derive(Debug, Clone)]
pub struct FrameGate {
    slot_fences: Vec<u64>,
    current: usize,
    last_fence: u64,
}

impl FrameGate {
    /// A gate over `slot_count` slots. The first [`advance_frame`] selects
    /// slot 0.
    ///
    /// [`advance_frame`]: FrameGate::advance_frame
    pub fn new(slot_count: usize) -> Self {
        assert!(slot_count > 0, "frame gate needs at least one slot");
        Self {
            slot_fences: vec![0; slot_count],
            current: slot_count - 1,
            last_fence: 0,
        }
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_fences.len()
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Fence value the last submission signals.
    #[inline]
    pub fn last_fence(&self) -> u64 {
        self.last_fence
    }

    /// Fence value recorded for `slot`; zero if it was never submitted.
    pub fn slot_fence(&self, slot: usize) -> u64 {
        self.slot_fences[slot]
    }

    /// Selects the next slot and waits for its previous submission.
    ///
    /// # Errors
    ///
    /// Returns an error if querying or waiting on the timeline fails, which
    /// includes device loss.
    pub fn advance_frame(&mut self, timeline: &impl GpuTimeline) -> RendererResult<usize> {
        self.current = (self.current + 1) % self.slot_fences.len();
        let fence = self.slot_fences[self.current];
        if fence != 0 && timeline.completed_value()? < fence {
            wait_for_fence(timeline, fence, self.current)?;
        }
        Ok(self.current)
    }

    /// Reserves the next fence value for the current slot and returns it.
    /// The caller signals this value with the slot's submission.
    pub fn post_submission(&mut self) -> u64 {
        self.last_fence += 1;
        self.slot_fences[self.current] = self.last_fence;
        self.last_fence
    }
}

fn wait_for_fence(timeline: &impl GpuTimeline, fence: u64, slot: usize) -> RendererResult<()> {
    if cfg!(debug_assertions) {
        if timeline.wait_until(fence, Some(SLOW_FENCE_WAIT))? {
            return Ok(());
        }
        warn!(
            "Frame slot {} still waiting on fence {} after {:?}",
            slot, fence, SLOW_FENCE_WAIT
        );
    }
    timeline.wait_until(fence, None)?;
    debug!("Frame slot {} released at fence {}", slot, fence);
    Ok(())
}

/// Host-side timeline for driving the gate without a GPU.
///
/// Waits complete immediately by advancing the counter to the awaited value
/// and are logged, so tests can assert exactly which fences the CPU blocked
/// on.
#[derive(Debug, Default)]
pub struct ScriptedTimeline {
    completed: Cell<u64>,
    waits: RefCell<Vec<u64>>,
    stalls: Cell<u32>,
}

impl ScriptedTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretends the GPU finished everything up to `value`.
    pub fn complete_up_to(&self, value: u64) {
        self.completed.set(self.completed.get().max(value));
    }

    /// Makes the next `count` bounded waits time out.
    pub fn stall_bounded_waits(&self, count: u32) {
        self.stalls.set(count);
    }

    /// Fence values the CPU blocked on, in order.
    pub fn waits(&self) -> Vec<u64> {
        self.waits.borrow().clone()
    }
}

impl GpuTimeline for ScriptedTimeline {
    fn completed_value(&self) -> RendererResult<u64> {
        Ok(self.completed.get())
    }

    fn wait_until(&self, value: u64, timeout: Option<Duration>) -> RendererResult<bool> {
        if timeout.is_some() && self.stalls.get() > 0 {
            self.stalls.set(self.stalls.get() - 1);
            return Ok(false);
        }
        self.waits.borrow_mut().push(value);
        self.complete_up_to(value);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frames_never_wait() {
        let timeline = ScriptedTimeline::new();
        let mut gate = FrameGate::new(3);
        for expected in 0..3 {
            assert_eq!(gate.advance_frame(&timeline).unwrap(), expected);
            gate.post_submission();
        }
        assert!(timeline.waits().is_empty());
    }

    #[test]
    fn test_reused_slot_waits_for_frame_k_minus_n() {
        const N: usize = 3;
        let timeline = ScriptedTimeline::new();
        let mut gate = FrameGate::new(N);

        for frame in 0..10u64 {
            let slot = gate.advance_frame(&timeline).unwrap();
            assert_eq!(slot, frame as usize % N);
            if frame >= N as u64 {
                // Frame K - N signaled value K - N + 1.
                assert_eq!(timeline.waits().last(), Some(&(frame - N as u64 + 1)));
            }
            assert_eq!(gate.post_submission(), frame + 1);
        }
        assert_eq!(timeline.waits().len(), 10 - N);
    }

    #[test]
    fn test_completed_slot_is_not_waited_on() {
        let timeline = ScriptedTimeline::new();
        let mut gate = FrameGate::new(2);
        for _ in 0..2 {
            gate.advance_frame(&timeline).unwrap();
            gate.post_submission();
        }
        timeline.complete_up_to(2);
        gate.advance_frame(&timeline).unwrap();
        assert!(timeline.waits().is_empty());
    }

    #[test]
    fn test_slow_wait_keeps_waiting() {
        let timeline = ScriptedTimeline::new();
        let mut gate = FrameGate::new(1);
        gate.advance_frame(&timeline).unwrap();
        gate.post_submission();

        timeline.stall_bounded_waits(1);
        gate.advance_frame(&timeline).unwrap();
        assert_eq!(timeline.waits(), vec![1]);
        assert_eq!(gate.slot_fence(0), 1);
    }
}
