use std::sync::Arc;
use ash::vk;
use crate::renderer::config::FRAMES_IN_FLIGHT;
use crate::renderer::error::{RenderError, RenderResult};

/// Completion signal of a frame slot's last submission
pub trait FrameFence {
    /// Blocks for at most `timeout_ns`. Returns `false` if the fence is still unsignaled.
    fn wait(&self, timeout_ns: u64) -> RenderResult<bool>;
    fn reset(&self) -> RenderResult<()>;
    fn handle(&self) -> vk::Fence;
}

/// Fence created signaled, so the first wait on every slot returns immediately
pub struct DeviceFence {
    fence: vk::Fence,
    device: Arc<ash::Device>,
}

impl DeviceFence {
    pub fn new_signaled(device: Arc<ash::Device>) -> RenderResult<Self> {
        let info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        let fence = unsafe { device.create_fence(&info, None)? };
        Ok(Self { fence, device })
    }
}

impl FrameFence for DeviceFence {
    fn wait(&self, timeout_ns: u64) -> RenderResult<bool> {
        match unsafe { self.device.wait_for_fences(&[self.fence], true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn reset(&self) -> RenderResult<()> {
        unsafe { self.device.reset_fences(&[self.fence])? };
        Ok(())
    }

    fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for DeviceFence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Recording,
    Submitted,
}

pub struct FrameSlot<F> {
    pub fence: F,
    pub command_buffer: vk::CommandBuffer,
    state: SlotState,
}

impl<F> FrameSlot<F> {
    pub fn new(fence: F, command_buffer: vk::CommandBuffer) -> Self {
        Self {
            fence,
            command_buffer,
            state: SlotState::Idle,
        }
    }
}

/// Slot handed to the recorder by [`FrameRing::begin`]
#[derive(Debug, Clone, Copy)]
pub struct ActiveSlot {
    pub index: usize,
    pub command_buffer: vk::CommandBuffer,
    /// `false` when the wait timed out and the previous submission may still be running
    pub fence_confirmed: bool,
}

/// Fixed ring of frame slots, double buffered.
///
/// A slot moves Idle -> Recording -> Submitted and back to Idle once its fence is seen
/// signaled at the next [`FrameRing::begin`] for that slot.
pub struct FrameRing<F> {
    slots: Vec<FrameSlot<F>>,
    timeout_ns: u64,
}

impl<F: FrameFence> FrameRing<F> {
    pub fn new(slots: Vec<FrameSlot<F>>, timeout_ns: u64) -> Self {
        debug_assert_eq!(slots.len(), FRAMES_IN_FLIGHT);
        Self { slots, timeout_ns }
    }

    pub fn slot_index(&self, frame_number: u64) -> usize {
        (frame_number % self.slots.len() as u64) as usize
    }

    /// Waits for the slot's previous submission and hands out its command buffer for recording.
    ///
    /// A timed out wait is logged and the slot is reused anyway. The caller still owns the
    /// returned command buffer's reset and begin.
    pub fn begin(&mut self, frame_number: u64) -> RenderResult<ActiveSlot> {
        let index = self.slot_index(frame_number);
        let timeout_ns = self.timeout_ns;
        let slot = &mut self.slots[index];

        let fence_confirmed = match slot.state {
            SlotState::Recording => return Err(RenderError::SlotBusy(index)),
            SlotState::Idle | SlotState::Submitted => slot.fence.wait(timeout_ns)?,
        };

        if !fence_confirmed {
            let err = RenderError::SynchronizationTimeout { what: "frame slot fence" };
            log::warn!("{} (slot {}), reusing it anyway", err, index);
        }

        slot.state = SlotState::Recording;
        Ok(ActiveSlot {
            index,
            command_buffer: slot.command_buffer,
            fence_confirmed,
        })
    }

    /// Resets the slot's fence and runs `submit` with it. The fence is only reset right
    /// before a submission, so a dropped frame leaves it signaled.
    pub fn submit<S>(&mut self, slot: &ActiveSlot, submit: S) -> RenderResult<()>
    where
        S: FnOnce(vk::CommandBuffer, vk::Fence) -> RenderResult<()>,
    {
        let frame = &mut self.slots[slot.index];
        frame.fence.reset()?;
        match submit(frame.command_buffer, frame.fence.handle()) {
            Ok(()) => {
                frame.state = SlotState::Submitted;
                Ok(())
            }
            Err(e) => {
                // Nothing will signal the fence now, the next wait on this slot times out once
                frame.state = SlotState::Idle;
                Err(e)
            }
        }
    }

    /// Returns a recording slot to idle without submitting it
    pub fn abandon(&mut self, slot: &ActiveSlot) {
        self.slots[slot.index].state = SlotState::Idle;
    }

    /// Runs one step of preparing `slot`, abandoning the slot if the step fails
    pub fn or_abandon<T, S>(&mut self, slot: &ActiveSlot, step: S) -> RenderResult<T>
    where
        S: FnOnce() -> RenderResult<T>,
    {
        step().inspect_err(|_| self.abandon(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    const TIMEOUT_NS: u64 = 1_000;

    /// GPU stand-in: a submission completes `latency_ns` after it starts
    struct FakeFence {
        signaled: Cell<bool>,
        pending: Cell<bool>,
        latency_ns: u64,
        log: Rc<RefCell<Vec<String>>>,
        id: usize,
    }

    impl FakeFence {
        fn new(id: usize, latency_ns: u64, log: Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                signaled: Cell::new(true),
                pending: Cell::new(false),
                latency_ns,
                log,
                id,
            }
        }

        fn start_work(&self) {
            self.pending.set(true);
        }
    }

    impl FrameFence for FakeFence {
        fn wait(&self, timeout_ns: u64) -> RenderResult<bool> {
            if self.pending.get() && self.latency_ns <= timeout_ns {
                self.pending.set(false);
                self.signaled.set(true);
            }
            self.log.borrow_mut().push(format!("wait {}", self.id));
            Ok(self.signaled.get())
        }

        fn reset(&self) -> RenderResult<()> {
            self.signaled.set(false);
            Ok(())
        }

        fn handle(&self) -> vk::Fence {
            vk::Fence::null()
        }
    }

    fn ring(latency_ns: u64) -> (FrameRing<FakeFence>, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let slots = (0..FRAMES_IN_FLIGHT)
            .map(|i| {
                FrameSlot::new(FakeFence::new(i, latency_ns, log.clone()), vk::CommandBuffer::null())
            })
            .collect();
        (FrameRing::new(slots, TIMEOUT_NS), log)
    }

    /// Begins, submits and starts the GPU work of one frame.
    /// Returns the slot and whether its fence was signaled while it was being recorded.
    fn run_frame(ring: &mut FrameRing<FakeFence>, frame: u64) -> (ActiveSlot, bool) {
        let slot = ring.begin(frame).unwrap();
        let signaled_while_recording = ring.slots[slot.index].fence.signaled.get();
        ring.submit(&slot, |_, _| Ok(())).unwrap();
        ring.slots[slot.index].fence.start_work();
        (slot, signaled_while_recording)
    }

    #[test]
    fn slots_alternate() {
        let (mut ring, _) = ring(0);
        let indices: Vec<_> = (0..6).map(|f| run_frame(&mut ring, f).0.index).collect();
        assert_eq!(indices, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn never_records_over_unsignaled_fence() {
        for latency_ns in [0, TIMEOUT_NS / 2, TIMEOUT_NS] {
            let (mut ring, log) = ring(latency_ns);
            for frame in 0..20 {
                let (slot, signaled) = run_frame(&mut ring, frame);
                assert!(slot.fence_confirmed, "frame {} latency {}", frame, latency_ns);
                assert!(signaled, "frame {} latency {}", frame, latency_ns);

                // Every frame waits on its own slot before recording
                let expected = format!("wait {}", slot.index);
                assert_eq!(log.borrow().last(), Some(&expected));
                assert_eq!(ring.slots[slot.index].state, SlotState::Submitted);
            }
        }
    }

    #[test]
    fn timeout_is_reported_and_slot_reused() {
        let (mut ring, _) = ring(TIMEOUT_NS + 1);
        assert!(run_frame(&mut ring, 0).0.fence_confirmed);
        assert!(run_frame(&mut ring, 1).0.fence_confirmed);

        let slot = ring.begin(2).unwrap();
        assert_eq!(slot.index, 0);
        assert!(!slot.fence_confirmed);
        assert!(!ring.slots[0].fence.signaled.get());
        assert_eq!(ring.slots[0].state, SlotState::Recording);
    }

    #[test]
    fn abandoned_frame_keeps_fence_signaled() {
        let (mut ring, _) = ring(0);
        let slot = ring.begin(0).unwrap();
        ring.abandon(&slot);
        assert!(ring.slots[0].fence.signaled.get());

        let again = ring.begin(2).unwrap();
        assert!(again.fence_confirmed);
    }

    #[test]
    fn failed_submit_returns_slot_to_idle() {
        let (mut ring, _) = ring(0);
        let slot = ring.begin(0).unwrap();
        let result = ring.submit(&slot, |_, _| {
            Err(RenderError::SubmissionFailure(vk::Result::ERROR_DEVICE_LOST))
        });
        assert!(result.is_err());
        assert_eq!(ring.slots[0].state, SlotState::Idle);
    }

    #[test]
    fn failed_step_releases_slot() {
        let (mut ring, _) = ring(0);
        let slot = ring.begin(0).unwrap();
        let result: RenderResult<()> = ring.or_abandon(&slot, || {
            Err(RenderError::InvalidWrite("uniform buffer".into()))
        });
        assert!(matches!(result, Err(RenderError::InvalidWrite(_))));
        assert_eq!(ring.slots[0].state, SlotState::Idle);

        // The slot is usable again instead of reporting itself busy
        assert!(ring.begin(2).unwrap().fence_confirmed);
    }

    #[test]
    fn successful_step_keeps_recording() {
        let (mut ring, _) = ring(0);
        let slot = ring.begin(0).unwrap();
        assert_eq!(ring.or_abandon(&slot, || Ok(7)).unwrap(), 7);
        assert_eq!(ring.slots[0].state, SlotState::Recording);
    }

    #[test]
    fn double_begin_is_rejected() {
        let (mut ring, _) = ring(0);
        ring.begin(0).unwrap();
        assert!(matches!(ring.begin(2), Err(RenderError::SlotBusy(0))));
    }
}
