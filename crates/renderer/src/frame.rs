//! The frame-cycle state machine.
//!
//! [`FrameCycle`] enforces the call order
//! `begin_frame -> begin_render -> (caller records) -> end_render -> end_frame`
//! and owns the frame-slot counter. Everything that touches the GPU sits
//! behind [`FrameBackend`], so the ordering rules can be exercised without a
//! device.
//!
//! Per slot, the cycle guarantees:
//! - the slot's fence is waited on before its command buffer is reset
//! - the fence is reset only after that wait and only when a submission
//!   will follow in the same cycle
//! - the slot index advances by one after every submitted frame and is left
//!   untouched by a skipped one

use tracing::{debug, trace};
use vkframe_rhi::swapchain::{AcquireOutcome, PresentOutcome};

use crate::error::{RendererError, RendererResult};

/// Where the cycle currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    /// No frame open.
    Idle,
    /// Command buffer recording, render pass not yet open.
    Recording,
    /// Render pass open.
    Rendering,
    /// Render pass closed and the command buffer ended; ready to submit.
    Recorded,
}

/// GPU-facing half of the frame cycle.
///
/// `slot` is always `< slot_count`. `image` is the index returned by the
/// matching `acquire`.
pub trait FrameBackend {
    /// Handle the caller records into.
    type Command: Clone;

    /// Blocks until the slot's previous submission has retired.
    fn wait_slot(&mut self, slot: usize) -> RendererResult<()>;

    /// Acquires the next presentable image, signalling the slot's acquire
    /// semaphore.
    fn acquire(&mut self, slot: usize) -> RendererResult<AcquireOutcome>;

    /// Returns the slot's fence to unsignaled.
    fn reset_slot(&mut self, slot: usize) -> RendererResult<()>;

    /// Resets the slot's command buffer and begins recording.
    fn begin_commands(&mut self, slot: usize) -> RendererResult<Self::Command>;

    /// Whether `command` is the slot's command buffer.
    fn is_slot_command(&self, slot: usize, command: &Self::Command) -> bool;

    /// Layout transitions into attachment layouts, then opens the pass.
    fn open_pass(&mut self, slot: usize, image: u32) -> RendererResult<()>;

    /// Closes the pass, transitions for presentation and ends recording.
    fn close_pass(&mut self, slot: usize, image: u32) -> RendererResult<()>;

    /// Submits the slot's commands, signalling its fence.
    fn submit(&mut self, slot: usize) -> RendererResult<()>;

    fn present(&mut self, slot: usize, image: u32) -> RendererResult<PresentOutcome>;

    /// Reads and clears the window's resize flag.
    fn take_resize_pending(&mut self) -> bool;

    /// Idles the device and rebuilds the swapchain at the current window
    /// extent, waiting out a zero-area window.
    fn recreate(&mut self) -> RendererResult<()>;
}

/// Ordered frame protocol over a [`FrameBackend`].
pub struct FrameCycle<B: FrameBackend> {
    backend: B,
    slot_count: usize,
    slot: usize,
    phase: FramePhase,
    image: u32,
    frames_submitted: u64,
    frames_skipped: u64,
}

impl<B: FrameBackend> FrameCycle<B> {
    /// # Panics
    ///
    /// Panics if `slot_count` is zero.
    pub fn new(backend: B, slot_count: usize) -> Self {
        assert!(slot_count > 0, "a frame cycle needs at least one slot");
        Self {
            backend,
            slot_count,
            slot: 0,
            phase: FramePhase::Idle,
            image: 0,
            frames_submitted: 0,
            frames_skipped: 0,
        }
    }

    /// Opens a frame.
    ///
    /// Returns `Ok(None)` when the surface turned out of date during
    /// acquisition. The swapchain has then already been rebuilt and the
    /// caller simply tries again next iteration.
    pub fn begin_frame(&mut self) -> RendererResult<Option<B::Command>> {
        if self.phase != FramePhase::Idle {
            return Err(RendererError::FrameAlreadyStarted);
        }

        let slot = self.slot;
        self.backend.wait_slot(slot)?;

        let image = match self.backend.acquire(slot)? {
            AcquireOutcome::Acquired { index, suboptimal } => {
                if suboptimal {
                    trace!("Acquired suboptimal image {}", index);
                }
                index
            }
            AcquireOutcome::OutOfDate => {
                debug!("Surface out of date at acquire, skipping frame");
                self.frames_skipped += 1;
                self.backend.recreate()?;
                return Ok(None);
            }
        };

        self.backend.reset_slot(slot)?;
        let command = self.backend.begin_commands(slot)?;

        self.image = image;
        self.phase = FramePhase::Recording;
        Ok(Some(command))
    }

    /// Transitions the targets and opens the render pass.
    pub fn begin_render(&mut self, command: &B::Command) -> RendererResult<()> {
        self.expect_phase("begin_render", FramePhase::Recording)?;
        self.check_command(command)?;
        self.backend.open_pass(self.slot, self.image)?;
        self.phase = FramePhase::Rendering;
        Ok(())
    }

    /// Closes the render pass and finishes recording.
    pub fn end_render(&mut self, command: &B::Command) -> RendererResult<()> {
        self.expect_phase("end_render", FramePhase::Rendering)?;
        self.check_command(command)?;
        self.backend.close_pass(self.slot, self.image)?;
        self.phase = FramePhase::Recorded;
        Ok(())
    }

    /// Submits, presents and advances to the next slot.
    ///
    /// A stale present or a pending window resize rebuilds the swapchain
    /// before returning.
    pub fn end_frame(&mut self) -> RendererResult<()> {
        self.expect_phase("end_frame", FramePhase::Recorded)?;

        let slot = self.slot;
        self.backend.submit(slot)?;
        let outcome = self.backend.present(slot, self.image)?;

        self.phase = FramePhase::Idle;
        self.slot = (slot + 1) % self.slot_count;
        self.frames_submitted += 1;

        let resized = self.backend.take_resize_pending();
        if outcome == PresentOutcome::Stale || resized {
            debug!(
                "Recreating swapchain after present (stale: {}, resized: {})",
                outcome == PresentOutcome::Stale,
                resized
            );
            self.backend.recreate()?;
        }
        Ok(())
    }

    fn expect_phase(&self, operation: &'static str, expected: FramePhase) -> RendererResult<()> {
        match self.phase {
            phase if phase == expected => Ok(()),
            FramePhase::Idle => Err(RendererError::FrameNotStarted { operation }),
            phase => Err(RendererError::OutOfOrder { operation, phase }),
        }
    }

    fn check_command(&self, command: &B::Command) -> RendererResult<()> {
        if self.backend.is_slot_command(self.slot, command) {
            Ok(())
        } else {
            Err(RendererError::ForeignCommandBuffer)
        }
    }

    #[inline]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Slot the next (or current) frame uses.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Presentable image of the open frame.
    pub fn image_index(&self) -> Option<u32> {
        (self.phase != FramePhase::Idle).then_some(self.image)
    }

    #[inline]
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    #[inline]
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Event {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Begin(usize),
        Open(usize, u32),
        Close(usize, u32),
        Submit(usize),
        Present(usize, u32),
        Recreate,
    }

    /// Records every backend call. Acquire and present outcomes are
    /// scripted; once the script runs out they succeed.
    #[derive(Default)]
    struct MockBackend {
        events: Vec<Event>,
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<PresentOutcome>,
        resize_pending: bool,
        next_image: u32,
        image_count: u32,
    }

    impl MockBackend {
        fn new() -> Self {
            Self {
                image_count: 3,
                ..Default::default()
            }
        }
    }

    impl FrameBackend for MockBackend {
        type Command = usize;

        fn wait_slot(&mut self, slot: usize) -> RendererResult<()> {
            self.events.push(Event::Wait(slot));
            Ok(())
        }

        fn acquire(&mut self, slot: usize) -> RendererResult<AcquireOutcome> {
            self.events.push(Event::Acquire(slot));
            if let Some(outcome) = self.acquires.pop_front() {
                return Ok(outcome);
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(AcquireOutcome::Acquired {
                index,
                suboptimal: false,
            })
        }

        fn reset_slot(&mut self, slot: usize) -> RendererResult<()> {
            self.events.push(Event::Reset(slot));
            Ok(())
        }

        fn begin_commands(&mut self, slot: usize) -> RendererResult<usize> {
            self.events.push(Event::Begin(slot));
            Ok(slot)
        }

        fn is_slot_command(&self, slot: usize, command: &usize) -> bool {
            slot == *command
        }

        fn open_pass(&mut self, slot: usize, image: u32) -> RendererResult<()> {
            self.events.push(Event::Open(slot, image));
            Ok(())
        }

        fn close_pass(&mut self, slot: usize, image: u32) -> RendererResult<()> {
            self.events.push(Event::Close(slot, image));
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> RendererResult<()> {
            self.events.push(Event::Submit(slot));
            Ok(())
        }

        fn present(&mut self, slot: usize, image: u32) -> RendererResult<PresentOutcome> {
            self.events.push(Event::Present(slot, image));
            Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
        }

        fn take_resize_pending(&mut self) -> bool {
            std::mem::take(&mut self.resize_pending)
        }

        fn recreate(&mut self) -> RendererResult<()> {
            self.events.push(Event::Recreate);
            Ok(())
        }
    }

    fn run_frame(cycle: &mut FrameCycle<MockBackend>) -> bool {
        let Some(cmd) = cycle.begin_frame().unwrap() else {
            return false;
        };
        cycle.begin_render(&cmd).unwrap();
        cycle.end_render(&cmd).unwrap();
        cycle.end_frame().unwrap();
        true
    }

    #[test]
    fn test_full_cycle_event_order() {
        let mut cycle = FrameCycle::new(MockBackend::new(), 3);
        assert!(run_frame(&mut cycle));

        assert_eq!(
            cycle.backend().events,
            vec![
                Event::Wait(0),
                Event::Acquire(0),
                Event::Reset(0),
                Event::Begin(0),
                Event::Open(0, 0),
                Event::Close(0, 0),
                Event::Submit(0),
                Event::Present(0, 0),
            ]
        );
        assert_eq!(cycle.slot(), 1);
        assert_eq!(cycle.phase(), FramePhase::Idle);
    }

    #[test]
    fn test_fence_waited_before_every_slot_reuse() {
        let mut cycle = FrameCycle::new(MockBackend::new(), 3);
        // Mix in skipped frames and recreations.
        cycle
            .backend_mut()
            .acquires
            .extend([AcquireOutcome::OutOfDate]);
        cycle
            .backend_mut()
            .presents
            .extend([PresentOutcome::Presented, PresentOutcome::Stale]);

        for _ in 0..20 {
            run_frame(&mut cycle);
        }

        // Between the last wait on a slot and any reset or begin on it there
        // must be a wait, and waits come in the same cycle as the reset.
        let events = &cycle.backend().events;
        let mut waited = [false; 3];
        for event in events {
            match *event {
                Event::Wait(slot) => waited[slot] = true,
                Event::Reset(slot) | Event::Begin(slot) => {
                    assert!(waited[slot], "slot {slot} reused without a wait");
                }
                Event::Submit(slot) => waited[slot] = false,
                _ => {}
            }
        }
    }

    #[test]
    fn test_slots_advance_round_robin() {
        let mut cycle = FrameCycle::new(MockBackend::new(), 3);
        let mut slots = Vec::new();
        for _ in 0..7 {
            slots.push(cycle.slot());
            run_frame(&mut cycle);
        }
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(cycle.frames_submitted(), 7);
    }

    #[test]
    fn test_begin_frame_twice_is_rejected() {
        let mut cycle = FrameCycle::new(MockBackend::new(), 3);
        let cmd = cycle.begin_frame().unwrap();
        assert!(cmd.is_some());

        let err = cycle.begin_frame().unwrap_err();
        assert!(matches!(err, RendererError::FrameAlreadyStarted));
        // The rejected call touched nothing.
        assert_eq!(cycle.backend().events.len(), 4);
        assert_eq!(cycle.phase(), FramePhase::Recording);
    }

    #[test]
    fn test_out_of_date_acquire_skips_then_recovers() {
        let mut cycle = FrameCycle::new(MockBackend::new(), 3);
        cycle
            .backend_mut()
            .acquires
            .push_back(AcquireOutcome::OutOfDate);

        assert!(cycle.begin_frame().unwrap().is_none());
        assert_eq!(cycle.phase(), FramePhase::Idle);
        assert_eq!(cycle.slot(), 0);
        assert_eq!(cycle.frames_skipped(), 1);
        assert_eq!(
            cycle.backend().events,
            vec![Event::Wait(0), Event::Acquire(0), Event::Recreate]
        );

        // No reset on the skipped path: the fence stays signaled, so the
        // retry's wait returns at once.
        let cmd = cycle.begin_frame().unwrap();
        assert_eq!(cmd, Some(0));
        assert_eq!(cycle.phase(), FramePhase::Recording);
    }

    #[test]
    fn test_stale_present_recreates_after_advancing() {
        let mut cycle = FrameCycle::new(MockBackend::new(), 3);
        cycle
            .backend_mut()
            .presents
            .push_back(PresentOutcome::Stale);
        run_frame(&mut cycle);

        assert_eq!(cycle.backend().events.last(), Some(&Event::Recreate));
        assert_eq!(cycle.slot(), 1);
    }

    #[test]
    fn test_resize_flag_recreates_once() {
        let mut cycle = FrameCycle::new(MockBackend::new(), 3);
        cycle.backend_mut().resize_pending = true;
        run_frame(&mut cycle);
        run_frame(&mut cycle);

        let recreations = cycle
            .backend()
            .events
            .iter()
            .filter(|e| **e == Event::Recreate)
            .count();
        assert_eq!(recreations, 1);
    }

    #[test]
    fn test_calls_outside_frame_are_rejected() {
        let mut cycle = FrameCycle::new(MockBackend::new(), 3);
        assert!(matches!(
            cycle.begin_render(&0),
            Err(RendererError::FrameNotStarted {
                operation: "begin_render"
            })
        ));
        assert!(matches!(
            cycle.end_frame(),
            Err(RendererError::FrameNotStarted { .. })
        ));
    }

    #[test]
    fn test_out_of_order_calls_are_rejected() {
        let mut cycle = FrameCycle::new(MockBackend::new(), 3);
        let cmd = cycle.begin_frame().unwrap().unwrap();

        assert!(matches!(
            cycle.end_frame(),
            Err(RendererError::OutOfOrder {
                phase: FramePhase::Recording,
                ..
            })
        ));
        assert!(matches!(
            cycle.end_render(&cmd),
            Err(RendererError::OutOfOrder { .. })
        ));

        cycle.begin_render(&cmd).unwrap();
        assert!(matches!(
            cycle.begin_render(&cmd),
            Err(RendererError::OutOfOrder {
                phase: FramePhase::Rendering,
                ..
            })
        ));
    }

    #[test]
    fn test_foreign_command_is_rejected() {
        let mut cycle = FrameCycle::new(MockBackend::new(), 3);
        cycle.begin_frame().unwrap().unwrap();
        assert!(matches!(
            cycle.begin_render(&2),
            Err(RendererError::ForeignCommandBuffer)
        ));
    }

    #[test]
    fn test_image_index_only_inside_frame() {
        let mut cycle = FrameCycle::new(MockBackend::new(), 3);
        assert_eq!(cycle.image_index(), None);
        cycle.begin_frame().unwrap();
        assert_eq!(cycle.image_index(), Some(0));
    }
}
