use crate::{io::IoRegs, Model};

/// CPU core phase within the current machine cycle. Instruction boundaries
/// occur on `Fetch`; frame emission is aligned to them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecutionState {
    Decode = 0,
    MemoryLoad = 1,
    MemoryStore = 2,
    Fetch = 3,
}

/// The owning machine, as seen from the video core.
///
/// The video core holds no back-reference to the machine; every entry point
/// that needs the CPU clock, the I/O register file or the interrupt
/// controller borrows it for the duration of the call.
pub trait Machine {
    fn io(&self) -> &IoRegs;
    fn io_mut(&mut self) -> &mut IoRegs;

    fn model(&self) -> Model;

    /// Cycles the CPU has accumulated since its last event drain.
    fn cpu_cycles(&self) -> i32;

    /// The CPU scheduler's next wake-up, in the same cycle base as
    /// [`Self::cpu_cycles`].
    fn cpu_next_event(&self) -> i32;

    fn set_cpu_next_event(&mut self, cycles: i32);

    fn execution_state(&self) -> ExecutionState;

    /// Recompute pending interrupts after the IF register changed.
    fn update_irqs(&mut self);

    fn is_double_speed(&self) -> bool {
        false
    }

    /// Whether an H-blank DMA transfer is armed (CGB, HDMA5 not 0xFF).
    fn hdma_armed(&self) -> bool {
        false
    }

    /// Transfer 16 bytes of the armed H-blank DMA on the next CPU cycle.
    fn schedule_hdma(&mut self) {}

    /// Latch the cartridge tilt sensor, when one is present.
    fn sample_tilt(&mut self) {}
}

/// Host notifications fired at frame boundaries.
///
/// `present_frame` may block for pacing; everything else must return
/// promptly. All methods are invoked with the video core in a quiescent
/// state.
pub trait FrameCallbacks {
    /// The last visible scanline of the frame has been produced.
    fn frame_ended(&mut self) {}

    /// A new frame is about to begin.
    fn frame_started(&mut self) {}

    /// Hand the completed frame to the presentation layer.
    fn present_frame(&mut self) {}

    /// Enables [`Self::push_frame`] for downstream video-stream observers.
    fn wants_frames(&self) -> bool {
        false
    }

    fn push_frame(&mut self, _pixels: &[u16], _stride: usize) {}
}

/// Default sink: every notification is dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullCallbacks;

impl FrameCallbacks for NullCallbacks {}
