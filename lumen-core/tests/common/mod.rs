//! Shared scaffolding for the timing and snapshot suites: a scripted
//! machine and renderers/callbacks that log every call they receive.
#![allow(dead_code)]

use lumen_core::{
    ExecutionState, FrameCallbacks, IoRegs, Machine, Model, Reg, Renderer, Source, Sprite, Video,
};
use std::{cell::RefCell, rc::Rc, vec::Vec};

pub struct TestMachine {
    pub io: IoRegs,
    pub model: Model,
    pub double_speed: bool,
    pub cycles: i32,
    pub next_event: i32,
    pub state: ExecutionState,
    pub irq_updates: u32,
    pub hdma_armed: bool,
    pub hdma_requests: u32,
    pub tilt_samples: u32,
}

impl TestMachine {
    pub fn new(model: Model) -> Self {
        Self {
            io: IoRegs::default(),
            model,
            double_speed: false,
            cycles: 0,
            next_event: i32::MAX,
            state: ExecutionState::Fetch,
            irq_updates: 0,
            hdma_armed: false,
            hdma_requests: 0,
            tilt_samples: 0,
        }
    }

    pub fn dmg() -> Self {
        Self::new(Model::Dmg)
    }

    pub fn cgb() -> Self {
        Self::new(Model::Cgb)
    }

    pub fn clear_if(&mut self) {
        self.io.write(Reg::If, 0);
    }

    pub fn if_bits(&self) -> u8 {
        self.io.read(Reg::If)
    }
}

impl Machine for TestMachine {
    fn io(&self) -> &IoRegs {
        &self.io
    }

    fn io_mut(&mut self) -> &mut IoRegs {
        &mut self.io
    }

    fn model(&self) -> Model {
        self.model
    }

    fn cpu_cycles(&self) -> i32 {
        self.cycles
    }

    fn cpu_next_event(&self) -> i32 {
        self.next_event
    }

    fn set_cpu_next_event(&mut self, cycles: i32) {
        self.next_event = cycles;
    }

    fn execution_state(&self) -> ExecutionState {
        self.state
    }

    fn update_irqs(&mut self) {
        self.irq_updates += 1;
    }

    fn is_double_speed(&self) -> bool {
        self.double_speed
    }

    fn hdma_armed(&self) -> bool {
        self.hdma_armed
    }

    fn schedule_hdma(&mut self) {
        self.hdma_requests += 1;
    }

    fn sample_tilt(&mut self) {
        self.tilt_samples += 1;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderEvent {
    Init(Model),
    Deinit,
    Register(Reg, u8),
    Vram(u16),
    Palette(u8, u16),
    Draw {
        start_x: u8,
        end_x: u8,
        y: u8,
        sprites: usize,
    },
    Scanline(u8),
    Frame,
    PutPixels(usize),
}

#[derive(Clone, Default)]
pub struct RenderLog(Rc<RefCell<Vec<RenderEvent>>>);

impl RenderLog {
    pub fn take(&self) -> Vec<RenderEvent> {
        self.0.borrow_mut().drain(..).collect()
    }

    pub fn count<F: Fn(&RenderEvent) -> bool>(&self, pred: F) -> usize {
        self.0.borrow().iter().filter(|e| pred(e)).count()
    }
}

/// Renderer that records every call. The backbuffer is a constant pattern so
/// `get_pixels` has something to hand out.
pub struct RecordingRenderer {
    log: Rc<RefCell<Vec<RenderEvent>>>,
    pixels: Vec<u16>,
}

impl RecordingRenderer {
    pub fn new() -> (Box<Self>, RenderLog) {
        let log = RenderLog::default();
        let renderer = Box::new(Self {
            log: Rc::clone(&log.0),
            pixels: vec![0x7FFF; 160 * 144],
        });
        (renderer, log)
    }

    fn push(&self, event: RenderEvent) {
        self.log.borrow_mut().push(event);
    }
}

impl Renderer for RecordingRenderer {
    fn init(&mut self, model: Model) {
        self.push(RenderEvent::Init(model));
    }

    fn deinit(&mut self) {
        self.push(RenderEvent::Deinit);
    }

    fn write_video_register(&mut self, reg: Reg, value: u8) -> u8 {
        self.push(RenderEvent::Register(reg, value));
        value
    }

    fn write_vram(&mut self, offset: u16) {
        self.push(RenderEvent::Vram(offset));
    }

    fn write_palette(&mut self, index: u8, value: u16) {
        self.push(RenderEvent::Palette(index, value));
    }

    fn draw_range(&mut self, _src: Source<'_>, start_x: u8, end_x: u8, y: u8, sprites: &[Sprite]) {
        self.push(RenderEvent::Draw {
            start_x,
            end_x,
            y,
            sprites: sprites.len(),
        });
    }

    fn finish_scanline(&mut self, _src: Source<'_>, y: u8) {
        self.push(RenderEvent::Scanline(y));
    }

    fn finish_frame(&mut self) {
        self.push(RenderEvent::Frame);
    }

    fn get_pixels(&self) -> Option<(usize, &[u16])> {
        Some((160, &self.pixels))
    }

    fn put_pixels(&mut self, stride: usize, pixels: &[u16]) {
        self.pixels.clear();
        self.pixels.extend_from_slice(pixels);
        self.push(RenderEvent::PutPixels(stride));
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameEvent {
    Ended,
    Started,
    Presented,
    Pushed(usize),
}

#[derive(Clone, Default)]
pub struct FrameLog(Rc<RefCell<Vec<FrameEvent>>>);

impl FrameLog {
    pub fn take(&self) -> Vec<FrameEvent> {
        self.0.borrow_mut().drain(..).collect()
    }

    pub fn count(&self, event: &FrameEvent) -> usize {
        self.0.borrow().iter().filter(|e| *e == event).count()
    }
}

pub struct RecordingCallbacks {
    log: Rc<RefCell<Vec<FrameEvent>>>,
    wants_frames: bool,
}

impl RecordingCallbacks {
    pub fn new(wants_frames: bool) -> (Box<Self>, FrameLog) {
        let log = FrameLog::default();
        let callbacks = Box::new(Self {
            log: Rc::clone(&log.0),
            wants_frames,
        });
        (callbacks, log)
    }
}

impl FrameCallbacks for RecordingCallbacks {
    fn frame_ended(&mut self) {
        self.log.borrow_mut().push(FrameEvent::Ended);
    }

    fn frame_started(&mut self) {
        self.log.borrow_mut().push(FrameEvent::Started);
    }

    fn present_frame(&mut self) {
        self.log.borrow_mut().push(FrameEvent::Presented);
    }

    fn wants_frames(&self) -> bool {
        self.wants_frames
    }

    fn push_frame(&mut self, pixels: &[u16], stride: usize) {
        assert_eq!(pixels.len(), 160 * 144);
        self.log.borrow_mut().push(FrameEvent::Pushed(stride));
    }
}

/// Recorded video core with LCD still off.
pub fn recorded_video(mach: &TestMachine) -> (Video, RenderLog, FrameLog) {
    let (callbacks, frames) = RecordingCallbacks::new(true);
    let mut video = Video::new(callbacks);
    let (renderer, log) = RecordingRenderer::new();
    video.attach_renderer(renderer, mach.model);
    (video, log, frames)
}

pub fn enable_lcd(video: &mut Video, mach: &mut TestMachine) {
    video.write_register(mach, Reg::Lcdc, 0x91);
}

/// Step one dot at a time.
pub fn step_dots(video: &mut Video, mach: &mut TestMachine, dots: i32) {
    for _ in 0..dots {
        video.process_events(mach, 1);
    }
}

/// Dots spent until the mode changes, bounded by `limit`.
pub fn dots_until_mode_change(video: &mut Video, mach: &mut TestMachine, limit: i32) -> i32 {
    let start = video.mode();
    for n in 1..=limit {
        video.process_events(mach, 1);
        if video.mode() != start {
            return n;
        }
    }
    panic!("mode {start:?} never changed within {limit} dots");
}

/// Step until the video core reports `mode` (asserting it happens within
/// `limit` dots).
pub fn run_until_mode(
    video: &mut Video,
    mach: &mut TestMachine,
    mode: lumen_core::Mode,
    limit: i32,
) {
    for _ in 0..limit {
        if video.mode() == mode {
            return;
        }
        video.process_events(mach, 1);
    }
    panic!("mode {mode:?} not reached within {limit} dots");
}
