mod oam;
mod palette;
mod renderer;
mod snapshot;
mod vram;

pub use oam::{Oam, Sprite, SpriteFlags};
pub use palette::{decode_dmg, PaletteRam, DMG_COLORS, PALETTE_ENTRIES};
pub use renderer::{NullRenderer, Renderer, Source, TileCache};
pub use snapshot::SNAPSHOT_SIZE;
pub use vram::Vram;

use crate::{
    io::Reg,
    machine::{ExecutionState, FrameCallbacks, Machine},
    Model,
};
use alloc::boxed::Box;
use bitflags::bitflags;
use palette::OBJ_PALETTE_BASE;

pub const PX_WIDTH: u8 = 160;
pub const PX_HEIGHT: u8 = 144;

pub const LINE_DOTS: i32 = 456;
pub const FRAME_DOTS: i32 = 70224;

const VISIBLE_LINES: u8 = 144;
const TOTAL_LINES: u8 = 154;

const OAM_SCAN_DOTS: i32 = 80;
const DRAWING_DOTS_BASE: i32 = 172;
const HBLANK_DOTS_BASE: i32 = 204;
const OBJ_PENALTY_DOTS: i32 = 11;
// Matches measured load/store timing on hardware; origin unclear.
const ENABLE_SKEW_DOTS: i32 = 5;

// Countdown sentinels. `UNSCHEDULED` countdowns are never decremented, so
// they cannot underflow.
const UNSCHEDULED: i32 = i32::MAX;
const NOT_SLICING: i32 = i32::MIN;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Lcdc: u8 {
        const BG_ENABLE       = 1;
        const OBJ_ENABLE      = 1 << 1;
        const OBJ_SIZE        = 1 << 2;
        const BG_MAP_AREA     = 1 << 3;
        const BG_TILE_DATA    = 1 << 4;
        const WINDOW_ENABLE   = 1 << 5;
        const WINDOW_MAP_AREA = 1 << 6;
        const LCD_ENABLE      = 1 << 7;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Stat: u8 {
        const MODE_LOW                = 1;
        const MODE_HIGH               = 1 << 1;
        const LY_EQUALS_LYC           = 1 << 2;
        const HBLANK_INTERRUPT        = 1 << 3;
        const VBLANK_INTERRUPT        = 1 << 4;
        const OAM_INTERRUPT           = 1 << 5;
        const LY_EQUALS_LYC_INTERRUPT = 1 << 6;
    }
}

impl Stat {
    fn set_mode(&mut self, mode: Mode) {
        *self = Self::from_bits_truncate((self.bits() & !3) | mode as u8);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    HBlank = 0,
    #[default]
    VBlank = 1,
    OamScan = 2,
    Drawing = 3,
}

impl Mode {
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => Self::HBlank,
            1 => Self::VBlank,
            2 => Self::OamScan,
            _ => Self::Drawing,
        }
    }
}

pub struct Video {
    ly: u8,
    x: i32,
    mode: Mode,
    stat: Stat,
    next_event: i32,
    event_diff: i32,
    next_mode: i32,
    next_frame: i32,
    dot_counter: i32,
    frame_counter: u32,
    frameskip: i32,
    frameskip_counter: i32,
    // latched at V-blank entry; the frameskip counter has already been
    // reloaded for the next frame by the time the rollover fires
    frame_drawn: bool,
    vram: Vram,
    oam: Oam,
    line_sprites: heapless::Vec<Sprite, 10>,
    palette: PaletteRam,
    renderer: Box<dyn Renderer>,
    callbacks: Box<dyn FrameCallbacks>,
}

impl Video {
    #[must_use]
    pub fn new(callbacks: Box<dyn FrameCallbacks>) -> Self {
        Self {
            ly: 0,
            x: 0,
            mode: Mode::VBlank,
            stat: Stat::MODE_LOW,
            next_event: UNSCHEDULED,
            event_diff: 0,
            next_mode: UNSCHEDULED,
            next_frame: UNSCHEDULED,
            dot_counter: NOT_SLICING,
            frame_counter: 0,
            frameskip: 0,
            frameskip_counter: 0,
            frame_drawn: false,
            vram: Vram::default(),
            oam: Oam::default(),
            line_sprites: heapless::Vec::new(),
            palette: PaletteRam::default(),
            renderer: Box::new(NullRenderer::default()),
            callbacks,
        }
    }

    pub fn reset(&mut self, model: Model) {
        self.ly = 0;
        self.x = 0;
        self.mode = Mode::VBlank;
        self.stat = Stat::MODE_LOW;
        self.next_event = UNSCHEDULED;
        self.event_diff = 0;
        self.next_mode = UNSCHEDULED;
        self.next_frame = UNSCHEDULED;
        self.dot_counter = NOT_SLICING;
        self.frame_counter = 0;
        self.frameskip_counter = 0;
        self.frame_drawn = false;
        self.vram = Vram::default();
        self.oam = Oam::default();
        self.line_sprites.clear();
        self.palette = PaletteRam::default();
        self.renderer.deinit();
        self.renderer.init(model);
    }

    pub fn attach_renderer(&mut self, mut renderer: Box<dyn Renderer>, model: Model) {
        self.renderer.deinit();
        if let Some(cache) = self.renderer.take_cache() {
            renderer.set_cache(cache);
        }
        self.renderer = renderer;
        self.renderer.init(model);
    }

    pub fn detach_renderer(&mut self, model: Model) {
        self.attach_renderer(Box::new(NullRenderer::default()), model);
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// The internal line counter. During the tail of V-blank this can run
    /// one past the last line number while the LY register already reads 0.
    #[must_use]
    pub const fn ly(&self) -> u8 {
        self.ly
    }

    #[must_use]
    pub const fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    pub const fn set_frameskip(&mut self, skip: i32) {
        self.frameskip = skip;
    }

    #[must_use]
    pub const fn frameskip(&self) -> i32 {
        self.frameskip
    }

    #[must_use]
    pub const fn palette(&self) -> &PaletteRam {
        &self.palette
    }

    /// The bound renderer; the null renderer when none is attached.
    #[must_use]
    pub fn renderer(&self) -> &dyn Renderer {
        &*self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut dyn Renderer {
        &mut *self.renderer
    }

    const fn skipping(&self) -> bool {
        self.frameskip_counter > 0
    }

    /// Drive the core by `cycles` elapsed system ticks. Returns the relative
    /// cycle count after which it must be invoked again; calling earlier is
    /// harmless.
    pub fn process_events<M: Machine>(&mut self, mach: &mut M, cycles: i32) -> i32 {
        self.event_diff += cycles;
        if self.next_event != UNSCHEDULED {
            self.next_event -= cycles;
        }
        if self.next_event > 0 {
            return self.next_event;
        }

        if self.next_mode != UNSCHEDULED {
            self.next_mode -= self.event_diff;
        }
        if self.next_frame != UNSCHEDULED {
            self.next_frame -= self.event_diff;
        }
        self.next_event = UNSCHEDULED;

        self.process_dots(mach);

        if self.next_mode <= 0 {
            self.advance_mode(mach);
        }
        if self.next_frame <= 0 {
            self.complete_frame(mach);
        }
        if self.next_mode < self.next_event {
            self.next_event = self.next_mode;
        }
        self.event_diff = 0;
        self.next_event
    }

    fn advance_mode<M: Machine>(&mut self, mach: &mut M) {
        let lyc = mach.io().read(Reg::Lyc);

        match self.mode {
            Mode::HBlank => {
                if !self.skipping() {
                    let src = Source {
                        vram: &self.vram,
                        oam: &self.oam,
                        palette: self.palette.entries(),
                    };
                    self.renderer.finish_scanline(src, self.ly);
                }
                self.ly += 1;
                mach.io_mut().write(Reg::Ly, self.ly);
                self.stat.set(Stat::LY_EQUALS_LYC, lyc == self.ly);

                if self.ly < VISIBLE_LINES {
                    self.next_mode = OAM_SCAN_DOTS + i32::from(mach.io().read(Reg::Scx) & 7);
                    self.mode = Mode::OamScan;
                    // OAM interrupt is masked by an armed H-blank interrupt
                    // on this edge
                    if !self.stat.contains(Stat::HBLANK_INTERRUPT)
                        && self.stat.contains(Stat::OAM_INTERRUPT)
                    {
                        mach.io_mut().request_lcd();
                    }
                } else {
                    self.next_mode = LINE_DOTS;
                    self.mode = Mode::VBlank;
                    self.next_frame = 0;
                    self.frame_drawn = !self.skipping();
                    if self
                        .stat
                        .intersects(Stat::VBLANK_INTERRUPT | Stat::OAM_INTERRUPT)
                    {
                        mach.io_mut().request_lcd();
                    }
                    mach.io_mut().request_vblank();
                    self.callbacks.frame_ended();
                }
                if self.stat.contains(Stat::LY_EQUALS_LYC_INTERRUPT) && lyc == self.ly {
                    mach.io_mut().request_lcd();
                }
                mach.update_irqs();
            }
            Mode::VBlank => {
                self.ly += 1;
                if self.ly == TOTAL_LINES + 1 {
                    self.ly = 0;
                    mach.io_mut().write(Reg::Ly, 0);
                    self.next_mode = OAM_SCAN_DOTS + i32::from(mach.io().read(Reg::Scx) & 7);
                    self.mode = Mode::OamScan;
                    if self.stat.contains(Stat::OAM_INTERRUPT) {
                        mach.io_mut().request_lcd();
                        mach.update_irqs();
                    }
                    if self.frame_drawn {
                        self.renderer.finish_frame();
                    }
                    mach.sample_tilt();
                } else {
                    if self.ly == TOTAL_LINES {
                        // LY already reads 0 for the rest of the last line
                        mach.io_mut().write(Reg::Ly, 0);
                        self.next_mode = LINE_DOTS - 8;
                    } else if self.ly == TOTAL_LINES - 1 {
                        mach.io_mut().write(Reg::Ly, self.ly);
                        self.next_mode = 8;
                    } else {
                        mach.io_mut().write(Reg::Ly, self.ly);
                        self.next_mode = LINE_DOTS;
                    }

                    let visible = mach.io().read(Reg::Ly);
                    self.stat.set(Stat::LY_EQUALS_LYC, lyc == visible);
                    if self.stat.contains(Stat::LY_EQUALS_LYC_INTERRUPT) && lyc == visible {
                        mach.io_mut().request_lcd();
                        mach.update_irqs();
                    }
                }
            }
            Mode::OamScan => {
                let lcdc = Lcdc::from_bits_truncate(mach.io().read(Reg::Lcdc));
                self.scan_oam(lcdc);
                self.dot_counter = 0;
                self.next_event = LINE_DOTS;
                self.x = 0;
                self.next_mode = DRAWING_DOTS_BASE
                    + self.line_sprites.len() as i32 * OBJ_PENALTY_DOTS
                    - i32::from(mach.io().read(Reg::Scx) & 7);
                self.mode = Mode::Drawing;
            }
            Mode::Drawing => {
                self.next_mode =
                    HBLANK_DOTS_BASE - self.line_sprites.len() as i32 * OBJ_PENALTY_DOTS;
                self.mode = Mode::HBlank;
                if self.stat.contains(Stat::HBLANK_INTERRUPT) {
                    mach.io_mut().request_lcd();
                    mach.update_irqs();
                }
                if self.ly < VISIBLE_LINES && mach.hdma_armed() {
                    mach.schedule_hdma();
                }
            }
        }

        self.stat.set_mode(self.mode);
        mach.io_mut().write(Reg::Stat, self.stat.bits());
    }

    /// Advance the horizontal pixel cursor and ask the renderer for the
    /// newly covered columns. Active only while mode 3 is slicing.
    fn process_dots<M: Machine>(&mut self, mach: &M) {
        if !matches!(self.mode, Mode::Drawing) || self.dot_counter < 0 {
            return;
        }

        let old_x = self.x;
        let mut x = self.dot_counter
            + self.event_diff
            + (mach.cpu_cycles() >> i32::from(mach.is_double_speed()));
        if x > i32::from(PX_WIDTH) {
            x = i32::from(PX_WIDTH);
        } else if x < 0 {
            log::error!("video dot clock went negative");
            x = old_x;
        }
        self.x = x;
        if self.x == i32::from(PX_WIDTH) {
            self.dot_counter = NOT_SLICING;
        }
        if !self.skipping() {
            let src = Source {
                vram: &self.vram,
                oam: &self.oam,
                palette: self.palette.entries(),
            };
            self.renderer
                .draw_range(src, old_x as u8, self.x as u8, self.ly, &self.line_sprites);
        }
    }

    /// Emit the finished frame, aligned to the CPU's instruction-fetch
    /// boundary.
    fn complete_frame<M: Machine>(&mut self, mach: &mut M) {
        let state = mach.execution_state();
        if matches!(state, ExecutionState::Fetch) {
            self.next_frame = FRAME_DOTS;
            self.next_event = FRAME_DOTS;

            self.frameskip_counter -= 1;
            if self.frameskip_counter < 0 {
                self.callbacks.present_frame();
                self.frameskip_counter = self.frameskip;

                if self.callbacks.wants_frames() {
                    if let Some((stride, pixels)) = self.renderer.get_pixels() {
                        self.callbacks.push_frame(pixels, stride);
                    }
                }
            }
            self.frame_counter = self.frame_counter.wrapping_add(1);
            self.callbacks.frame_started();
        } else {
            self.next_frame = 4 - ((state as i32 + 1) & 3);
            if self.next_frame < self.next_event {
                self.next_event = self.next_frame;
            }
        }
    }

    /// Route a register byte through the renderer's observation hook, run
    /// the register-specific handler and store the I/O shadow.
    pub fn write_register<M: Machine>(&mut self, mach: &mut M, reg: Reg, val: u8) {
        let val = self.renderer.write_video_register(reg, val);

        match reg {
            Reg::Lcdc => {
                self.write_lcdc(mach, val);
                mach.io_mut().write(Reg::Lcdc, val);
            }
            Reg::Stat => self.write_stat(mach, val),
            Reg::Lyc => {
                self.write_lyc(mach, val);
                mach.io_mut().write(Reg::Lyc, val);
            }
            Reg::Scy | Reg::Scx | Reg::Wy | Reg::Wx => mach.io_mut().write(reg, val),
            Reg::Bgp | Reg::Obp0 | Reg::Obp1 => {
                self.write_dmg_palette(mach, reg, val);
                mach.io_mut().write(reg, val);
            }
            Reg::Vbk if mach.model().is_cgb() => {
                self.vram.select_bank(val);
                mach.io_mut().write(Reg::Vbk, self.vram.read_vbk());
            }
            Reg::Bcps | Reg::Ocps if mach.model().is_cgb() => {
                self.write_palette_spec(mach, reg, val);
            }
            Reg::Bcpd | Reg::Ocpd if mach.model().is_cgb() => {
                self.write_palette_data(mach, reg, val);
            }
            Reg::Opri if mach.model().is_cgb() => mach.io_mut().write(Reg::Opri, val),
            _ => (),
        }
    }

    fn write_lcdc<M: Machine>(&mut self, mach: &mut M, val: u8) {
        let old = Lcdc::from_bits_truncate(mach.io().read(Reg::Lcdc));
        let new = Lcdc::from_bits_truncate(val);
        let double_shift = i32::from(mach.is_double_speed());

        if !old.contains(Lcdc::LCD_ENABLE) && new.contains(Lcdc::LCD_ENABLE) {
            self.mode = Mode::OamScan;
            self.next_mode = OAM_SCAN_DOTS - ENABLE_SKEW_DOTS;
            self.next_event = self.next_mode;
            self.event_diff = (-mach.cpu_cycles()) >> double_shift;
            self.ly = 0;
            mach.io_mut().write(Reg::Ly, 0);

            self.stat.set_mode(Mode::OamScan);
            let lyc = mach.io().read(Reg::Lyc);
            self.stat.set(Stat::LY_EQUALS_LYC, self.ly == lyc);
            if self.stat.contains(Stat::LY_EQUALS_LYC_INTERRUPT) && self.ly == lyc {
                mach.io_mut().request_lcd();
                mach.update_irqs();
            }
            mach.io_mut().write(Reg::Stat, self.stat.bits());

            let wake = mach.cpu_cycles() + (self.next_event << double_shift);
            if wake < mach.cpu_next_event() {
                mach.set_cpu_next_event(wake);
            }
        } else if old.contains(Lcdc::LCD_ENABLE) && !new.contains(Lcdc::LCD_ENABLE) {
            self.mode = Mode::HBlank;
            self.next_mode = UNSCHEDULED;
            self.next_event = self.next_frame;
            self.stat.set_mode(Mode::HBlank);
            mach.io_mut().write(Reg::Stat, self.stat.bits());
            self.ly = 0;
            mach.io_mut().write(Reg::Ly, 0);
        }
    }

    fn write_stat<M: Machine>(&mut self, mach: &mut M, val: u8) {
        self.stat = Stat::from_bits_truncate((self.stat.bits() & 0x07) | (val & 0x78));
        // Writing STAT on the original model spuriously raises the LCD
        // interrupt during V-blank
        if matches!(mach.model(), Model::Dmg) && matches!(self.mode, Mode::VBlank) {
            mach.io_mut().request_lcd();
            mach.update_irqs();
        }
        mach.io_mut().write(Reg::Stat, self.stat.bits());
    }

    fn write_lyc<M: Machine>(&mut self, mach: &mut M, val: u8) {
        if matches!(self.mode, Mode::OamScan) {
            self.stat.set(Stat::LY_EQUALS_LYC, val == self.ly);
            if self.stat.contains(Stat::LY_EQUALS_LYC_INTERRUPT) && val == self.ly {
                mach.io_mut().request_lcd();
                mach.update_irqs();
            }
            mach.io_mut().write(Reg::Stat, self.stat.bits());
        }
    }

    fn write_dmg_palette<M: Machine>(&mut self, mach: &M, reg: Reg, val: u8) {
        if mach.model().is_cgb() {
            return;
        }

        let base = match reg {
            Reg::Obp0 => OBJ_PALETTE_BASE,
            Reg::Obp1 => OBJ_PALETTE_BASE + 4,
            _ => 0,
        };
        for (i, color) in decode_dmg(val).into_iter().enumerate() {
            let index = base + i as u8;
            self.palette.set_entry(index, color);
            self.renderer.write_palette(index, color);
        }
    }

    fn write_palette_spec<M: Machine>(&mut self, mach: &mut M, reg: Reg, val: u8) {
        let obj = matches!(reg, Reg::Ocps);
        self.palette.set_spec(obj, val);
        mach.io_mut().write(reg, val);

        let data_reg = if obj { Reg::Ocpd } else { Reg::Bcpd };
        mach.io_mut().write(data_reg, self.palette.readback(obj));
    }

    fn write_palette_data<M: Machine>(&mut self, mach: &mut M, reg: Reg, val: u8) {
        let obj = matches!(reg, Reg::Ocpd);
        let (index, color) = self.palette.write_data(obj, val);
        self.renderer.write_palette(index, color);

        let spec_reg = if obj { Reg::Ocps } else { Reg::Bcps };
        let spec = mach.io().read(spec_reg);
        mach.io_mut()
            .write(spec_reg, (spec & 0x80) | self.palette.index(obj));
        mach.io_mut().write(reg, self.palette.readback(obj));
    }

    #[cfg(test)]
    pub(crate) fn set_line_for_test(&mut self, ly: u8) {
        self.ly = ly;
    }
}
