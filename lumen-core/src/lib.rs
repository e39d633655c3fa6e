#![no_std]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::similar_names)]

extern crate alloc;

pub use {
    error::Error,
    io::{IoRegs, Reg},
    machine::{ExecutionState, FrameCallbacks, Machine, NullCallbacks},
    ppu::{
        decode_dmg, Lcdc, Mode, NullRenderer, Oam, PaletteRam, Renderer, Source, Sprite,
        SpriteFlags, Stat, TileCache, Video, Vram, DMG_COLORS, FRAME_DOTS, LINE_DOTS,
        PALETTE_ENTRIES, PX_HEIGHT, PX_WIDTH, SNAPSHOT_SIZE,
    },
};

mod error;
mod io;
mod machine;
mod ppu;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Model {
    Dmg,
    Mgb,
    Cgb,
}

impl Model {
    #[must_use]
    pub const fn is_cgb(self) -> bool {
        matches!(self, Self::Cgb)
    }
}
