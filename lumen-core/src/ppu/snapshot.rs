//! Snapshot/restore of the video core. The layout is fixed and
//! little-endian: timing words, bank and cursor state, the 64-entry palette,
//! then raw VRAM and OAM. The STAT interrupt-enable bits and the frame
//! countdown travel with the machine's own state, not here.

use crate::{
    error::Error,
    io::Reg,
    machine::Machine,
    ppu::{Lcdc, Mode, Oam, Video, Vram, PALETTE_ENTRIES},
};
use alloc::vec::Vec;

pub const SNAPSHOT_SIZE: usize =
    HEADER_SIZE + Vram::SIZE_CGB as usize + Oam::SIZE as usize;

// x, ly, next_event, event_diff, next_mode, dot_counter, frame_counter,
// bank, flags, bcp_index, ocp_index, palette
const HEADER_SIZE: usize = 2 + 2 + 4 + 4 + 4 + 4 + 4 + 1 + 1 + 2 + 2 + PALETTE_ENTRIES * 2;

const FLAG_MODE_MASK: u8 = 0x03;
const FLAG_BCP_INCREMENT: u8 = 1 << 2;
const FLAG_OCP_INCREMENT: u8 = 1 << 3;

struct Writer<'a> {
    buf: &'a mut Vec<u8>,
}

impl Writer<'_> {
    fn write_all(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn write_u16(&mut self, val: u16) {
        self.write_all(&val.to_le_bytes());
    }

    fn write_i32(&mut self, val: i32) {
        self.write_all(&val.to_le_bytes());
    }

    fn write_u32(&mut self, val: u32) {
        self.write_all(&val.to_le_bytes());
    }
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn read_exact(&mut self, out: &mut [u8]) {
        let (head, tail) = self.data.split_at(out.len());
        out.copy_from_slice(head);
        self.data = tail;
    }

    fn read_slice(&mut self, len: usize) -> &'a [u8] {
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        head
    }

    fn read_u8(&mut self) -> u8 {
        let mut buf = [0; 1];
        self.read_exact(&mut buf);
        buf[0]
    }

    fn read_u16(&mut self) -> u16 {
        let mut buf = [0; 2];
        self.read_exact(&mut buf);
        u16::from_le_bytes(buf)
    }

    fn read_i32(&mut self) -> i32 {
        let mut buf = [0; 4];
        self.read_exact(&mut buf);
        i32::from_le_bytes(buf)
    }

    fn read_u32(&mut self) -> u32 {
        let mut buf = [0; 4];
        self.read_exact(&mut buf);
        u32::from_le_bytes(buf)
    }
}

impl Video {
    pub fn save_state(&self, buf: &mut Vec<u8>) {
        let mut w = Writer { buf };

        w.write_u16(self.x as u16);
        w.write_u16(u16::from(self.ly));
        w.write_i32(self.next_event);
        w.write_i32(self.event_diff);
        w.write_i32(self.next_mode);
        w.write_i32(self.dot_counter);
        w.write_u32(self.frame_counter);
        w.write_all(&[self.vram.current_bank()]);

        let mut flags = self.mode as u8;
        if self.palette.increment_enabled(false) {
            flags |= FLAG_BCP_INCREMENT;
        }
        if self.palette.increment_enabled(true) {
            flags |= FLAG_OCP_INCREMENT;
        }
        w.write_all(&[flags]);

        w.write_u16(u16::from(self.palette.index(false)));
        w.write_u16(u16::from(self.palette.index(true)));
        for entry in self.palette.entries() {
            w.write_u16(*entry);
        }

        w.write_all(self.vram.bytes());
        w.write_all(self.oam.bytes());
    }

    /// Restore a snapshot taken by [`Self::save_state`]. Replays palette
    /// notifications into the renderer, reselects the VRAM bank and re-runs
    /// the OAM scan for the restored line.
    pub fn load_state<M: Machine>(&mut self, mach: &mut M, data: &[u8]) -> Result<(), Error> {
        if data.len() != SNAPSHOT_SIZE {
            return Err(Error::SnapshotSizeDifferentThanExpected {
                expected: SNAPSHOT_SIZE,
                actual: data.len(),
            });
        }

        let mut r = Reader { data };

        self.x = i32::from(r.read_u16());
        self.ly = r.read_u16() as u8;
        self.next_event = r.read_i32();
        self.event_diff = r.read_i32();
        self.next_mode = r.read_i32();
        self.dot_counter = r.read_i32();
        self.frame_counter = r.read_u32();
        let bank = r.read_u8();

        let flags = r.read_u8();
        self.mode = Mode::from_bits(flags & FLAG_MODE_MASK);
        let bcp_increment = flags & FLAG_BCP_INCREMENT != 0;
        let ocp_increment = flags & FLAG_OCP_INCREMENT != 0;
        let bcp_index = r.read_u16() as u8;
        let ocp_index = r.read_u16() as u8;
        self.palette
            .restore_cursors(bcp_index, bcp_increment, ocp_index, ocp_increment);

        for i in 0..PALETTE_ENTRIES {
            let entry = r.read_u16();
            self.palette.set_entry(i as u8, entry);
            self.renderer.write_palette(i as u8, entry);
        }

        self.vram.bytes_mut().copy_from_slice(r.read_slice(Vram::SIZE_CGB as usize));
        self.vram.select_bank(bank);
        self.oam.bytes_mut().copy_from_slice(r.read_slice(Oam::SIZE as usize));

        self.stat.set_mode(self.mode);
        mach.io_mut().write(Reg::Stat, self.stat.bits());
        let visible_ly = if self.ly <= 153 { self.ly } else { 0 };
        mach.io_mut().write(Reg::Ly, visible_ly);

        let lcdc = Lcdc::from_bits_truncate(mach.io().read(Reg::Lcdc));
        self.scan_oam(lcdc);

        Ok(())
    }
}
