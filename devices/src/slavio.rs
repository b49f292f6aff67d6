// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! SPARC SLAVIO interrupt controller: a per-CPU MMIO window plus a master
//! window multiplexing 32 system-wide interrupt sources toward up to 16
//! virtual CPUs, each steered to one of 15 PIL lines.

use remain::sorted;
use thiserror::Error;

use crate::BusAccessInfo;
use crate::BusDevice;
use crate::Suspendable;

pub const MAX_CPUS: usize = 16;
const TARGET_PAGE_SIZE: u64 = 4096;
/// Per-CPU window size (register offsets 0x0..0xF).
#[allow(dead_code)]
const INTCTL_SIZE: u64 = 0x10;
/// Master window size (register offsets 0x0..0x13).
#[allow(dead_code)]
const INTCTLM_SIZE: u64 = 0x14;
const SNAPSHOT_VERSION: u32 = 1;

#[sorted]
#[derive(Error, Debug)]
pub enum Error {
    #[error("slavio_intctl snapshot has unsupported version {0}, expected {SNAPSHOT_VERSION}")]
    InvalidSnapshotVersion(u32),
}

pub type Result<T> = std::result::Result<T, Error>;

/// `cpu = (addr >> 12) & (MAX_CPUS - 1)`, the corrected decode. The
/// original multiplies before masking (`addr & (MAX_CPUS-1)*TARGET_PAGE_SIZE`),
/// which only matches this formula for `MAX_CPUS==16`, `TARGET_PAGE_SIZE==4096`
/// (see the regression test below).
fn decode_percpu(addr: u64) -> usize {
    ((addr >> 12) & (MAX_CPUS as u64 - 1)) as usize
}

/// `(cpu, pil, asserted)` on every `pil_out` transition.
type IrqObserver = Box<dyn FnMut(usize, u32, bool)>;

pub struct SlavioState {
    intreg_pending: [u32; MAX_CPUS],
    intregm_pending: u32,
    intregm_disabled: u32,
    target_cpu: u32,
    intbit_to_level: [u32; 32],
    cputimer_bit: u32,
    pil_out: [u32; MAX_CPUS],
    irq_observer: Option<IrqObserver>,
}

impl SlavioState {
    /// `cputimer` names the system interrupt bit whose level maps to the
    /// per-CPU local-timer bit; `cputimer_bit` is derived from it once here,
    /// matching the original's one-time `1 << intbit_to_level[cputimer]`.
    pub fn new(intbit_to_level: [u32; 32], cputimer: usize) -> Self {
        let cputimer_bit = 1 << intbit_to_level[cputimer];
        let mut s = SlavioState {
            intreg_pending: [0; MAX_CPUS],
            intregm_pending: 0,
            intregm_disabled: 0,
            target_cpu: 0,
            intbit_to_level,
            cputimer_bit,
            pil_out: [0; MAX_CPUS],
            irq_observer: None,
        };
        s.reset();
        s
    }

    pub fn set_irq_observer(&mut self, f: impl FnMut(usize, u32, bool) + 'static) {
        self.irq_observer = Some(Box::new(f));
    }

    pub fn pil_out(&self, cpu: usize) -> u32 {
        self.pil_out[cpu]
    }

    fn raise_pil(&mut self, cpu: usize, pil: u32) {
        let old = self.pil_out[cpu];
        if old == pil {
            return;
        }
        if old != 0 {
            if let Some(obs) = self.irq_observer.as_mut() {
                obs(cpu, old, false);
            }
        }
        self.pil_out[cpu] = pil;
        if pil != 0 {
            if let Some(obs) = self.irq_observer.as_mut() {
                obs(cpu, pil, true);
            }
        }
    }

    /// `slavio_check_interrupts`: recomputes, for every CPU, the single
    /// highest PIL among the master bits it is the target of and its own
    /// local (softint/timer) bits 17..31, and raises that one.
    pub fn check_interrupts(&mut self) {
        let pending = self.intregm_pending & !self.intregm_disabled;
        for i in 0..MAX_CPUS {
            let mut max = 0u32;
            if i as u32 == self.target_cpu && self.intregm_disabled & 0x8000_0000 == 0 && pending != 0
            {
                for j in 0..32 {
                    if pending & (1 << j) != 0 {
                        max = max.max(self.intbit_to_level[j]);
                    }
                }
            }
            for j in 17..32 {
                if self.intreg_pending[i] & (1 << j) != 0 {
                    max = max.max(j - 16);
                }
            }
            self.raise_pil(i, max);
        }
    }

    /// Device-side `set_irq(bit, level)`. `bit` must be in `[0,31]`.
    pub fn set_irq(&mut self, bit: u32, level: u32) {
        let pil = self.intbit_to_level[bit as usize];
        if pil == 0 {
            return;
        }
        let mask = 1u32 << bit;
        let target = self.target_cpu as usize;
        if level != 0 {
            self.intregm_pending |= mask;
            self.intreg_pending[target] |= 1 << pil;
        } else {
            self.intregm_pending &= !mask;
            self.intreg_pending[target] &= !(1 << pil);
        }
        self.check_interrupts();
    }

    pub fn set_timer_irq_cpu(&mut self, cpu: usize, level: u32) {
        if level != 0 {
            self.intreg_pending[cpu] |= self.cputimer_bit;
        } else {
            self.intreg_pending[cpu] &= !self.cputimer_bit;
        }
        self.check_interrupts();
    }

    pub fn reset(&mut self) {
        self.intreg_pending = [0; MAX_CPUS];
        self.intregm_disabled = !0xFFB2007F;
        self.intregm_pending = 0;
        self.target_cpu = 0;
        self.pil_out = [0; MAX_CPUS];
    }

    fn percpu_read(&self, cpu: usize, saddr: u64) -> u32 {
        match saddr {
            0 => self.intreg_pending[cpu],
            _ => 0,
        }
    }

    fn percpu_write(&mut self, cpu: usize, saddr: u64, mut val: u32) {
        match saddr {
            1 => {
                if val & 0x4000 != 0 {
                    val |= 1 << 31;
                }
                val &= 0xFFFE_0000;
                self.intreg_pending[cpu] &= !val;
            }
            2 => {
                val &= 0xFFFE_0000;
                self.intreg_pending[cpu] |= val;
                self.check_interrupts();
            }
            _ => {}
        }
    }

    fn master_read(&self, saddr: u64) -> u32 {
        match saddr {
            0 => self.intregm_pending & 0x7FFF_FFFF,
            1 => self.intregm_disabled,
            4 => self.target_cpu,
            _ => 0,
        }
    }

    fn master_write(&mut self, saddr: u64, mut val: u32) {
        match saddr {
            2 => {
                val &= !0x4FB2007F;
                self.intregm_disabled &= !val;
                self.check_interrupts();
            }
            3 => {
                val &= !0x4FB2007F;
                self.intregm_disabled |= val;
                self.intregm_pending &= !val;
            }
            4 => {
                self.target_cpu = val & (MAX_CPUS as u32 - 1);
            }
            _ => {}
        }
    }

    /// Byte-exact big-endian wire format: 16 `intreg_pending` words, then
    /// `intregm_pending`, `intregm_disabled`, `target_cpu`.
    pub fn save(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(19 * 4);
        for pending in &self.intreg_pending {
            out.extend_from_slice(&pending.to_be_bytes());
        }
        out.extend_from_slice(&self.intregm_pending.to_be_bytes());
        out.extend_from_slice(&self.intregm_disabled.to_be_bytes());
        out.extend_from_slice(&self.target_cpu.to_be_bytes());
        out
    }

    pub fn load(&mut self, version: u32, data: &[u8]) -> Result<()> {
        if version != SNAPSHOT_VERSION {
            return Err(Error::InvalidSnapshotVersion(version));
        }
        let word = |i: usize| -> u32 {
            u32::from_be_bytes(data[i * 4..i * 4 + 4].try_into().unwrap())
        };
        for (i, pending) in self.intreg_pending.iter_mut().enumerate() {
            *pending = word(i);
        }
        self.intregm_pending = word(MAX_CPUS);
        self.intregm_disabled = word(MAX_CPUS + 1);
        self.target_cpu = word(MAX_CPUS + 2);
        Ok(())
    }
}

/// Per-CPU MMIO window: `BusAccessInfo::address` is the offset into the
/// window's base, already striped by the caller's bus mapping.
pub struct SlavioPerCpu<'a> {
    pub state: &'a std::cell::RefCell<SlavioState>,
}

impl BusDevice for SlavioPerCpu<'_> {
    fn debug_label(&self) -> String {
        "slavio_intctl (per-cpu)".to_owned()
    }

    fn read(&mut self, info: BusAccessInfo, data: &mut [u8]) {
        if data.len() != 4 {
            return;
        }
        let cpu = decode_percpu(info.address);
        let saddr = (info.address & 0xF) >> 2;
        let val = self.state.borrow().percpu_read(cpu, saddr);
        data.copy_from_slice(&val.to_ne_bytes());
    }

    fn write(&mut self, info: BusAccessInfo, data: &[u8]) {
        if data.len() != 4 {
            return;
        }
        let cpu = decode_percpu(info.address);
        let saddr = (info.address & 0xF) >> 2;
        let val = u32::from_ne_bytes(data.try_into().unwrap());
        self.state.borrow_mut().percpu_write(cpu, saddr, val);
    }
}

pub struct SlavioMaster<'a> {
    pub state: &'a std::cell::RefCell<SlavioState>,
}

impl BusDevice for SlavioMaster<'_> {
    fn debug_label(&self) -> String {
        "slavio_intctl (master)".to_owned()
    }

    fn read(&mut self, info: BusAccessInfo, data: &mut [u8]) {
        if data.len() != 4 {
            return;
        }
        let saddr = (info.address & 0x1F) >> 2;
        let val = self.state.borrow().master_read(saddr);
        data.copy_from_slice(&val.to_ne_bytes());
    }

    fn write(&mut self, info: BusAccessInfo, data: &[u8]) {
        if data.len() != 4 {
            return;
        }
        let saddr = (info.address & 0x1F) >> 2;
        let val = u32::from_ne_bytes(data.try_into().unwrap());
        self.state.borrow_mut().master_write(saddr, val);
    }
}

impl Suspendable for SlavioState {
    fn snapshot(&mut self) -> anyhow::Result<serde_json::Value> {
        let bytes = self.save();
        Ok(serde_json::json!({
            "version": SNAPSHOT_VERSION,
            "data": bytes,
        }))
    }

    fn restore(&mut self, data: serde_json::Value) -> anyhow::Result<()> {
        let version = data["version"].as_u64().unwrap_or(0) as u32;
        let bytes: Vec<u8> = serde_json::from_value(data["data"].clone())?;
        self.load(version, &bytes).map_err(anyhow::Error::from)
    }
}

#[allow(dead_code)]
#[allow(clippy::precedence)]
fn original_decode_percpu(addr: u64) -> u64 {
    // Preserved verbatim for the regression test: precedence here binds
    // the multiplication before the mask, matching the source's
    // `(addr & (MAX_CPUS - 1) * TARGET_PAGE_SIZE) >> 12`.
    (addr & (MAX_CPUS as u64 - 1) * TARGET_PAGE_SIZE) >> 12
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intbit_to_level_for_test() -> [u32; 32] {
        let mut table = [0u32; 32];
        table[5] = 3;
        table[6] = 5;
        table
    }

    #[test]
    fn s4_pil_selection() {
        let mut s = SlavioState::new(intbit_to_level_for_test(), 0);
        s.set_irq(5, 1);
        s.set_irq(6, 1);
        assert_eq!(s.pil_out(0), 5);

        s.set_irq(6, 0);
        assert_eq!(s.pil_out(0), 3);
    }

    #[test]
    fn s5_master_disable_blocks_all_pils() {
        let mut s = SlavioState::new(intbit_to_level_for_test(), 0);
        s.master_write(3, 1 << 31);
        s.set_irq(5, 1);
        s.set_irq(6, 1);
        for cpu in 0..MAX_CPUS {
            assert_eq!(s.pil_out(cpu), 0);
        }
    }

    #[test]
    fn property7_at_most_one_pil_per_cpu() {
        let mut s = SlavioState::new(intbit_to_level_for_test(), 0);
        s.set_irq(5, 1);
        s.set_irq(6, 1);
        // Exactly one PIL value is live at a time by construction (pil_out
        // is a scalar, not a bitmask), which this just exercises.
        assert!(s.pil_out(0) == 3 || s.pil_out(0) == 5);
    }

    #[test]
    fn property8_save_load_save_is_byte_identical() {
        let mut s = SlavioState::new(intbit_to_level_for_test(), 0);
        s.set_irq(5, 1);
        let first = s.save();
        let mut reloaded = SlavioState::new(intbit_to_level_for_test(), 0);
        reloaded.load(1, &first).unwrap();
        let second = reloaded.save();
        assert_eq!(first, second);
    }

    #[test]
    fn load_rejects_unknown_version() {
        let mut s = SlavioState::new(intbit_to_level_for_test(), 0);
        let bytes = s.save();
        assert!(matches!(
            s.load(2, &bytes),
            Err(Error::InvalidSnapshotVersion(2))
        ));
    }

    #[test]
    fn percpu_clear_softints_sets_bit31_on_bit14() {
        let mut s = SlavioState::new(intbit_to_level_for_test(), 0);
        s.intreg_pending[0] = 0xFFFF_FFFF;
        s.percpu_write(0, 1, 0x4000);
        assert_eq!(s.intreg_pending[0] & (1 << 31), 0);
    }

    #[test]
    fn decode_percpu_matches_original_for_max_cpus_16() {
        for raw_cpu in 0..MAX_CPUS as u64 {
            let addr = raw_cpu * TARGET_PAGE_SIZE + 0x4;
            assert_eq!(
                decode_percpu(addr) as u64,
                original_decode_percpu(addr),
                "addr={:#x}",
                addr
            );
        }
    }
}
