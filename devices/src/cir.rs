// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! CPU Interrupt Router: the per-CPU state every PIC family and timer in
//! this crate ultimately funnels into, plus the owning `CpuContext`.

use anyhow::Context;
use base::debug;
use serde::Deserialize;
use serde::Serialize;

use crate::ila::IrqLineSet;
use crate::timebase::TimebaseEnv;
use crate::timebase::TimerTag;
use crate::Suspendable;

/// Architectural interrupt sources aggregated into `pending_interrupts`.
/// Bit positions are a fresh assignment (the source's `CPU_INTERRUPT_*`
/// enum lives outside the retrieved sources); only relative distinctness
/// matters to this crate.
pub const IRQ_RESET: u32 = 0;
pub const IRQ_EXT: u32 = 1;
pub const IRQ_SMI: u32 = 2;
pub const IRQ_MCK: u32 = 3;
pub const IRQ_THERM: u32 = 4;
pub const IRQ_DECR: u32 = 5;
pub const IRQ_FIT: u32 = 6;
pub const IRQ_PIT: u32 = 7;
pub const IRQ_WDT: u32 = 8;
pub const IRQ_DEBUG: u32 = 9;

/// What a 405 reset-class pin asked for. The board that owns the machine
/// wires this up; this crate only raises it (see `CpuContext::set_reset_observer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    Core,
    Chip,
    System,
}

type ResetHandler = Box<dyn FnMut(ResetKind)>;

/// Per-CPU state: pending interrupt mask, raw input pin levels, halt state,
/// the 4xx `TCR`/`TSR` SPRs, and the owned timebase/DCR handles.
pub struct CpuContext {
    pending_interrupts: u32,
    irq_input_state: IrqLineSet,
    pub halted: bool,
    spr_tcr: u32,
    spr_tsr: u32,
    pub tb_env: Option<TimebaseEnv>,
    pub dcr_env: Option<crate::dcr::DcrBus>,
    pub(crate) timers: base::TimerQueue<TimerTag>,
    reset_observer: Option<ResetHandler>,
}

impl CpuContext {
    pub fn new() -> Self {
        CpuContext {
            pending_interrupts: 0,
            irq_input_state: IrqLineSet::new(32),
            halted: false,
            spr_tcr: 0,
            spr_tsr: 0,
            tb_env: None,
            dcr_env: None,
            timers: base::TimerQueue::new(),
            reset_observer: None,
        }
    }

    /// `set_irq(n, level)`: the single CIR operation. No edge/level policy
    /// lives here — that belongs to the PIC dispatching into this.
    pub fn set_irq(&mut self, n: u32, level: u32) {
        debug_assert!(n < 32);
        if level != 0 {
            self.pending_interrupts |= 1 << n;
        } else {
            self.pending_interrupts &= !(1 << n);
        }
        debug!(
            "cir: n_irq={} level={} => pending={:#010x}",
            n, level, self.pending_interrupts
        );
    }

    pub fn pending_interrupts(&self) -> u32 {
        self.pending_interrupts
    }

    /// The architectural HARD pin. Derived rather than stored, so the
    /// `pending_interrupts == 0 <=> HARD deasserted` invariant can't drift.
    pub fn hard_asserted(&self) -> bool {
        self.pending_interrupts != 0
    }

    pub fn irq_input_level(&self, pin: u32) -> u32 {
        self.irq_input_state.level(pin)
    }

    pub(crate) fn irq_input_state_mut(&mut self) -> &mut IrqLineSet {
        &mut self.irq_input_state
    }

    pub fn tcr(&self) -> u32 {
        self.spr_tcr
    }

    pub fn set_tcr(&mut self, value: u32) {
        self.spr_tcr = value;
    }

    pub fn tsr(&self) -> u32 {
        self.spr_tsr
    }

    pub fn set_tsr(&mut self, value: u32) {
        self.spr_tsr = value;
    }

    pub fn set_reset_observer(&mut self, f: impl FnMut(ResetKind) + 'static) {
        self.reset_observer = Some(Box::new(f));
    }

    pub(crate) fn notify_reset(&mut self, kind: ResetKind) {
        debug!("ppc405: {:?} reset requested", kind);
        if let Some(cb) = self.reset_observer.as_mut() {
            cb(kind);
        }
    }

    /// Fires every timer (decrementer/PIT, FIT, WDT) whose deadline has
    /// elapsed, in deadline order. `pop_due` never holds a borrow of
    /// `self.timers` across the handler call, so a handler that re-arms a
    /// timer to an already-due deadline is picked up by the next loop
    /// iteration within this same call — matching the original's
    /// re-entrant `qemu_run_timers` loop.
    pub fn dispatch_timers(&mut self, clock: &base::VirtualClock) {
        while let Some((handle, tag)) = self.timers.pop_due(clock.now()) {
            crate::timebase::handle_timer_fire(self, clock, handle, tag);
        }
    }

    /// Machine reset: clears pending interrupts and raw input pin state.
    /// Re-arming the decrementer is the caller's job (call `tb_init` again).
    pub fn reset(&mut self) {
        self.pending_interrupts = 0;
        self.irq_input_state = IrqLineSet::new(32);
    }
}

impl Default for CpuContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize)]
struct EmbeddedSnapshot {
    pit_reload: u64,
    fit_next: u64,
    wdt_next: u64,
}

#[derive(Serialize, Deserialize)]
struct CpuContextSnapshot {
    pending_interrupts: u32,
    irq_input_state: u32,
    halted: bool,
    tcr: u32,
    tsr: u32,
    tb_offset: i64,
    tb_freq: u32,
    decr_next: u64,
    embedded: Option<EmbeddedSnapshot>,
}

impl Suspendable for CpuContext {
    fn snapshot(&mut self) -> anyhow::Result<serde_json::Value> {
        let (tb_offset, tb_freq, decr_next, embedded) = match self.tb_env.as_ref() {
            Some(tb_env) => (
                tb_env.tb_offset,
                tb_env.tb_freq,
                tb_env.decr_next,
                tb_env.embedded.as_ref().map(|e| EmbeddedSnapshot {
                    pit_reload: e.pit_reload,
                    fit_next: e.fit_next,
                    wdt_next: e.wdt_next,
                }),
            ),
            None => (0, 0, 0, None),
        };
        let snap = CpuContextSnapshot {
            pending_interrupts: self.pending_interrupts,
            irq_input_state: self.irq_input_state.bits(),
            halted: self.halted,
            tcr: self.spr_tcr,
            tsr: self.spr_tsr,
            tb_offset,
            tb_freq,
            decr_next,
            embedded,
        };
        serde_json::to_value(&snap).context("failed to serialize CpuContext")
    }

    fn restore(&mut self, data: serde_json::Value) -> anyhow::Result<()> {
        let snap: CpuContextSnapshot =
            serde_json::from_value(data).context("failed to deserialize CpuContext")?;
        self.pending_interrupts = snap.pending_interrupts;
        self.irq_input_state = IrqLineSet::from_bits(snap.irq_input_state);
        self.halted = snap.halted;
        self.spr_tcr = snap.tcr;
        self.spr_tsr = snap.tsr;
        if let Some(tb_env) = self.tb_env.as_mut() {
            tb_env.tb_offset = snap.tb_offset;
            tb_env.tb_freq = snap.tb_freq;
            tb_env.decr_next = snap.decr_next;
            if let (Some(embedded), Some(snap_embedded)) =
                (tb_env.embedded.as_mut(), snap.embedded)
            {
                embedded.pit_reload = snap_embedded.pit_reload;
                embedded.fit_next = snap_embedded.fit_next;
                embedded.wdt_next = snap_embedded.wdt_next;
            }
        }
        Ok(())
    }
}
