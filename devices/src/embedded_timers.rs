// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Embedded PowerPC 4xx auxiliary timers: FIT, PIT and WDT, driven by guest
//! writes to the `TCR`/`TSR` SPRs and (for PIT) a dedicated reload register.

use base::VirtualClock;
use base::TICKS_PER_SEC;

use crate::cir;
use crate::cir::CpuContext;
use crate::cir::ResetKind;
use crate::muldiv::muldiv64;
use crate::timebase;
use crate::timebase::EmbeddedTimerEnv;
use crate::timebase::TimebaseEnv;
use crate::timebase::TimerTag;

/// `ppc_emb_timers_init`: allocates `tb_env` with its `opaque` embedded
/// timer state, repurposing the decrementer handle for PIT and adding
/// dedicated FIT/WDT handles.
pub fn emb_timers_init(ctx: &mut CpuContext, freq: u32) {
    let decr_timer = ctx.timers.new_timer(TimerTag::Decrementer);
    let fit_timer = ctx.timers.new_timer(TimerTag::Fit);
    let wdt_timer = ctx.timers.new_timer(TimerTag::Wdt);
    ctx.tb_env = Some(TimebaseEnv {
        tb_offset: 0,
        tb_freq: freq,
        decr_next: 0,
        decr_timer,
        embedded: Some(EmbeddedTimerEnv {
            pit_reload: 0,
            fit_next: 0,
            wdt_next: 0,
            fit_timer,
            wdt_timer,
        }),
    });
}

fn fit_period(tcr: u32) -> u64 {
    match (tcr >> 24) & 0x3 {
        0 => 1 << 9,
        1 => 1 << 13,
        2 => 1 << 17,
        _ => 1 << 21,
    }
}

fn wdt_period(tcr: u32) -> u64 {
    match (tcr >> 30) & 0x3 {
        0 => 1 << 17,
        1 => 1 << 21,
        2 => 1 << 25,
        _ => 1 << 29,
    }
}

pub(crate) fn fit_fire(ctx: &mut CpuContext, clock: &VirtualClock) {
    let now = clock.now();
    let tcr = ctx.tcr();
    let period = fit_period(tcr);
    let tb_freq = ctx.tb_env.as_ref().unwrap().tb_freq;
    let mut next = now.wrapping_add(muldiv64(period, TICKS_PER_SEC as u32, tb_freq));
    if next == now {
        next = next.wrapping_add(1);
    }
    let fit_timer = ctx
        .tb_env
        .as_ref()
        .unwrap()
        .embedded
        .as_ref()
        .unwrap()
        .fit_timer;
    ctx.timers.mod_timer(fit_timer, next);
    ctx.tb_env
        .as_mut()
        .unwrap()
        .embedded
        .as_mut()
        .unwrap()
        .fit_next = next;
    ctx.set_tsr(ctx.tsr() | (1 << 26));
    if (tcr >> 23) & 0x1 != 0 {
        ctx.set_irq(cir::IRQ_FIT, 1);
    }
}

/// `start_stop_pit`: (re)arms or stops the shared decrementer handle
/// depending on the reload value and the `TCR` enable/auto-reload bits.
pub fn start_stop_pit(ctx: &mut CpuContext, clock: &VirtualClock, is_excp: bool) {
    let tcr = ctx.tcr();
    let (pit_reload, decr_timer, tb_freq, decr_next) = {
        let tb_env = ctx.tb_env.as_ref().unwrap();
        (
            tb_env.embedded.as_ref().unwrap().pit_reload,
            tb_env.decr_timer,
            tb_env.tb_freq,
            tb_env.decr_next,
        )
    };
    if pit_reload <= 1 || (tcr >> 26) & 0x1 == 0 || (is_excp && (tcr >> 22) & 0x1 == 0) {
        ctx.timers.del_timer(decr_timer);
        return;
    }
    let now = clock.now();
    let mut next = now.wrapping_add(muldiv64(pit_reload, TICKS_PER_SEC as u32, tb_freq));
    if is_excp {
        next = next.wrapping_add(decr_next.wrapping_sub(now));
    }
    if next == now {
        next = next.wrapping_add(1);
    }
    ctx.timers.mod_timer(decr_timer, next);
    ctx.tb_env.as_mut().unwrap().decr_next = next;
}

pub(crate) fn pit_fire(ctx: &mut CpuContext, clock: &VirtualClock) {
    ctx.set_tsr(ctx.tsr() | (1 << 27));
    if (ctx.tcr() >> 26) & 0x1 != 0 {
        ctx.set_irq(cir::IRQ_PIT, 1);
    }
    start_stop_pit(ctx, clock, true);
}

pub fn store_40x_pit(ctx: &mut CpuContext, clock: &VirtualClock, val: u32) {
    ctx.tb_env
        .as_mut()
        .unwrap()
        .embedded
        .as_mut()
        .unwrap()
        .pit_reload = val as u64;
    start_stop_pit(ctx, clock, false);
}

pub fn load_40x_pit(ctx: &CpuContext, clock: &VirtualClock) -> u32 {
    timebase::load_decr(ctx, clock)
}

pub(crate) fn wdt_fire(ctx: &mut CpuContext, clock: &VirtualClock) {
    let now = clock.now();
    let tcr = ctx.tcr();
    let period = wdt_period(tcr);
    let tb_freq = ctx.tb_env.as_ref().unwrap().tb_freq;
    let mut next = now.wrapping_add(muldiv64(period, TICKS_PER_SEC as u32, tb_freq));
    if next == now {
        next = next.wrapping_add(1);
    }

    let wdt_timer = ctx
        .tb_env
        .as_ref()
        .unwrap()
        .embedded
        .as_ref()
        .unwrap()
        .wdt_timer;
    let tsr = ctx.tsr();
    match (tsr >> 30) & 0x3 {
        0x0 | 0x1 => {
            ctx.timers.mod_timer(wdt_timer, next);
            ctx.tb_env
                .as_mut()
                .unwrap()
                .embedded
                .as_mut()
                .unwrap()
                .wdt_next = next;
            ctx.set_tsr(ctx.tsr() | (1 << 31));
        }
        0x2 => {
            ctx.timers.mod_timer(wdt_timer, next);
            ctx.tb_env
                .as_mut()
                .unwrap()
                .embedded
                .as_mut()
                .unwrap()
                .wdt_next = next;
            ctx.set_tsr(ctx.tsr() | (1 << 30));
            if (tcr >> 27) & 0x1 != 0 {
                ctx.set_irq(cir::IRQ_WDT, 1);
            }
        }
        _ => {
            ctx.set_tsr((ctx.tsr() & !0xC000_0000) | (tcr & 0xC000_0000));
            match (tcr >> 28) & 0x3 {
                0x0 => {}
                0x1 => ctx.notify_reset(ResetKind::Core),
                0x2 => ctx.notify_reset(ResetKind::Chip),
                _ => ctx.notify_reset(ResetKind::System),
            }
        }
    }
}

/// `store_booke_tsr`: clears the writable `TSR` bits named by `val`;
/// writing bit 31 also clears the PIT interrupt.
pub fn store_booke_tsr(ctx: &mut CpuContext, val: u32) {
    ctx.set_tsr(ctx.tsr() & !(val & 0xFC00_0000));
    if val & 0x8000_0000 != 0 {
        ctx.set_irq(cir::IRQ_PIT, 0);
    }
}

/// `store_booke_tcr`: installs new `TCR` bits, restarts PIT, and runs one
/// WDT pass immediately so a newly-written period takes effect.
pub fn store_booke_tcr(ctx: &mut CpuContext, clock: &VirtualClock, val: u32) {
    ctx.set_tcr(val & 0xFFC0_0000);
    start_stop_pit(ctx, clock, true);
    wdt_fire(ctx, clock);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_fires_and_raises_when_enabled() {
        let mut ctx = CpuContext::new();
        let mut clock = VirtualClock::new();
        emb_timers_init(&mut ctx, 100_000_000);
        // Shortest period (TCR[24:25]=0 => 2^9), interrupt enabled (TCR[23]).
        ctx.set_tcr(1 << 23);
        let fit_timer = ctx
            .tb_env
            .as_ref()
            .unwrap()
            .embedded
            .as_ref()
            .unwrap()
            .fit_timer;
        ctx.timers.mod_timer(fit_timer, 0);
        clock.advance(1);
        ctx.dispatch_timers(&clock);
        assert_ne!(ctx.tsr() & (1 << 26), 0);
        assert_ne!(ctx.pending_interrupts() & (1 << cir::IRQ_FIT), 0);
    }

    #[test]
    fn pit_stops_when_reload_is_trivial() {
        let mut ctx = CpuContext::new();
        let clock = VirtualClock::new();
        emb_timers_init(&mut ctx, 100_000_000);
        ctx.set_tcr(1 << 26);
        store_40x_pit(&mut ctx, &clock, 1);
        let decr_timer = ctx.tb_env.as_ref().unwrap().decr_timer;
        assert!(ctx.timers.deadline(decr_timer).is_none());
    }

    #[test]
    fn pit_fires_and_auto_reloads() {
        let mut ctx = CpuContext::new();
        let mut clock = VirtualClock::new();
        emb_timers_init(&mut ctx, 100_000_000);
        ctx.set_tcr((1 << 26) | (1 << 22)); // PIT enable + auto-reload
        store_40x_pit(&mut ctx, &clock, 1_000_000);
        let decr_timer = ctx.tb_env.as_ref().unwrap().decr_timer;
        clock.advance(1_000_000_000);
        ctx.dispatch_timers(&clock);
        assert_ne!(ctx.tsr() & (1 << 27), 0);
        assert_ne!(ctx.pending_interrupts() & (1 << cir::IRQ_PIT), 0);
        // Auto-reload kept the shared timer armed.
        assert!(ctx.timers.deadline(decr_timer).is_some());
    }

    #[test]
    fn wdt_state_machine_escalates_to_reset() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut ctx = CpuContext::new();
        let mut clock = VirtualClock::new();
        emb_timers_init(&mut ctx, 100_000_000);

        let seen: Rc<RefCell<Vec<ResetKind>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        ctx.set_reset_observer(move |kind| seen_clone.borrow_mut().push(kind));

        // TSR[30:31] == 0 -> set TSR[31], rearm.
        wdt_fire(&mut ctx, &clock);
        assert_ne!(ctx.tsr() & (1 << 31), 0);

        // TSR[30:31] == 1 (from TSR[31] alone) -> still just sets TSR[31] again.
        clock.advance(1);
        wdt_fire(&mut ctx, &clock);
        assert_ne!(ctx.tsr() & (1 << 31), 0);

        // Force TSR[30:31] == 3 (by hand) and select system reset via TCR[28:29]=3.
        ctx.set_tsr(0xC000_0000);
        ctx.set_tcr(0x3000_0000);
        wdt_fire(&mut ctx, &clock);
        assert_eq!(*seen.borrow(), vec![ResetKind::System]);
        // TSR[30:31] is cleared and replaced with TCR[30:31] (both 0 here).
        assert_eq!(ctx.tsr() & 0xC000_0000, ctx.tcr() & 0xC000_0000);
        assert_eq!(ctx.tsr() & 0xC000_0000, 0);
    }

    #[test]
    fn store_booke_tsr_clears_pit_on_bit31() {
        let mut ctx = CpuContext::new();
        emb_timers_init(&mut ctx, 100_000_000);
        ctx.set_irq(cir::IRQ_PIT, 1);
        ctx.set_tsr(0xFFFF_FFFF);
        store_booke_tsr(&mut ctx, 0x8000_0000 | (1 << 27));
        assert_eq!(ctx.pending_interrupts() & (1 << cir::IRQ_PIT), 0);
        assert_eq!(ctx.tsr() & (1 << 27), 0);
    }
}
