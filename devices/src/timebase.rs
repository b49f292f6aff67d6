// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! PowerPC timebase/decrementer, the POWER/601 RTC alias over it, and the
//! embedded 4xx FIT/PIT/WDT timers that share its decrementer handle.

use base::trace;
use base::TimerHandle;
use base::VirtualClock;
use base::TICKS_PER_SEC;

use crate::cir;
use crate::cir::CpuContext;
use crate::muldiv::muldiv64;
use crate::muldiv::muldiv64_signed;

/// Tags for every timer a `CpuContext` can have armed. The decrementer and
/// PIT share one handle (`Decrementer`) exactly as the original repurposes
/// `tb_env->decr_timer` for the embedded PIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTag {
    Decrementer,
    Fit,
    Wdt,
}

pub struct TimebaseEnv {
    pub tb_offset: i64,
    pub tb_freq: u32,
    pub decr_next: u64,
    pub(crate) decr_timer: TimerHandle,
    pub embedded: Option<EmbeddedTimerEnv>,
}

pub struct EmbeddedTimerEnv {
    pub pit_reload: u64,
    pub fit_next: u64,
    pub wdt_next: u64,
    pub(crate) fit_timer: TimerHandle,
    pub(crate) wdt_timer: TimerHandle,
}

fn get_tb(tb_env: &TimebaseEnv, clock: &VirtualClock) -> u64 {
    let biased = (clock.now() as i64).wrapping_add(tb_env.tb_offset) as u64;
    muldiv64(biased, tb_env.tb_freq, TICKS_PER_SEC as u32)
}

pub fn load_tbl(ctx: &CpuContext, clock: &VirtualClock) -> u32 {
    let tb_env = ctx.tb_env.as_ref().expect("tb_env not initialized");
    (get_tb(tb_env, clock) & 0xFFFF_FFFF) as u32
}

pub fn load_tbu(ctx: &CpuContext, clock: &VirtualClock) -> u32 {
    let tb_env = ctx.tb_env.as_ref().expect("tb_env not initialized");
    (get_tb(tb_env, clock) >> 32) as u32
}

fn store_tb(tb_env: &mut TimebaseEnv, clock: &VirtualClock, value: u64) {
    let scaled = muldiv64(value, TICKS_PER_SEC as u32, tb_env.tb_freq) as i64;
    tb_env.tb_offset = scaled.wrapping_sub(clock.now() as i64);
    trace!("tb: store {:#018x} offset={:#x}", value, tb_env.tb_offset);
}

pub fn store_tbu(ctx: &mut CpuContext, clock: &VirtualClock, value: u32) {
    let low = load_tbl(ctx, clock);
    let tb_env = ctx.tb_env.as_mut().expect("tb_env not initialized");
    store_tb(tb_env, clock, ((value as u64) << 32) | low as u64);
}

pub fn store_tbl(ctx: &mut CpuContext, clock: &VirtualClock, value: u32) {
    let high = load_tbu(ctx, clock);
    let tb_env = ctx.tb_env.as_mut().expect("tb_env not initialized");
    store_tb(tb_env, clock, ((high as u64) << 32) | value as u64);
}

pub fn load_decr(ctx: &CpuContext, clock: &VirtualClock) -> u32 {
    let tb_env = ctx.tb_env.as_ref().expect("tb_env not initialized");
    let diff = tb_env.decr_next as i64 - clock.now() as i64;
    muldiv64_signed(diff, tb_env.tb_freq, TICKS_PER_SEC as u32) as u32
}

fn store_decr_inner(
    ctx: &mut CpuContext,
    clock: &VirtualClock,
    decr_old: u32,
    value: u32,
    is_excp: bool,
) {
    let now = clock.now();
    let (tb_freq, old_decr_next, handle) = {
        let tb_env = ctx.tb_env.as_ref().expect("tb_env not initialized");
        (tb_env.tb_freq, tb_env.decr_next, tb_env.decr_timer)
    };
    let mut next = now.wrapping_add(muldiv64(value as u64, TICKS_PER_SEC as u32, tb_freq));
    if is_excp {
        next = next.wrapping_add(old_decr_next.wrapping_sub(now));
    }
    if next == now {
        next = next.wrapping_add(1);
    }
    ctx.tb_env.as_mut().unwrap().decr_next = next;
    ctx.timers.mod_timer(handle, next);
    if (value & 0x8000_0000) != 0 && (decr_old & 0x8000_0000) == 0 {
        ctx.set_irq(cir::IRQ_DECR, 1);
    }
}

pub fn store_decr(ctx: &mut CpuContext, clock: &VirtualClock, value: u32) {
    let old = load_decr(ctx, clock);
    store_decr_inner(ctx, clock, old, value, false);
}

/// `cpu_ppc_set_tb_clk`: installs a new frequency and replays the Linux 2.4
/// decrementer-race workaround by forcing a max-value reload.
pub fn set_tb_clk(ctx: &mut CpuContext, clock: &VirtualClock, freq: u32) {
    ctx.tb_env.as_mut().unwrap().tb_freq = freq;
    store_decr_inner(ctx, clock, 0xFFFF_FFFF, 0xFFFF_FFFF, false);
}

/// `tb_init`/`cpu_ppc_tb_init`: allocates `tb_env`, arms the decrementer
/// timer, and installs `freq`. `set_tb_clk` doubles as the "clk_setup_cb"
/// the original returns — callers that need to reinstall a frequency later
/// (e.g. on a guest-visible clock change) call it directly.
pub fn tb_init(ctx: &mut CpuContext, clock: &VirtualClock, freq: u32) {
    let decr_timer = ctx.timers.new_timer(TimerTag::Decrementer);
    ctx.tb_env = Some(TimebaseEnv {
        tb_offset: 0,
        tb_freq: 0,
        decr_next: 0,
        decr_timer,
        embedded: None,
    });
    set_tb_clk(ctx, clock, freq);
}

/// POWER/601 RTC: a thin alias over TB with a fixed 7.8125 MHz clock.
pub fn rtc_init(ctx: &mut CpuContext, clock: &VirtualClock) {
    tb_init(ctx, clock, 7_812_500);
}

pub fn rtc_load_u(ctx: &CpuContext, clock: &VirtualClock) -> u32 {
    load_tbu(ctx, clock)
}

pub fn rtc_store_u(ctx: &mut CpuContext, clock: &VirtualClock, value: u32) {
    store_tbu(ctx, clock, value);
}

pub fn rtc_load_l(ctx: &CpuContext, clock: &VirtualClock) -> u32 {
    load_tbl(ctx, clock) & 0x3FFF_FF80
}

pub fn rtc_store_l(ctx: &mut CpuContext, clock: &VirtualClock, value: u32) {
    store_tbl(ctx, clock, value & 0x3FFF_FF80);
}

pub(crate) fn handle_timer_fire(
    ctx: &mut CpuContext,
    clock: &VirtualClock,
    _handle: TimerHandle,
    tag: TimerTag,
) {
    match tag {
        TimerTag::Decrementer => {
            let is_embedded = ctx
                .tb_env
                .as_ref()
                .map(|e| e.embedded.is_some())
                .unwrap_or(false);
            if is_embedded {
                crate::embedded_timers::pit_fire(ctx, clock);
            } else {
                store_decr_inner(ctx, clock, 0, 0xFFFF_FFFF, true);
            }
        }
        TimerTag::Fit => crate::embedded_timers::fit_fire(ctx, clock),
        TimerTag::Wdt => crate::embedded_timers::wdt_fire(ctx, clock),
    }
}
