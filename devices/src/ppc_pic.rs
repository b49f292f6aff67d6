// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! PowerPC input controllers: the 6xx/7xx, 970 and 405 pin tables. Every
//! family shares the same envelope (no spurious events; dispatch by pin;
//! update raw state) and differs only in the table itself.

use base::trace;

use crate::cir;
use crate::cir::CpuContext;
use crate::cir::ResetKind;

pub const PPC6XX_INPUT_INT: u32 = 0;
pub const PPC6XX_INPUT_SMI: u32 = 1;
pub const PPC6XX_INPUT_MCP: u32 = 2;
pub const PPC6XX_INPUT_CKSTP_IN: u32 = 3;
pub const PPC6XX_INPUT_HRESET: u32 = 4;
pub const PPC6XX_INPUT_SRESET: u32 = 5;
pub const PPC6XX_NB_INPUTS: u32 = 6;

pub const PPC970_INPUT_INT: u32 = 0;
pub const PPC970_INPUT_THINT: u32 = 1;
pub const PPC970_INPUT_MCP: u32 = 2;
pub const PPC970_INPUT_CKSTP: u32 = 3;
pub const PPC970_INPUT_HRESET: u32 = 4;
pub const PPC970_INPUT_SRESET: u32 = 5;
pub const PPC970_INPUT_TBEN: u32 = 6;
pub const PPC970_NB_INPUTS: u32 = 7;

pub const PPC405_INPUT_RESET_SYS: u32 = 0;
pub const PPC405_INPUT_RESET_CHIP: u32 = 1;
pub const PPC405_INPUT_RESET_CORE: u32 = 2;
pub const PPC405_INPUT_CINT: u32 = 3;
pub const PPC405_INPUT_INT: u32 = 4;
pub const PPC405_INPUT_HALT: u32 = 5;
pub const PPC405_INPUT_DEBUG: u32 = 6;
pub const PPC405_NB_INPUTS: u32 = 7;

/// `ppc6xx_irq_init`: allocates the 6 input lines for a 6xx/7xx core.
/// There is nothing to allocate beyond the line count itself — `CpuContext`
/// already carries the 32-bit `irq_input_state` every family's pins live in.
pub fn ppc6xx_irq_init(_ctx: &mut CpuContext) {}

pub fn ppc970_irq_init(_ctx: &mut CpuContext) {}

pub fn ppc405_irq_init(_ctx: &mut CpuContext) {}

pub fn ppc6xx_set_irq(ctx: &mut CpuContext, pin: u32, level: u32) {
    let cur = ctx.irq_input_level(pin);
    let level_bit = (level != 0) as u32;
    if cur == level_bit {
        return;
    }
    trace!("ppc6xx: pin {} level {}", pin, level);
    match pin {
        PPC6XX_INPUT_INT => ctx.set_irq(cir::IRQ_EXT, level),
        PPC6XX_INPUT_SMI => ctx.set_irq(cir::IRQ_SMI, level),
        PPC6XX_INPUT_MCP => {
            if cur == 1 && level_bit == 0 {
                ctx.set_irq(cir::IRQ_MCK, 1);
            }
        }
        PPC6XX_INPUT_CKSTP_IN => ctx.halted = level_bit != 0,
        PPC6XX_INPUT_HRESET => {
            // Active low, "reset the CPU". Left unimplemented upstream
            // (source keeps the `cpu_reset` call commented out); acknowledged
            // without action here too.
        }
        PPC6XX_INPUT_SRESET => ctx.set_irq(cir::IRQ_RESET, level),
        _ => return,
    }
    ctx.irq_input_state_mut().set_level(pin, level_bit);
}

pub fn ppc970_set_irq(ctx: &mut CpuContext, pin: u32, level: u32) {
    let cur = ctx.irq_input_level(pin);
    let level_bit = (level != 0) as u32;
    if cur == level_bit {
        return;
    }
    trace!("ppc970: pin {} level {}", pin, level);
    match pin {
        PPC970_INPUT_INT => ctx.set_irq(cir::IRQ_EXT, level),
        PPC970_INPUT_THINT => ctx.set_irq(cir::IRQ_THERM, level),
        PPC970_INPUT_MCP => {
            if cur == 1 && level_bit == 0 {
                ctx.set_irq(cir::IRQ_MCK, 1);
            }
        }
        PPC970_INPUT_CKSTP => ctx.halted = level_bit != 0,
        PPC970_INPUT_HRESET => {}
        PPC970_INPUT_SRESET => ctx.set_irq(cir::IRQ_RESET, level),
        PPC970_INPUT_TBEN => {}
        _ => return,
    }
    ctx.irq_input_state_mut().set_level(pin, level_bit);
}

pub fn ppc405_set_irq(ctx: &mut CpuContext, pin: u32, level: u32) {
    let cur = ctx.irq_input_level(pin);
    let level_bit = (level != 0) as u32;
    if cur == level_bit {
        return;
    }
    trace!("ppc405: pin {} level {}", pin, level);
    match pin {
        PPC405_INPUT_RESET_SYS => {
            if level_bit != 0 {
                ctx.notify_reset(ResetKind::System);
            }
        }
        PPC405_INPUT_RESET_CHIP => {
            if level_bit != 0 {
                ctx.notify_reset(ResetKind::Chip);
            }
        }
        PPC405_INPUT_RESET_CORE => {
            if level_bit != 0 {
                ctx.notify_reset(ResetKind::Core);
            }
        }
        PPC405_INPUT_CINT => {
            // TODO: routes to PPC_INTERRUPT_RESET rather than a dedicated
            // critical-interrupt bit. Marked TOFIX upstream; preserved as-is
            // pending a real critical-interrupt bit definition.
            ctx.set_irq(cir::IRQ_RESET, level)
        }
        PPC405_INPUT_INT => ctx.set_irq(cir::IRQ_EXT, level),
        PPC405_INPUT_HALT => ctx.halted = level_bit != 0,
        PPC405_INPUT_DEBUG => ctx.set_irq(cir::IRQ_DEBUG, level),
        _ => return,
    }
    ctx.irq_input_state_mut().set_level(pin, level_bit);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_6xx_external_irq_scenario() {
        let mut ctx = CpuContext::new();
        ppc6xx_set_irq(&mut ctx, PPC6XX_INPUT_INT, 1);
        assert_ne!(ctx.pending_interrupts() & (1 << cir::IRQ_EXT), 0);
        assert_eq!(ctx.irq_input_level(PPC6XX_INPUT_INT), 1);
        assert!(ctx.hard_asserted());

        ppc6xx_set_irq(&mut ctx, PPC6XX_INPUT_INT, 0);
        assert_eq!(ctx.pending_interrupts() & (1 << cir::IRQ_EXT), 0);
        assert!(!ctx.hard_asserted());
    }

    #[test]
    fn pic_idempotence() {
        let mut ctx = CpuContext::new();
        ppc6xx_set_irq(&mut ctx, PPC6XX_INPUT_INT, 1);
        let pending_after_first = ctx.pending_interrupts();
        ppc6xx_set_irq(&mut ctx, PPC6XX_INPUT_INT, 1);
        assert_eq!(ctx.pending_interrupts(), pending_after_first);
    }

    #[test]
    fn mcp_edge_discipline() {
        let mut ctx = CpuContext::new();
        // 0->0: no MCK.
        ppc6xx_set_irq(&mut ctx, PPC6XX_INPUT_MCP, 0);
        assert_eq!(ctx.pending_interrupts() & (1 << cir::IRQ_MCK), 0);
        // 0->1: no MCK (only the falling edge raises it).
        ppc6xx_set_irq(&mut ctx, PPC6XX_INPUT_MCP, 1);
        assert_eq!(ctx.pending_interrupts() & (1 << cir::IRQ_MCK), 0);
        // 1->1: no MCK.
        ppc6xx_set_irq(&mut ctx, PPC6XX_INPUT_MCP, 1);
        assert_eq!(ctx.pending_interrupts() & (1 << cir::IRQ_MCK), 0);
        // 1->0: MCK raised.
        ppc6xx_set_irq(&mut ctx, PPC6XX_INPUT_MCP, 0);
        assert_ne!(ctx.pending_interrupts() & (1 << cir::IRQ_MCK), 0);
    }

    #[test]
    fn unknown_pin_does_not_touch_input_state() {
        let mut ctx = CpuContext::new();
        ppc6xx_set_irq(&mut ctx, 31, 1);
        assert_eq!(ctx.irq_input_level(31), 0);
    }

    #[test]
    fn ppc405_reset_pins_invoke_observer() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let seen: Rc<RefCell<Vec<ResetKind>>> = Rc::new(RefCell::new(Vec::new()));
        let mut ctx = CpuContext::new();
        let seen_clone = seen.clone();
        ctx.set_reset_observer(move |kind| seen_clone.borrow_mut().push(kind));

        ppc405_set_irq(&mut ctx, PPC405_INPUT_RESET_CHIP, 1);
        assert_eq!(*seen.borrow(), vec![ResetKind::Chip]);
    }
}
