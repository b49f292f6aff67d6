// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! CPU interrupt delivery, timebase/decrementer and embedded-timer
//! emulation, the DCR bus, and the SLAVIO interrupt controller, plus
//! NVRAM/debug-console external-interface glue.

mod cir;
mod dcr;
mod debugcon;
mod embedded_timers;
mod ila;
mod muldiv;
mod nvram;
mod ppc_pic;
mod slavio;
mod timebase;

pub use cir::CpuContext;
pub use cir::ResetKind;
pub use cir::IRQ_DEBUG;
pub use cir::IRQ_DECR;
pub use cir::IRQ_EXT;
pub use cir::IRQ_FIT;
pub use cir::IRQ_MCK;
pub use cir::IRQ_PIT;
pub use cir::IRQ_RESET;
pub use cir::IRQ_SMI;
pub use cir::IRQ_THERM;
pub use cir::IRQ_WDT;
pub use dcr::DcrBus;
pub use dcr::DcrDevice;
pub use dcr::Error as DcrError;
pub use debugcon::DebugConsole;
pub use embedded_timers::emb_timers_init;
pub use embedded_timers::load_40x_pit;
pub use embedded_timers::start_stop_pit;
pub use embedded_timers::store_40x_pit;
pub use embedded_timers::store_booke_tcr;
pub use embedded_timers::store_booke_tsr;
pub use ila::IrqLineSet;
pub use muldiv::muldiv64;
pub use muldiv::muldiv64_signed;
pub use nvram::compute_crc;
pub use nvram::write_bios_params;
pub use nvram::BiosParams;
pub use nvram::CmdlinePlacement;
pub use nvram::MemNvram;
pub use nvram::Nvram;
pub use ppc_pic::ppc405_irq_init;
pub use ppc_pic::ppc405_set_irq;
pub use ppc_pic::ppc6xx_irq_init;
pub use ppc_pic::ppc6xx_set_irq;
pub use ppc_pic::ppc970_irq_init;
pub use ppc_pic::ppc970_set_irq;
pub use ppc_pic::PPC405_INPUT_CINT;
pub use ppc_pic::PPC405_INPUT_DEBUG;
pub use ppc_pic::PPC405_INPUT_HALT;
pub use ppc_pic::PPC405_INPUT_INT;
pub use ppc_pic::PPC405_INPUT_RESET_CHIP;
pub use ppc_pic::PPC405_INPUT_RESET_CORE;
pub use ppc_pic::PPC405_INPUT_RESET_SYS;
pub use ppc_pic::PPC405_NB_INPUTS;
pub use ppc_pic::PPC6XX_INPUT_CKSTP_IN;
pub use ppc_pic::PPC6XX_INPUT_HRESET;
pub use ppc_pic::PPC6XX_INPUT_INT;
pub use ppc_pic::PPC6XX_INPUT_MCP;
pub use ppc_pic::PPC6XX_INPUT_SMI;
pub use ppc_pic::PPC6XX_INPUT_SRESET;
pub use ppc_pic::PPC6XX_NB_INPUTS;
pub use ppc_pic::PPC970_INPUT_CKSTP;
pub use ppc_pic::PPC970_INPUT_HRESET;
pub use ppc_pic::PPC970_INPUT_INT;
pub use ppc_pic::PPC970_INPUT_MCP;
pub use ppc_pic::PPC970_INPUT_SRESET;
pub use ppc_pic::PPC970_INPUT_TBEN;
pub use ppc_pic::PPC970_INPUT_THINT;
pub use ppc_pic::PPC970_NB_INPUTS;
pub use slavio::Error as SlavioError;
pub use slavio::SlavioMaster;
pub use slavio::SlavioPerCpu;
pub use slavio::SlavioState;
pub use slavio::MAX_CPUS;
pub use timebase::load_decr;
pub use timebase::load_tbl;
pub use timebase::load_tbu;
pub use timebase::rtc_init;
pub use timebase::rtc_load_l;
pub use timebase::rtc_load_u;
pub use timebase::rtc_store_l;
pub use timebase::rtc_store_u;
pub use timebase::set_tb_clk;
pub use timebase::store_decr;
pub use timebase::store_tbl;
pub use timebase::store_tbu;
pub use timebase::tb_init;

/// Identifies the MMIO access triggering a `BusDevice` read/write: `offset`
/// is relative to the device's own registration, `address` is the raw bus
/// address before that subtraction (what the SLAVIO per-CPU stripe decode
/// needs), and `id` distinguishes multiple instances of the same device.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusAccessInfo {
    pub offset: u64,
    pub address: u64,
    pub id: u32,
}

/// A single MMIO-mapped register file. Unknown offsets are silently
/// dropped on write and read as zero; this crate never faults the guest
/// from a bus handler.
pub trait BusDevice {
    fn debug_label(&self) -> String;
    fn read(&mut self, info: BusAccessInfo, data: &mut [u8]);
    fn write(&mut self, info: BusAccessInfo, data: &[u8]);
}

/// Save/restore hook for devices participating in snapshotting. Simplified
/// from the upstream trait this crate was grounded on: no `device_id()`,
/// since nothing here registers against a PCI-style device-id enum.
pub trait Suspendable {
    fn snapshot(&mut self) -> anyhow::Result<serde_json::Value>;
    fn restore(&mut self, data: serde_json::Value) -> anyhow::Result<()>;
}
