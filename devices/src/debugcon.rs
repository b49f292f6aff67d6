// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! One-address-per-register debug console: write a character, flush a
//! line, or adjust the emulator's log level. External-interface glue, not
//! a core emulation subsystem.

use std::io::Write;

use base::debug;
use base::LevelFilter;

use crate::BusAccessInfo;
use crate::BusDevice;

pub struct DebugConsole;

impl DebugConsole {
    pub fn new() -> Self {
        DebugConsole
    }
}

impl Default for DebugConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDevice for DebugConsole {
    fn debug_label(&self) -> String {
        "debugcon".to_owned()
    }

    fn read(&mut self, _info: BusAccessInfo, data: &mut [u8]) {
        data.fill(0);
    }

    fn write(&mut self, info: BusAccessInfo, data: &[u8]) {
        if data.len() != 1 {
            return;
        }
        let val = data[0];
        match info.offset {
            0 => {
                print!("{}", val as char);
            }
            1 => {
                println!();
                let _ = std::io::stdout().flush();
            }
            2 => {
                let level = match val as u32 | 0x100 {
                    v if v & 0x1 != 0 => LevelFilter::Error,
                    v if v & 0x2 != 0 => LevelFilter::Warn,
                    v if v & 0x4 != 0 => LevelFilter::Info,
                    v if v & 0x8 != 0 => LevelFilter::Debug,
                    _ => LevelFilter::Trace,
                };
                debug!("debugcon: setting log level to {:?}", level);
                base::set_max_level(level);
            }
            _ => {}
        }
    }
}
