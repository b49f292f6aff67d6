// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Embedded PowerPC Device Control Register bus: a flat 1024-slot register
//! space addressed directly by `mtdcr`/`mfdcr`, distinct from the CPU's
//! memory bus.

use remain::sorted;
use thiserror::Error;

pub const DCR_SLOTS: usize = 1024;

#[sorted]
#[derive(Error, Debug)]
pub enum Error {
    #[error("dcr number {0} already has a device registered")]
    AlreadyRegistered(u32),
    #[error("dcr number {0} is out of range (bus has {1} slots)")]
    OutOfRange(u32, usize),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A single device sitting behind one or more DCR numbers.
pub trait DcrDevice {
    fn dcr_read(&mut self, dcrn: u32) -> u32;
    fn dcr_write(&mut self, dcrn: u32, value: u32);
}

/// Invoked by `read`/`write` for both an out-of-range `dcrn` and an
/// in-range but empty slot, mirroring `ppc_dcr_read`/`ppc_dcr_write`'s
/// single `error:` label covering both conditions. Defaults to returning
/// `-1`, matching the original's bare `return -1;`.
type ErrorCb = Box<dyn FnMut(u32) -> i32>;

/// The 1024-entry DCR address space. Unlike the CPU's memory bus, a DCR
/// number maps to exactly one device with no range/size negotiation.
pub struct DcrBus {
    slots: Vec<Option<Box<dyn DcrDevice>>>,
    read_error: ErrorCb,
    write_error: ErrorCb,
}

impl DcrBus {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(DCR_SLOTS);
        slots.resize_with(DCR_SLOTS, || None);
        DcrBus {
            slots,
            read_error: Box::new(|_dcrn| -1),
            write_error: Box::new(|_dcrn| -1),
        }
    }

    /// `ppc_dcr_init`'s `read_error` callback.
    pub fn set_read_error(&mut self, f: impl FnMut(u32) -> i32 + 'static) {
        self.read_error = Box::new(f);
    }

    /// `ppc_dcr_init`'s `write_error` callback.
    pub fn set_write_error(&mut self, f: impl FnMut(u32) -> i32 + 'static) {
        self.write_error = Box::new(f);
    }

    pub fn register(&mut self, dcrn: u32, device: Box<dyn DcrDevice>) -> Result<()> {
        let idx = dcrn as usize;
        if idx >= self.slots.len() {
            return Err(Error::OutOfRange(dcrn, self.slots.len()));
        }
        if self.slots[idx].is_some() {
            return Err(Error::AlreadyRegistered(dcrn));
        }
        self.slots[idx] = Some(device);
        Ok(())
    }

    /// `ppc_dcr_read`: an out-of-range `dcrn` and an in-range but empty slot
    /// both delegate to `read_error` instead of being distinguished.
    pub fn read(&mut self, dcrn: u32) -> i32 {
        match self.slots.get_mut(dcrn as usize) {
            Some(Some(dev)) => dev.dcr_read(dcrn) as i32,
            _ => (self.read_error)(dcrn),
        }
    }

    /// `ppc_dcr_write`: same error-callback delegation as `read`.
    pub fn write(&mut self, dcrn: u32, value: u32) -> i32 {
        match self.slots.get_mut(dcrn as usize) {
            Some(Some(dev)) => {
                dev.dcr_write(dcrn, value);
                0
            }
            _ => (self.write_error)(dcrn),
        }
    }
}

impl Default for DcrBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Scratch(u32);

    impl DcrDevice for Scratch {
        fn dcr_read(&mut self, _dcrn: u32) -> u32 {
            self.0
        }

        fn dcr_write(&mut self, _dcrn: u32, value: u32) {
            self.0 = value;
        }
    }

    #[test]
    fn s3_bind_and_round_trip() {
        let mut bus = DcrBus::new();
        bus.register(0x123, Box::new(Scratch(0))).unwrap();
        bus.write(0x123, 0xdead_beef);
        assert_eq!(bus.read(0x123) as u32, 0xdead_beef);
        assert_eq!(bus.read(0x124), -1);
    }

    #[test]
    fn unregistered_slot_delegates_to_default_error_callback() {
        let mut bus = DcrBus::new();
        assert_eq!(bus.read(7), -1);
        assert_eq!(bus.write(7, 42), -1);
    }

    #[test]
    fn out_of_range_delegates_to_same_error_callback_as_empty_slot() {
        let mut bus = DcrBus::new();
        assert!(matches!(
            bus.register(DCR_SLOTS as u32, Box::new(Scratch(0))),
            Err(Error::OutOfRange(_, _))
        ));
        assert_eq!(bus.read(DCR_SLOTS as u32), bus.read(7));
        assert_eq!(bus.write(DCR_SLOTS as u32, 1), bus.write(7, 1));
    }

    #[test]
    fn custom_error_callbacks_are_invoked_for_both_conditions() {
        let mut bus = DcrBus::new();
        bus.register(3, Box::new(Scratch(0))).unwrap();

        let reads_seen: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
        let writes_seen: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));
        let reads_clone = reads_seen.clone();
        let writes_clone = writes_seen.clone();
        bus.set_read_error(move |dcrn| {
            reads_clone.borrow_mut().push(dcrn);
            -2
        });
        bus.set_write_error(move |dcrn| {
            writes_clone.borrow_mut().push(dcrn);
            -2
        });

        // Registered slot: callbacks not invoked.
        assert_eq!(bus.read(3), 0);
        assert_eq!(bus.write(3, 9), 0);
        assert!(reads_seen.borrow().is_empty());
        assert!(writes_seen.borrow().is_empty());

        // Empty in-range slot: callbacks invoked.
        assert_eq!(bus.read(4), -2);
        assert_eq!(bus.write(4, 1), -2);
        assert_eq!(*reads_seen.borrow(), vec![4]);
        assert_eq!(*writes_seen.borrow(), vec![4]);

        // Out-of-range: same callbacks invoked.
        assert_eq!(bus.read(DCR_SLOTS as u32), -2);
        assert_eq!(bus.write(DCR_SLOTS as u32, 1), -2);
        assert_eq!(*reads_seen.borrow(), vec![4, DCR_SLOTS as u32]);
        assert_eq!(*writes_seen.borrow(), vec![4, DCR_SLOTS as u32]);
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut bus = DcrBus::new();
        bus.register(3, Box::new(Scratch(0))).unwrap();
        assert!(matches!(
            bus.register(3, Box::new(Scratch(0))),
            Err(Error::AlreadyRegistered(3))
        ));
    }
}
