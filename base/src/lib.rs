// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Host-side plumbing shared by the emulation core: a deterministic virtual
//! clock, a one-shot timer queue driven off it, and the crate's logging
//! facade.

mod clock;

pub use clock::TimerHandle;
pub use clock::TimerQueue;
pub use clock::VirtualClock;
pub use clock::TICKS_PER_SEC;

pub use log::*;

/// Installs an `env_logger` subscriber reading `RUST_LOG`, matching the
/// convention the rest of the crate's logging calls (`log::debug!`,
/// `log::warn!`, ...) expect. Idempotent: a second call is a harmless no-op.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(false).try_init();
}
