// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use log::warn;

/// Move the calling thread onto the real-time FIFO scheduler.
///
/// Failure, usually a missing `CAP_SYS_NICE`, is logged and ignored.
#[cfg(target_os = "linux")]
pub fn set_process_priority() {
    let mut param = libc::sched_param { sched_priority: 10 };
    let tid = unsafe { libc::pthread_self() };
    let err = unsafe {
        libc::pthread_setschedparam(tid, libc::SCHED_FIFO, &mut param as *mut libc::sched_param)
    };
    if err != 0 {
        let err = std::io::Error::from_raw_os_error(err);
        let name = std::thread::current().name().unwrap_or("unnamed").to_string();
        warn!("unable to set {} real-time fifo scheduler: {}", name, err);
    }
}

/// Real-time scheduling is only available on Linux.
#[cfg(not(target_os = "linux"))]
pub fn set_process_priority() {}
