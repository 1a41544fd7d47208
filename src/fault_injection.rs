//! Injected failures at named points inside write transactions.
//!
//! Each point holds a countdown of pending failures. Checking an unarmed
//! point is a single atomic load.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::DagStoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    CreateGraphBeforeCommit,
    DeleteNodeBeforeCommit,
}

impl FaultPoint {
    const ALL: [FaultPoint; 2] = [
        FaultPoint::CreateGraphBeforeCommit,
        FaultPoint::DeleteNodeBeforeCommit,
    ];

    fn pending(self) -> &'static AtomicUsize {
        static PENDING: [AtomicUsize; 2] = [AtomicUsize::new(0), AtomicUsize::new(0)];
        &PENDING[self as usize]
    }
}

pub fn reset_faults() {
    for point in FaultPoint::ALL {
        point.pending().store(0, Ordering::Release);
    }
}

/// Makes the next `failures` passes through `point` fail.
pub fn configure_fault(point: FaultPoint, failures: usize) {
    point.pending().store(failures, Ordering::Release);
}

pub(crate) fn check_fault(point: FaultPoint) -> Result<(), DagStoreError> {
    let pending = point.pending();
    if pending.load(Ordering::Acquire) == 0 {
        return Ok(());
    }
    match pending.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1)) {
        Ok(_) => Err(DagStoreError::fault_injection(format!("{point:?}"))),
        Err(_) => Ok(()),
    }
}
