use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// "Has this work finished" marker for one submission on a backend without
/// a CPU-observable native fence.
///
/// The backend's completion mechanism calls [`SyncPoint::trigger`]; fences
/// only read it.
#[derive(Debug, Clone, Default)]
pub struct SyncPoint {
    triggered: Arc<AtomicBool>,
}

impl SyncPoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }
}

/// Sync points registered under one logical fence value.
#[derive(Debug)]
pub struct SyncGroup {
    pub value: u64,
    points: Vec<SyncPoint>,
}

impl SyncGroup {
    pub fn new(value: u64, points: Vec<SyncPoint>) -> Self {
        Self { value, points }
    }

    /// Drop every triggered point; true once none remain.
    pub fn retire_triggered(&mut self) -> bool {
        self.points.retain(|p| !p.is_triggered());
        self.points.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.points.len()
    }
}
