//! Cooperative micro-thread scheduler.
//!
//! There is no host-side preemption of a running micro-thread:
//! control transfers only via explicit block/unblock/suspend calls, which is
//! exactly the surface the Timeout path and the tick subsystem need.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicroThread {
    pub id: u32,
    pub block_reason: Option<u32>,
    pub suspended: bool,
}

/// The main thread always has id 0.
pub const MAIN_THREAD: u32 = 0;

#[derive(Debug, Clone)]
pub struct ThreadScheduler {
    threads: Vec<MicroThread>,
    current: u32,
    next_id: u32,
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadScheduler {
    pub fn new() -> Self {
        ThreadScheduler {
            threads: vec![MicroThread {
                id: MAIN_THREAD,
                block_reason: None,
                suspended: false,
            }],
            current: MAIN_THREAD,
            next_id: 1,
        }
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn is_main(&self) -> bool {
        self.current == MAIN_THREAD
    }

    pub fn set_current(&mut self, tid: u32) {
        self.current = tid;
    }

    pub fn spawn(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.threads.push(MicroThread {
            id,
            block_reason: None,
            suspended: false,
        });
        id
    }

    fn find_mut(&mut self, tid: u32) -> Option<&mut MicroThread> {
        self.threads.iter_mut().find(|t| t.id == tid)
    }

    pub fn block(&mut self, tid: u32, reason: u32) {
        if let Some(t) = self.find_mut(tid) {
            t.block_reason = Some(reason);
            t.suspended = false;
        }
    }

    pub fn unblock(&mut self, tid: u32) {
        if let Some(t) = self.find_mut(tid) {
            t.block_reason = None;
        }
    }

    pub fn suspend(&mut self, tid: u32) {
        if let Some(t) = self.find_mut(tid) {
            t.suspended = true;
            t.block_reason = None;
        }
    }

    pub fn count_blocked(&self, reason: u32) -> usize {
        self.threads
            .iter()
            .filter(|t| t.block_reason == Some(reason))
            .count()
    }

    pub fn blocked_on(&self, reason: u32) -> Vec<u32> {
        self.threads
            .iter()
            .filter(|t| t.block_reason == Some(reason))
            .map(|t| t.id)
            .collect()
    }

    /// Picks the next runnable thread other than `tid`, for the Timeout
    /// path: the offending thread is parked and the
    /// scheduler must move on to whatever else is ready.
    pub fn next_runnable_excluding(&self, tid: u32) -> Option<u32> {
        self.threads
            .iter()
            .find(|t| t.id != tid && t.block_reason.is_none() && !t.suspended)
            .map(|t| t.id)
    }
}
