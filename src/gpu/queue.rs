//! C3 — Render Command Queue: a mutex-guarded FIFO with a condition
//! variable for consumer wakeups, the hosted analogue of the teacher's
//! spin-locked scheduler queues (here `Condvar::wait_timeout` replaces a
//! busy-loop, which is why `spin` is not used for this structure).

use super::commands::RenderCommand;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct Inner {
    deque: VecDeque<RenderCommand>,
    frame_count: u64,
}

pub struct RenderCommandQueue {
    inner: Mutex<Inner>,
    signal: Condvar,
    push_count: AtomicU64,
    pop_count: AtomicU64,
}

impl Default for RenderCommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderCommandQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { deque: VecDeque::new(), frame_count: 0 }),
            signal: Condvar::new(),
            push_count: AtomicU64::new(0),
            pop_count: AtomicU64::new(0),
        }
    }

    pub fn push(&self, cmd: RenderCommand) {
        let mut inner = self.inner.lock().unwrap();
        inner.deque.push_back(cmd);
        self.push_count.fetch_add(1, Ordering::Relaxed);
        self.signal.notify_one();
    }

    pub fn push_many(&self, cmds: Vec<RenderCommand>) {
        if cmds.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        let n = cmds.len() as u64;
        inner.deque.extend(cmds);
        self.push_count.fetch_add(n, Ordering::Relaxed);
        self.signal.notify_one();
    }

    pub fn end_frame(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.deque.push_back(RenderCommand::EndFrame);
        inner.frame_count += 1;
        self.push_count.fetch_add(1, Ordering::Relaxed);
        self.signal.notify_one();
    }

    pub fn pop_all(&self) -> Vec<RenderCommand> {
        let mut inner = self.inner.lock().unwrap();
        let drained: Vec<RenderCommand> = inner.deque.drain(..).collect();
        self.pop_count.fetch_add(drained.len() as u64, Ordering::Relaxed);
        drained
    }

    /// Blocks until either the queue is non-empty or `timeout_ms` elapses;
    /// returns whether commands are available.
    pub fn wait_for_commands(&self, timeout_ms: u64) -> bool {
        let inner = self.inner.lock().unwrap();
        if !inner.deque.is_empty() {
            return true;
        }
        let (inner, timeout_result) = self
            .signal
            .wait_timeout_while(inner, Duration::from_millis(timeout_ms), |i| i.deque.is_empty())
            .unwrap();
        !timeout_result.timed_out() || !inner.deque.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().deque.is_empty()
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().deque.len()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().deque.clear();
    }

    pub fn frame_count(&self) -> u64 {
        self.inner.lock().unwrap().frame_count
    }

    pub fn push_telemetry(&self) -> (u64, u64) {
        (self.push_count.load(Ordering::Relaxed), self.pop_count.load(Ordering::Relaxed))
    }
}
