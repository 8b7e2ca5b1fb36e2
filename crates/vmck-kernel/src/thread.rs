//! Threads and stack frames.

use crate::class::MethodId;
use crate::heap::ObjRef;

/// Scheduler-visible state of a thread. The ordinal is part of the
/// fingerprint, so discriminants are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RunState {
    New = 0,
    Running = 1,
    Blocked = 2,
    Waiting = 3,
    Notified = 4,
    Interrupted = 5,
    Terminated = 6,
}

impl RunState {
    #[inline]
    pub fn ordinal(self) -> i32 {
        self as i32
    }
}

/// One stack frame: method, next-instruction index, and the slot vector
/// (locals first, then the operand stack).
///
/// `pc` is `None` in the rare case a listener cleared the next instruction
/// while the frame is still live.
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub method: MethodId,
    pub pc: Option<i32>,
    /// Number of leading slots that are locals; the rest is operand stack.
    pub local_count: u32,
    pub slots: Vec<i32>,
    /// Parallel to `slots`: true where the slot holds an object reference.
    pub ref_map: Vec<bool>,
}

impl StackFrame {
    pub fn new(method: MethodId, pc: i32, local_count: u32) -> Self {
        Self {
            method,
            pc: Some(pc),
            local_count,
            slots: Vec::new(),
            ref_map: Vec::new(),
        }
    }

    pub fn push_slot(&mut self, v: i32) {
        self.slots.push(v);
        self.ref_map.push(false);
    }

    pub fn push_ref_slot(&mut self, r: ObjRef) {
        self.slots.push(r.as_i32());
        self.ref_map.push(true);
    }

    #[inline]
    pub fn is_reference_slot(&self, i: usize) -> bool {
        self.ref_map.get(i).copied().unwrap_or(false)
    }

    /// Depth of the operand stack (slots above the locals).
    #[inline]
    pub fn operand_depth(&self) -> i32 {
        self.slots.len() as i32 - self.local_count as i32
    }

    /// References held anywhere in the frame, locals and operands alike.
    pub fn reference_slots(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.slots
            .iter()
            .zip(self.ref_map.iter())
            .filter(|(_, is_ref)| **is_ref)
            .map(|(v, _)| ObjRef(*v))
    }
}

/// One thread of the program under test.
///
/// `frames` is push-ordered: the last element is the innermost (top) frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadInfo {
    pub id: i32,
    pub state: RunState,
    /// The thread's own heap object; serialized as a heap root.
    pub thread_object: ObjRef,
    /// Object this thread is blocked on or waiting for, if any.
    pub lock_object: Option<ObjRef>,
    /// Objects this thread holds monitor locks on. A set by construction:
    /// re-entering a monitor bumps a count, it does not add an entry.
    pub locked_objects: Vec<ObjRef>,
    pub frames: Vec<StackFrame>,
}

impl ThreadInfo {
    pub fn new(id: i32, state: RunState, thread_object: ObjRef) -> Self {
        Self {
            id,
            state,
            thread_object,
            lock_object: None,
            locked_objects: Vec::new(),
            frames: Vec::new(),
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        !matches!(self.state, RunState::New | RunState::Terminated)
    }

    #[inline]
    pub fn stack_depth(&self) -> i32 {
        self.frames.len() as i32
    }

    /// Frames from innermost (top) to outermost (bottom).
    pub fn frames_top_down(&self) -> impl Iterator<Item = &StackFrame> {
        self.frames.iter().rev()
    }
}

/// All threads, in creation order. Creation order is stable across runs of
/// the same program, which the fingerprint relies on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadList {
    threads: Vec<ThreadInfo>,
}

impl ThreadList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, ti: ThreadInfo) {
        self.threads.push(ti);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThreadInfo> {
        self.threads.iter()
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut ThreadInfo> {
        self.threads.get_mut(idx)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}
