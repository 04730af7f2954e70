//! Lexical/loop scope stack.

use alloc::vec::Vec;

/// A single break/continue forward-patch target, recorded until the owning
/// loop closes.
pub use crate::bytecode::PatchId;

/// A scope frame. Loop frames additionally carry loop-specific offsets,
/// initialised to `-1` until the compiler fills them in, and per-loop
/// break/continue patch lists.
#[derive(Debug)]
pub enum Frame {
    Lexical,
    Loop(LoopFrame),
}

#[derive(Debug)]
pub struct LoopFrame {
    pub start_offset: i64,
    pub continue_offset: i64,
    pub end_offset: i64,
    pub break_patches: Vec<PatchId>,
    pub continue_patches: Vec<PatchId>,
}

impl LoopFrame {
    pub fn new() -> Self {
        Self {
            start_offset: -1,
            continue_offset: -1,
            end_offset: -1,
            break_patches: Vec::new(),
            continue_patches: Vec::new(),
        }
    }
}

impl Default for LoopFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Stack of lexical/loop frames. Pop on empty is a no-op;
/// the compiler resets its own `current_loop_*` bookkeeping separately.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_lexical(&mut self) {
        self.frames.push(Frame::Lexical);
    }

    pub fn push_loop(&mut self) {
        self.frames.push(Frame::Loop(LoopFrame::new()));
    }

    /// Pops the innermost frame. A no-op (diagnostics only) if the stack is
    /// empty; an unmatched pop must never abort the compile.
    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn current(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// The innermost loop frame, looking outward through lexical frames.
    pub fn current_loop_mut(&mut self) -> Option<&mut LoopFrame> {
        self.frames.iter_mut().rev().find_map(|f| match f {
            Frame::Loop(l) => Some(l),
            Frame::Lexical => None,
        })
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn loop_depth(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| matches!(f, Frame::Loop(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_depth_counts_only_loop_frames() {
        let mut scopes = ScopeStack::new();
        scopes.push_lexical();
        scopes.push_loop();
        scopes.push_lexical();
        scopes.push_loop();
        assert_eq!(scopes.depth(), 4);
        assert_eq!(scopes.loop_depth(), 2);
    }

    #[test]
    fn pop_on_empty_is_a_no_op() {
        let mut scopes = ScopeStack::new();
        assert!(scopes.pop().is_none());
        assert_eq!(scopes.depth(), 0);
    }

    #[test]
    fn loop_frame_offsets_start_uninitialised() {
        let mut scopes = ScopeStack::new();
        scopes.push_loop();
        let l = scopes.current_loop_mut().unwrap();
        assert_eq!(l.start_offset, -1);
        assert_eq!(l.continue_offset, -1);
        assert_eq!(l.end_offset, -1);
    }

    #[test]
    fn current_loop_mut_sees_through_nested_lexical_frames() {
        let mut scopes = ScopeStack::new();
        scopes.push_loop();
        scopes.push_lexical();
        assert!(scopes.current_loop_mut().is_some());
    }
}
