//! Per-thread call stack of the host runtime.

use crate::event::Frame;
use std::cell::RefCell;

thread_local! {
    static CALL_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Pops its frame when dropped, so the stack unwinds with early returns.
pub(crate) struct FrameGuard {
    _private: (),
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        CALL_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

pub(crate) fn push(frame: Frame) -> FrameGuard {
    CALL_STACK.with(|stack| stack.borrow_mut().push(frame));
    FrameGuard { _private: () }
}

/// Copy of the current thread's stack, innermost frame first
pub(crate) fn snapshot() -> Vec<Frame> {
    CALL_STACK.with(|stack| stack.borrow().iter().rev().cloned().collect())
}

pub(crate) fn depth() -> usize {
    CALL_STACK.with(|stack| stack.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FrameOrigin;
    use std::panic::Location;

    #[test]
    fn test_push_and_pop() {
        let before = depth();
        {
            let _outer = push(Frame::new(Location::caller(), "outer", FrameOrigin::Host));
            let _inner = push(Frame::new(Location::caller(), "inner", FrameOrigin::Engine));
            assert_eq!(depth(), before + 2);

            let frames = snapshot();
            assert_eq!(frames[0].method, "inner");
            assert_eq!(frames[1].method, "outer");
        }
        assert_eq!(depth(), before);
    }

    #[test]
    fn test_stack_is_per_thread() {
        let _frame = push(Frame::new(Location::caller(), "main", FrameOrigin::Host));
        let other = std::thread::spawn(depth).join().unwrap();
        assert_eq!(other, 0);
    }
}
