//! Popup permission stack
//!
//! Plugins bracket calls that may open windows with push/pop of an "allowed"
//! flag. The innermost entry wins.

use std::cell::RefCell;

#[derive(Debug, Default)]
pub struct PopupStateStack {
    states: RefCell<Vec<bool>>,
}

impl PopupStateStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, allowed: bool) {
        self.states.borrow_mut().push(allowed);
    }

    /// Popping an empty stack does nothing.
    pub fn pop(&self) {
        self.states.borrow_mut().pop();
    }

    pub fn are_popups_allowed(&self) -> bool {
        self.states.borrow().last().copied().unwrap_or(false)
    }

    pub fn depth(&self) -> usize {
        self.states.borrow().len()
    }

    pub fn clear(&self) {
        self.states.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_of_stack_wins() {
        let stack = PopupStateStack::new();
        stack.push(true);
        stack.push(false);
        assert!(!stack.are_popups_allowed());
        stack.pop();
        assert!(stack.are_popups_allowed());
    }

    #[test]
    fn test_over_pop_leaves_empty_and_disallowed() {
        let stack = PopupStateStack::new();
        stack.push(true);
        stack.pop();
        stack.pop();
        stack.pop();
        assert_eq!(stack.depth(), 0);
        assert!(!stack.are_popups_allowed());
    }
}
