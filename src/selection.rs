use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// A view that depicts entities by name. Called after every selection change;
/// the view re-reads the selection it is handed and restyles itself.
pub trait Repaint {
    fn repaint(&mut self, selected: Option<&str>);
}

pub type Subscriber = Rc<RefCell<dyn Repaint>>;

#[derive(Default)]
pub struct SelectionState {
    current: Option<String>,
    subscribers: Vec<Subscriber>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view and paint it once with the current selection.
    pub fn subscribe(&mut self, view: Subscriber) {
        view.borrow_mut().repaint(self.current.as_deref());
        self.subscribers.push(view);
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Select `name`, or clear the selection if `name` is already selected.
    pub fn toggle(&mut self, name: &str) {
        if self.current.as_deref() == Some(name) {
            self.current = None;
        } else {
            self.current = Some(name.to_string());
        }
        debug!("Selection changed - selected={:?}", self.current);
        self.notify();
    }

    pub fn clear(&mut self) {
        self.current = None;
        debug!("Selection cleared");
        self.notify();
    }

    fn notify(&self) {
        for s in &self.subscribers {
            s.borrow_mut().repaint(self.current.as_deref());
        }
    }
}
