//! Bounded window of recently seen delivery ids.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Outcome of offering a delivery id to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First sighting; the id is now reserved until committed or forgotten.
    New,
    /// Already accepted recently.
    Duplicate,
    /// Reserved by a request that has not finished yet.
    InFlight,
}

/// Remembers the last `capacity` ids; the oldest is forgotten first.
pub struct DedupWindow {
    inner: Mutex<Window>,
    capacity: usize,
}

#[derive(Default)]
struct Window {
    order: VecDeque<String>,
    /// id -> committed
    seen: HashMap<String, bool>,
}

impl DedupWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Window::default()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve an id unless it is already known.
    pub fn admit(&self, id: &str) -> Admission {
        let mut window = self.lock();
        match window.seen.get(id) {
            Some(true) => return Admission::Duplicate,
            Some(false) => return Admission::InFlight,
            None => {}
        }
        if window.order.len() >= self.capacity {
            if let Some(oldest) = window.order.pop_front() {
                window.seen.remove(&oldest);
            }
        }
        window.order.push_back(id.to_string());
        window.seen.insert(id.to_string(), false);
        Admission::New
    }

    /// Mark a reserved id as accepted; later sightings are duplicates.
    pub fn commit(&self, id: &str) {
        if let Some(committed) = self.lock().seen.get_mut(id) {
            *committed = true;
        }
    }

    /// Drop an id so a later redelivery is accepted again.
    pub fn forget(&self, id: &str) {
        let mut window = self.lock();
        if window.seen.remove(id).is_some() {
            window.order.retain(|seen| seen != id);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
