use std::cell::Cell;

/// Marks a delivered record as processed. Records left unacknowledged are
/// delivered again.
#[derive(Debug, Default)]
pub struct Acknowledgment {
    acknowledged: Cell<bool>,
}

impl Acknowledgment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acknowledge(&self) {
        self.acknowledged.set(true);
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.get()
    }
}
