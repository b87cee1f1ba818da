use parking_lot::Condvar;
use parking_lot::Mutex;

/// A counting semaphore.
///
/// Used by the dispatcher's test hooks to freeze a background step until the test
/// releases it.
pub(crate) struct Semaphore {
  permits: Mutex<usize>,
  cv: Condvar,
}

impl Semaphore {
  pub fn new(permits: usize) -> Semaphore {
    Semaphore {
      permits: Mutex::new(permits),
      cv: Condvar::new(),
    }
  }

  pub fn signal(&self) {
    let mut permits = self.permits.lock();
    *permits += 1;
    self.cv.notify_one();
  }

  pub fn wait(&self) {
    let mut permits = self.permits.lock();
    while *permits == 0 {
      self.cv.wait(&mut permits);
    }
    *permits -= 1;
  }
}
