use parking_lot::Mutex;

/// Clears an object for reuse while keeping its allocations.
pub trait Reset {
    fn reset(&mut self);
}

/// A freelist of response objects for the serving path.
///
/// `acquire` hands out an idle object or a fresh default one; `release`
/// resets the object before parking it, so callers always receive a
/// zero-valued object whose buffers keep their grown capacity.
pub struct Pool<T> {
    idle: Mutex<Vec<T>>,
}

impl<T: Default + Reset> Pool<T> {
    pub fn new() -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn acquire(&self) -> T {
        self.idle.lock().pop().unwrap_or_default()
    }

    pub fn release(&self, mut value: T) {
        value.reset();
        self.idle.lock().push(value);
    }

    #[cfg(test)]
    fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }
}

impl<T: Default + Reset> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Buf {
        data: Vec<u8>,
    }

    impl Reset for Buf {
        fn reset(&mut self) {
            self.data.clear();
        }
    }

    #[test]
    fn empty_pool_hands_out_defaults() {
        let pool: Pool<Buf> = Pool::new();
        assert!(pool.acquire().data.is_empty());
        assert_eq!(pool.idle_len(), 0);
    }

    #[test]
    fn released_objects_come_back_cleared_with_capacity() {
        let pool: Pool<Buf> = Pool::new();
        let mut b = pool.acquire();
        b.data.extend_from_slice(&[7u8; 4096]);
        pool.release(b);
        assert_eq!(pool.idle_len(), 1);

        let b = pool.acquire();
        assert!(b.data.is_empty());
        assert!(b.data.capacity() >= 4096);
        assert_eq!(pool.idle_len(), 0);
    }

    #[test]
    fn shared_across_threads() {
        let pool: Arc<Pool<Buf>> = Arc::new(Pool::new());
        let mut handles = Vec::new();
        for i in 0..4u8 {
            let pool = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let mut b = pool.acquire();
                    assert!(b.data.is_empty());
                    b.data.push(i);
                    pool.release(b);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
