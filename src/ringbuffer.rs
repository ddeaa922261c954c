//! Fixed-capacity FIFO buffer for rolling sample series.
//!
//! Storage is allocated once at construction, so a host's history never grows
//! past `capacity * size_of::<T>()` no matter how long it is polled.

/// A circular buffer holding the newest `capacity` samples.
#[derive(Debug, Clone)]
pub struct Ringbuffer<T> {
    entries: Vec<T>,
    capacity: usize,
    write_index: usize,
    count: usize,
}

impl<T: Copy + Default> Ringbuffer<T> {
    /// Creates a new ringbuffer with the specified capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: vec![T::default(); capacity],
            capacity,
            write_index: 0,
            count: 0,
        }
    }

    /// Pushes a new entry. If the buffer is full, the oldest entry is
    /// overwritten.
    pub fn push(&mut self, entry: T) {
        self.entries[self.write_index] = entry;
        self.write_index = (self.write_index + 1) % self.capacity;

        if self.count < self.capacity {
            self.count += 1;
        }
    }

    /// Returns all entries in chronological order (oldest to newest).
    pub fn get_history(&self) -> Vec<T> {
        let mut result = Vec::with_capacity(self.count);

        if self.count < self.capacity {
            result.extend_from_slice(&self.entries[..self.count]);
        } else {
            // Full: oldest entry sits at write_index
            result.extend_from_slice(&self.entries[self.write_index..]);
            result.extend_from_slice(&self.entries[..self.write_index]);
        }

        result
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bytes reserved for the entries.
    pub fn allocated_bytes(&self) -> usize {
        self.capacity * std::mem::size_of::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ringbuffer_push_and_read() {
        let mut rb: Ringbuffer<f64> = Ringbuffer::new(3);

        assert_eq!(rb.len(), 0);
        assert_eq!(rb.capacity(), 3);

        rb.push(12.5);

        assert_eq!(rb.len(), 1);
        assert_eq!(rb.get_history(), vec![12.5]);
    }

    #[test]
    fn test_ringbuffer_wraparound() {
        let mut rb: Ringbuffer<i64> = Ringbuffer::new(3);

        for i in 0..5 {
            rb.push(1000 + i * 100);
        }

        // Only the last 3 remain, oldest first
        assert_eq!(rb.get_history(), vec![1200, 1300, 1400]);
        assert_eq!(rb.len(), 3);
    }

    #[test]
    fn test_ringbuffer_empty() {
        let rb: Ringbuffer<f64> = Ringbuffer::new(10);
        assert!(rb.is_empty());
        assert!(rb.get_history().is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut rb: Ringbuffer<u8> = Ringbuffer::new(0);
        rb.push(1);
        rb.push(2);
        assert_eq!(rb.get_history(), vec![2]);
        assert_eq!(rb.allocated_bytes(), 1);
    }
}
