use ringbuf::{traits::*, HeapRb};

/// Sliding window over the most recent audio samples.
///
/// Writes never fail; once full, the oldest samples are overwritten.
pub struct AudioRingBuffer {
    buffer: HeapRb<f32>,
}

impl AudioRingBuffer {
    /// Create a new ring buffer with the specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: HeapRb::new(capacity.max(1)),
        }
    }

    /// Write samples, dropping the oldest ones on overflow
    pub fn write(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.buffer.push_overwrite(sample);
        }
    }

    /// Copy out the full window, oldest first, zero-padded at the front
    /// until enough samples have arrived
    pub fn snapshot(&self) -> Vec<f32> {
        let capacity = self.capacity();
        let mut window = vec![0.0; capacity - self.len()];
        window.extend(self.buffer.iter().copied());
        window
    }

    /// Get the number of samples currently held
    pub fn len(&self) -> usize {
        self.buffer.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer = HeapRb::new(self.capacity());
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity().get()
    }
}
