//! Lock-free bounded ring buffer for clause exchange.
//!
//! The ring is a shared array of 32 bit words. Each record starts with a length word counting the
//! record's total size in words, followed by the payload. A `-1` length word marks the current
//! write end, a `0` length word redirects readers to the start of the buffer (the record did not
//! fit into the remaining space).
//!
//! Producers serialize among each other with a spin lock around the claim of the write position,
//! but write their payload outside of it. The length word is written last with release ordering;
//! readers load it with acquire ordering, so a reader either sees the complete record or none of
//! it. Records are never rewritten. Readers keep their own cursor and are not tracked: a producer
//! that laps a slow reader overwrites unread records. The buffer has to be sized so that this
//! stays rare; correctness of the solver does not depend on it, only clause sharing does.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

/// Position of a record in the ring, in words.
pub type RingPos = u32;

const END_MARKER: i32 = -1;
const WRAP_MARKER: i32 = 0;

/// Lock-free bounded ring buffer of 32 bit words.
pub struct ExchangeRing {
    data: Box<[AtomicI32]>,
    write_locked: AtomicBool,
    write_end: AtomicU32,
}

impl ExchangeRing {
    /// Create a ring with (at least) the given number of bytes.
    pub fn new(bytes: usize) -> ExchangeRing {
        let words = (bytes / std::mem::size_of::<i32>()).max(512);
        let mut data = Vec::with_capacity(words);
        for _ in 0..words {
            data.push(AtomicI32::new(0));
        }
        data[0] = AtomicI32::new(END_MARKER);

        ExchangeRing {
            data: data.into_boxed_slice(),
            write_locked: AtomicBool::new(false),
            write_end: AtomicU32::new(0),
        }
    }

    /// Capacity in words.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Follow a wrap marker if there is one at the given position.
    fn pos_safe(&self, pos: RingPos) -> RingPos {
        debug_assert!((pos as usize) < self.data.len());
        if self.data[pos as usize].load(Ordering::Acquire) == WRAP_MARKER {
            0
        } else {
            pos
        }
    }

    /// Whether a complete record is available at the given position.
    pub fn is_valid(&self, pos: RingPos) -> bool {
        let pos = self.pos_safe(pos);
        self.data[pos as usize].load(Ordering::Acquire) != END_MARKER
    }

    /// Position of the record following the one at `pos`.
    ///
    /// Only valid when `is_valid(pos)` holds.
    pub fn next_pos(&self, pos: RingPos) -> RingPos {
        debug_assert!(self.is_valid(pos));
        let pos = self.pos_safe(pos);
        let len = self.data[pos as usize].load(Ordering::Relaxed);
        debug_assert!(len > 0);
        pos + len as RingPos
    }

    /// Copy the payload of the record at `pos` into the given buffer.
    ///
    /// Only valid when `is_valid(pos)` holds.
    pub fn read_record(&self, pos: RingPos, out: &mut Vec<i32>) {
        let pos = self.pos_safe(pos) as usize;
        let len = self.data[pos].load(Ordering::Acquire);
        debug_assert!(len > 0);

        out.clear();
        for index in pos + 1..pos + len as usize {
            out.push(self.data[index].load(Ordering::Relaxed));
        }
    }

    /// Append a record with the given payload.
    pub fn push(&self, payload: &[i32]) {
        let cap = self.data.len() as u32;
        let add_size = payload.len() as u32 + 1;
        assert!(add_size < cap, "record does not fit the exchange ring");

        while self
            .write_locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }

        let mut start = self.write_end.load(Ordering::Relaxed);
        if cap <= start + add_size {
            // Not enough contiguous room, redirect readers to the buffer start.
            self.data[0].store(END_MARKER, Ordering::Relaxed);
            self.data[start as usize].store(WRAP_MARKER, Ordering::Release);
            start = 0;
        }

        self.data[(start + add_size) as usize].store(END_MARKER, Ordering::Relaxed);
        self.write_end.store(start + add_size, Ordering::SeqCst);
        self.write_locked.store(false, Ordering::SeqCst);

        // The region is claimed, the payload can be written without holding the lock. The length
        // word is stored last and publishes the record.
        for (index, &word) in payload.iter().enumerate() {
            self.data[start as usize + 1 + index].store(word, Ordering::Relaxed);
        }
        self.data[start as usize].store(add_size as i32, Ordering::Release);
    }

    /// Number of words between a reader position and the write end.
    pub fn unread_words(&self, pos: RingPos) -> usize {
        let end = self.write_end.load(Ordering::Relaxed);
        let words = if end >= pos {
            end - pos
        } else {
            self.data.len() as u32 - pos + end
        };
        words as usize
    }

    /// Whether a reader at the given position should catch up on reading.
    pub fn should_import(&self, pos: RingPos) -> bool {
        self.unread_words(pos) * 4 > self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    #[test]
    fn roundtrip_records() {
        let ring = ExchangeRing::new(4096);

        ring.push(&[3, 1, 4, 1, 5]);
        ring.push(&[9, 2, 6]);

        let mut pos = 0;
        let mut record = vec![];

        assert!(ring.is_valid(pos));
        ring.read_record(pos, &mut record);
        assert_eq!(record, vec![3, 1, 4, 1, 5]);
        pos = ring.next_pos(pos);

        assert!(ring.is_valid(pos));
        ring.read_record(pos, &mut record);
        assert_eq!(record, vec![9, 2, 6]);
        pos = ring.next_pos(pos);

        assert!(!ring.is_valid(pos));
    }

    #[test]
    fn wraps_around() {
        let ring = ExchangeRing::new(2048);
        let words = ring.capacity();

        // Each record occupies 5 words, push enough to wrap a few times.
        let record_count = words;
        let mut positions = vec![0];
        for i in 0..record_count {
            ring.push(&[i as i32, 2, 3, 4]);
            let &last = positions.last().unwrap();
            if ring.is_valid(last) {
                positions.push(ring.next_pos(last));
            }
        }

        // A reader that kept up sees consistent records.
        let mut record = vec![];
        let mut pos = *positions.last().unwrap();
        while ring.is_valid(pos) {
            ring.read_record(pos, &mut record);
            assert_eq!(record.len(), 4);
            assert_eq!(&record[1..], &[2, 3, 4]);
            pos = ring.next_pos(pos);
        }
    }

    #[test]
    fn concurrent_producers_no_torn_records() {
        // Sized so that the producers cannot lap the reader, records are only overwritten once
        // the buffer wraps.
        let ring = Arc::new(ExchangeRing::new(1 << 20));
        let producers = 4;
        let per_producer = 2000;

        let mut handles = vec![];
        for id in 0..producers {
            let ring = Arc::clone(&ring);
            handles.push(std::thread::spawn(move || {
                for i in 0..per_producer {
                    // Payload where every word is derived from the first, so tearing is
                    // detectable.
                    let base = (id * per_producer + i) as i32;
                    ring.push(&[base, base ^ 1, base ^ 2, base ^ 3]);
                }
            }));
        }

        // Concurrent reader: every observed record must be internally consistent.
        let reader_ring = Arc::clone(&ring);
        let reader = std::thread::spawn(move || {
            let mut pos = 0;
            let mut record = vec![];
            let mut seen = 0usize;
            while seen < producers * per_producer / 2 {
                if reader_ring.is_valid(pos) {
                    reader_ring.read_record(pos, &mut record);
                    assert_eq!(record.len(), 4);
                    let base = record[0];
                    assert_eq!(record[1], base ^ 1);
                    assert_eq!(record[2], base ^ 2);
                    assert_eq!(record[3], base ^ 3);
                    pos = reader_ring.next_pos(pos);
                    seen += 1;
                } else {
                    std::thread::yield_now();
                }
            }
        });

        for handle in handles {
            handle.join().unwrap();
        }
        reader.join().unwrap();
    }
}
