// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
/// A bounded circular queue with a fixed, compile-time capacity.
///
/// Backs each channel's queue of pending sample buffers. All storage is
/// inline; push and pop never allocate, which keeps the mix path free of
/// heap traffic.
pub(crate) struct RingQueue<T, const N: usize> {
    slots: [Option<T>; N],
    head: usize,
    tail: usize,
    len: usize,
}

impl<T, const N: usize> RingQueue<T, N> {
    pub(crate) fn new() -> Self {
        RingQueue {
            slots: std::array::from_fn(|_| None),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Appends a value at the tail. Returns the value back to the caller
    /// when the queue is full.
    pub(crate) fn push(&mut self, value: T) -> Result<(), T> {
        if self.len == N {
            return Err(value);
        }

        self.slots[self.tail] = Some(value);
        self.tail = (self.tail + 1) % N;
        self.len += 1;
        Ok(())
    }

    /// Removes and returns the value at the head.
    pub(crate) fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }

        let value = self.slots[self.head].take();
        self.head = (self.head + 1) % N;
        self.len -= 1;
        value
    }

    /// The value at the head, if any.
    pub(crate) fn front(&self) -> Option<&T> {
        self.slots[self.head].as_ref()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len == N
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_order() {
        let mut queue: RingQueue<u32, 4> = RingQueue::new();
        assert!(queue.is_empty());

        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.push(3).unwrap();
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_rejects_push_when_full() {
        let mut queue: RingQueue<u32, 2> = RingQueue::new();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert!(queue.is_full());

        assert_eq!(queue.push(3), Err(3));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(1));
    }

    #[test]
    fn test_wraparound() {
        let mut queue: RingQueue<u32, 3> = RingQueue::new();

        // Cycle through the slots several times so head and tail wrap.
        for round in 0..5u32 {
            queue.push(round * 2).unwrap();
            queue.push(round * 2 + 1).unwrap();
            assert_eq!(queue.pop(), Some(round * 2));
            assert_eq!(queue.pop(), Some(round * 2 + 1));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_front_does_not_consume() {
        let mut queue: RingQueue<u32, 2> = RingQueue::new();
        assert_eq!(queue.front(), None);

        queue.push(7).unwrap();
        assert_eq!(queue.front(), Some(&7));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop(), Some(7));
    }
}
