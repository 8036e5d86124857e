//! Transmit queue: FIFO of bank indices awaiting emission.
//!
//! Sixteen slots, power of two so wrap is by masking. The queue is larger
//! than the bank pool, so enqueue can never fail while the pool invariants
//! hold.

use crate::bank::BankId;

/// Queue capacity. Must stay a power of two and >= the bank count.
pub const QUEUE_LEN: usize = 16;

const MASK: u8 = (QUEUE_LEN - 1) as u8;

/// FIFO of completed sentences, identified by bank.
pub struct TxQueue {
    slots: [BankId; QUEUE_LEN],
    head: u8,
    tail: u8,
}

impl TxQueue {
    pub fn new() -> Self {
        Self {
            slots: [BankId::ZERO; QUEUE_LEN],
            head: 0,
            tail: 0,
        }
    }

    /// Append a completed sentence's bank.
    pub fn push(&mut self, id: BankId) {
        debug_assert!(self.len() < QUEUE_LEN);
        self.slots[(self.tail & MASK) as usize] = id;
        self.tail = self.tail.wrapping_add(1);
    }

    /// Take the oldest queued bank.
    pub fn pop(&mut self) -> Option<BankId> {
        if self.head == self.tail {
            return None;
        }
        let id = self.slots[(self.head & MASK) as usize];
        self.head = self.head.wrapping_add(1);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.tail.wrapping_sub(self.head) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Queued banks, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = BankId> + '_ {
        (0..self.len() as u8).map(move |i| self.slots[(self.head.wrapping_add(i) & MASK) as usize])
    }
}

impl Default for TxQueue {
    fn default() -> Self {
        Self::new()
    }
}
