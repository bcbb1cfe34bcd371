//! Ring buffers behind a channel, one overflow policy each.

use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// Capacity used when none is given.
pub const DEFAULT_LIMIT: usize = 10;

/// Storage behind a channel.
pub trait Buffer<T> {
    fn is_empty(&self) -> bool;

    /// Store one item. Only the fixed policy ever fails.
    fn put(&mut self, item: T) -> Result<(), SagaError>;

    /// Oldest stored item.
    fn take(&mut self) -> Option<T>;

    /// Every stored item, oldest first, leaving the buffer empty.
    fn flush(&mut self) -> Vec<T>;
}

/// Buffer that stores nothing: puts are discarded.
#[derive(Debug, Default)]
pub struct NoBuffer;

impl<T> Buffer<T> for NoBuffer {
    fn is_empty(&self) -> bool {
        true
    }

    fn put(&mut self, _item: T) -> Result<(), SagaError> {
        Ok(())
    }

    fn take(&mut self) -> Option<T> {
        None
    }

    fn flush(&mut self) -> Vec<T> {
        Vec::new()
    }
}

/// What a full [`RingBuffer`] does with one more item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Reject with [`SagaError::Overflow`].
    Fail,
    /// Discard the incoming item.
    Drop,
    /// Evict the oldest item.
    Slide,
    /// Double the capacity.
    Expand,
}

/// Fixed-capacity ring storage.
#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    tail: usize,
    len: usize,
    overflow: Overflow,
}

impl<T> RingBuffer<T> {
    pub fn new(limit: usize, overflow: Overflow) -> Result<Self, SagaError> {
        if limit == 0 {
            return Err(SagaError::validation("buffer limit must be positive"));
        }
        Ok(Self {
            slots: empty_slots(limit),
            head: 0,
            tail: 0,
            len: 0,
            overflow,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    fn push(&mut self, item: T) {
        let limit = self.slots.len();
        self.slots[self.tail] = Some(item);
        self.tail = (self.tail + 1) % limit;
        self.len += 1;
    }

    fn grow(&mut self) {
        let items = self.flush();
        let limit = self.slots.len() * 2;
        self.slots = empty_slots(limit);
        for item in items {
            self.push(item);
        }
    }
}

fn empty_slots<T>(limit: usize) -> Vec<Option<T>> {
    std::iter::repeat_with(|| None).take(limit).collect()
}

impl<T> Buffer<T> for RingBuffer<T> {
    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn put(&mut self, item: T) -> Result<(), SagaError> {
        let limit = self.slots.len();
        if self.len < limit {
            self.push(item);
            return Ok(());
        }
        match self.overflow {
            Overflow::Fail => Err(SagaError::Overflow),
            Overflow::Drop => Ok(()),
            Overflow::Slide => {
                // full: tail == head, overwrite the oldest and move both
                self.slots[self.tail] = Some(item);
                self.tail = (self.tail + 1) % limit;
                self.head = self.tail;
                Ok(())
            }
            Overflow::Expand => {
                self.grow();
                self.push(item);
                Ok(())
            }
        }
    }

    fn take(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        item
    }

    fn flush(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.len);
        while let Some(item) = self.take() {
            items.push(item);
        }
        items
    }
}

/// Serializable choice of buffer, as used by `action_channel` and config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "limit", rename_all = "snake_case")]
pub enum BufferSpec {
    None,
    Fixed(usize),
    Dropping(usize),
    Sliding(usize),
    Expanding(usize),
}

impl Default for BufferSpec {
    fn default() -> Self {
        BufferSpec::Fixed(DEFAULT_LIMIT)
    }
}

impl BufferSpec {
    pub fn build<T: 'static>(self) -> Result<Box<dyn Buffer<T>>, SagaError> {
        let (limit, overflow) = match self {
            BufferSpec::None => return Ok(Box::new(NoBuffer)),
            BufferSpec::Fixed(n) => (n, Overflow::Fail),
            BufferSpec::Dropping(n) => (n, Overflow::Drop),
            BufferSpec::Sliding(n) => (n, Overflow::Slide),
            BufferSpec::Expanding(n) => (n, Overflow::Expand),
        };
        Ok(Box::new(RingBuffer::new(limit, overflow)?))
    }
}
