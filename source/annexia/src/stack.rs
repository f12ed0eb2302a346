use alloc::vec::Vec;

/// A bounded LIFO. The top of the stack is the end of the slice.
pub struct Stack<T: Copy> {
    items: Vec<T>,
    capacity: usize,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StackError {
    StackEmpty,
    StackFull,
    OverwriteInvalid,
}

impl<T: Copy> Stack<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    #[inline]
    pub fn push(&mut self, item: T) -> Result<(), StackError> {
        if self.items.len() >= self.capacity {
            return Err(StackError::StackFull);
        }
        self.items.push(item);
        Ok(())
    }

    /// Pushes every item, bottom first, or none of them if they don't fit.
    pub fn push_all(&mut self, items: &[T]) -> Result<(), StackError> {
        if self.capacity - self.items.len() < items.len() {
            return Err(StackError::StackFull);
        }
        self.items.extend_from_slice(items);
        Ok(())
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn try_pop(&mut self) -> Result<T, StackError> {
        self.pop().ok_or(StackError::StackEmpty)
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    #[inline]
    pub fn try_peek(&self) -> Result<T, StackError> {
        self.peek().ok_or(StackError::StackEmpty)
    }

    #[inline]
    pub fn peek(&self) -> Option<T> {
        self.items.last().copied()
    }

    /// Peek `n` items below the top; `0` is the top itself.
    pub fn try_peek_back_n(&self, n: usize) -> Result<T, StackError> {
        let idx = self
            .items
            .len()
            .checked_sub(n + 1)
            .ok_or(StackError::StackEmpty)?;
        Ok(self.items[idx])
    }

    pub fn overwrite_back_n(&mut self, n: usize, item: T) -> Result<(), StackError> {
        let idx = self
            .items
            .len()
            .checked_sub(n + 1)
            .ok_or(StackError::OverwriteInvalid)?;
        self.items[idx] = item;
        Ok(())
    }

    /// Drops everything above `depth`.
    pub fn truncate(&mut self, depth: usize) {
        self.items.truncate(depth);
    }

    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Bottom to top.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}
