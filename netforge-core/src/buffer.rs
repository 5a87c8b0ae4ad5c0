use std::fmt;

use crate::error::NetForgeError;
use crate::types::NetNumeric;

/// Stable handle of a buffer inside a [`BufferArena`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Number of elements described by `shape`. A 0-dimensional shape is a scalar.
pub fn element_count(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Dual value/gradient container flowing between nodes.
///
/// Both arrays always hold at least `count()` elements once allocated and share
/// the logical shape. Storage capacity is sticky: shrinking the shape keeps the
/// allocation, growing it past the capacity reallocates (and zeroes) both arrays.
#[derive(Clone, PartialEq)]
pub struct Buffer<T> {
    shape: Vec<usize>,
    count: usize,
    capacity: usize,
    value: Vec<T>,
    grad: Vec<T>,
}

impl<T: NetNumeric> Buffer<T> {
    /// Creates an empty buffer (shape `[0]`, nothing allocated).
    pub fn empty() -> Self {
        Buffer {
            shape: vec![0],
            count: 0,
            capacity: 0,
            value: Vec::new(),
            grad: Vec::new(),
        }
    }

    /// Creates a zero-filled buffer with the given shape.
    pub fn new(shape: &[usize]) -> Self {
        let mut buffer = Self::empty();
        buffer.reshape(shape);
        buffer
    }

    /// Creates a buffer holding `data` as its value.
    ///
    /// # Errors
    /// Returns `NetForgeError::ShapeMismatch` if `data.len()` does not match the
    /// element count of `shape`.
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self, NetForgeError> {
        let count = element_count(shape);
        if data.len() != count {
            return Err(NetForgeError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![data.len()],
                operation: "Buffer::from_vec".to_string(),
            });
        }
        Ok(Buffer {
            shape: shape.to_vec(),
            count,
            capacity: count,
            value: data,
            grad: vec![T::zero(); count],
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Extent of `axis`, counted from the back when negative.
    pub fn dim(&self, axis: isize) -> Option<usize> {
        canonical_axis(axis, self.shape.len()).map(|a| self.shape[a])
    }

    /// Updates the logical shape, growing storage only when the new element
    /// count exceeds the current capacity.
    pub fn reshape(&mut self, shape: &[usize]) {
        self.shape = shape.to_vec();
        self.count = element_count(shape);
        if self.count > self.capacity {
            self.capacity = self.count;
            self.value = vec![T::zero(); self.capacity];
            self.grad = vec![T::zero(); self.capacity];
        }
    }

    pub fn value(&self) -> &[T] {
        &self.value[..self.count]
    }

    pub fn value_mut(&mut self) -> &mut [T] {
        &mut self.value[..self.count]
    }

    pub fn grad(&self) -> &[T] {
        &self.grad[..self.count]
    }

    pub fn grad_mut(&mut self) -> &mut [T] {
        &mut self.grad[..self.count]
    }

    /// Releases both arrays; used when the buffer starts forwarding to an owner.
    fn release_storage(&mut self, value: bool, grad: bool) {
        if value {
            self.value = Vec::new();
        }
        if grad {
            self.grad = Vec::new();
        }
    }
}

impl<T> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("shape", &self.shape)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Resolves a possibly negative axis against `num_axes`.
pub fn canonical_axis(axis: isize, num_axes: usize) -> Option<usize> {
    let n = num_axes as isize;
    let resolved = if axis < 0 { axis + n } else { axis };
    if resolved < 0 || resolved >= n {
        None
    } else {
        Some(resolved as usize)
    }
}

/// Flat table of every buffer a graph (or a node harness) works with.
///
/// Aliasing is a redirection: a buffer whose value (or gradient) is shared
/// forwards every read and write to its canonical owner and never allocates
/// that array itself. Value and gradient are redirected independently.
#[derive(Debug, Clone)]
pub struct BufferArena<T> {
    slots: Vec<Buffer<T>>,
    value_alias: Vec<Option<BufferId>>,
    grad_alias: Vec<Option<BufferId>>,
}

impl<T: NetNumeric> Default for BufferArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NetNumeric> BufferArena<T> {
    pub fn new() -> Self {
        BufferArena {
            slots: Vec::new(),
            value_alias: Vec::new(),
            grad_alias: Vec::new(),
        }
    }

    /// Moves `buffer` into the arena and returns its handle.
    pub fn push(&mut self, buffer: Buffer<T>) -> BufferId {
        let id = BufferId(self.slots.len());
        self.slots.push(buffer);
        self.value_alias.push(None);
        self.grad_alias.push(None);
        id
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: BufferId) -> bool {
        id.0 < self.slots.len()
    }

    pub fn shape(&self, id: BufferId) -> &[usize] {
        self.slots[id.0].shape()
    }

    pub fn count(&self, id: BufferId) -> usize {
        self.slots[id.0].count()
    }

    /// Canonical owner of the value storage of `id`.
    pub fn value_owner(&self, id: BufferId) -> BufferId {
        resolve(&self.value_alias, id)
    }

    /// Canonical owner of the gradient storage of `id`.
    pub fn grad_owner(&self, id: BufferId) -> BufferId {
        resolve(&self.grad_alias, id)
    }

    pub fn is_value_shared(&self, id: BufferId) -> bool {
        self.value_alias[id.0].is_some()
    }

    pub fn is_grad_shared(&self, id: BufferId) -> bool {
        self.grad_alias[id.0].is_some()
    }

    /// Reshapes `id`. Aliased arrays are not reallocated; their owner must
    /// already hold enough elements.
    ///
    /// # Errors
    /// Returns `NetForgeError::ShapeMismatch` when an aliased array's owner is
    /// smaller than the requested element count.
    pub fn reshape(&mut self, id: BufferId, shape: &[usize]) -> Result<(), NetForgeError> {
        let count = element_count(shape);
        for owner in [self.value_owner(id), self.grad_owner(id)] {
            if owner != id && self.slots[owner.0].count() < count {
                return Err(NetForgeError::ShapeMismatch {
                    expected: self.slots[owner.0].shape().to_vec(),
                    actual: shape.to_vec(),
                    operation: format!("reshape of aliased buffer {}", id),
                });
            }
        }
        let value_shared = self.is_value_shared(id);
        let grad_shared = self.is_grad_shared(id);
        let slot = &mut self.slots[id.0];
        slot.reshape(shape);
        slot.release_storage(value_shared, grad_shared);
        Ok(())
    }

    pub fn reshape_like(&mut self, id: BufferId, other: BufferId) -> Result<(), NetForgeError> {
        let shape = self.shape(other).to_vec();
        self.reshape(id, &shape)
    }

    /// Makes the value of `id` alias the value storage of `owner`.
    ///
    /// # Errors
    /// Returns `NetForgeError::ShapeMismatch` if the element counts differ.
    pub fn share_value(&mut self, id: BufferId, owner: BufferId) -> Result<(), NetForgeError> {
        self.check_share(id, owner, "share_value")?;
        let canonical = self.value_owner(owner);
        if canonical != id {
            self.value_alias[id.0] = Some(canonical);
            self.slots[id.0].release_storage(true, false);
        }
        Ok(())
    }

    /// Makes the gradient of `id` alias the gradient storage of `owner`.
    ///
    /// # Errors
    /// Returns `NetForgeError::ShapeMismatch` if the element counts differ.
    pub fn share_grad(&mut self, id: BufferId, owner: BufferId) -> Result<(), NetForgeError> {
        self.check_share(id, owner, "share_grad")?;
        let canonical = self.grad_owner(owner);
        if canonical != id {
            self.grad_alias[id.0] = Some(canonical);
            self.slots[id.0].release_storage(false, true);
        }
        Ok(())
    }

    fn check_share(&self, id: BufferId, owner: BufferId, operation: &str) -> Result<(), NetForgeError> {
        if self.count(id) != self.count(owner) {
            return Err(NetForgeError::ShapeMismatch {
                expected: self.shape(owner).to_vec(),
                actual: self.shape(id).to_vec(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    pub fn value(&self, id: BufferId) -> &[T] {
        let count = self.count(id);
        &self.slots[self.value_owner(id).0].value[..count]
    }

    pub fn value_mut(&mut self, id: BufferId) -> &mut [T] {
        let count = self.count(id);
        let owner = self.value_owner(id);
        &mut self.slots[owner.0].value[..count]
    }

    pub fn grad(&self, id: BufferId) -> &[T] {
        let count = self.count(id);
        &self.slots[self.grad_owner(id).0].grad[..count]
    }

    pub fn grad_mut(&mut self, id: BufferId) -> &mut [T] {
        let count = self.count(id);
        let owner = self.grad_owner(id);
        &mut self.slots[owner.0].grad[..count]
    }

    /// Mutable value and read-only gradient of `id` at the same time.
    pub fn value_mut_with_grad(&mut self, id: BufferId) -> (&mut [T], &[T]) {
        let count = self.count(id);
        let vo = self.value_owner(id).0;
        let go = self.grad_owner(id).0;
        if vo == go {
            let Buffer { value, grad, .. } = &mut self.slots[vo];
            (&mut value[..count], &grad[..count])
        } else if vo < go {
            let (head, tail) = self.slots.split_at_mut(go);
            (&mut head[vo].value[..count], &tail[0].grad[..count])
        } else {
            let (head, tail) = self.slots.split_at_mut(vo);
            (&mut tail[0].value[..count], &head[go].grad[..count])
        }
    }

    /// Copies `data` into the value of `id`.
    ///
    /// # Errors
    /// Returns `NetForgeError::ShapeMismatch` if the lengths differ.
    pub fn set_value(&mut self, id: BufferId, data: &[T]) -> Result<(), NetForgeError> {
        if data.len() != self.count(id) {
            return Err(NetForgeError::ShapeMismatch {
                expected: self.shape(id).to_vec(),
                actual: vec![data.len()],
                operation: "set_value".to_string(),
            });
        }
        self.value_mut(id).copy_from_slice(data);
        Ok(())
    }

    pub fn fill_grad(&mut self, id: BufferId, v: T) {
        self.grad_mut(id).iter_mut().for_each(|g| *g = v);
    }

    pub fn zero_grad(&mut self, id: BufferId) {
        self.fill_grad(id, T::zero());
    }

    /// Sum of absolute values of the value array.
    pub fn asum_value(&self, id: BufferId) -> T {
        self.value(id).iter().fold(T::zero(), |acc, v| acc + v.abs())
    }

    /// Sum of absolute values of the gradient array.
    pub fn asum_grad(&self, id: BufferId) -> T {
        self.grad(id).iter().fold(T::zero(), |acc, v| acc + v.abs())
    }

    pub fn sumsq_value(&self, id: BufferId) -> T {
        self.value(id).iter().fold(T::zero(), |acc, &v| acc + v * v)
    }

    pub fn sumsq_grad(&self, id: BufferId) -> T {
        self.grad(id).iter().fold(T::zero(), |acc, &v| acc + v * v)
    }

    /// Detached copy of `id` with its own storage (aliases resolved).
    pub fn snapshot(&self, id: BufferId) -> Buffer<T> {
        let shape = self.shape(id);
        let count = self.count(id);
        Buffer {
            shape: shape.to_vec(),
            count,
            capacity: count,
            value: self.value(id).to_vec(),
            grad: self.grad(id).to_vec(),
        }
    }
}

fn resolve(aliases: &[Option<BufferId>], id: BufferId) -> BufferId {
    let mut current = id;
    while let Some(next) = aliases[current.0] {
        current = next;
    }
    current
}
