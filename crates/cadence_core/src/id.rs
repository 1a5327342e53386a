//! # Identifiers
//!
//! Three kinds of reference into the simulation:
//! - [`ObjectId`]: the public, persisted identity of an object
//! - [`ObjectHandle`]: an arena slot plus generation, private to the registry
//! - [`BehaviorRef`]: one update behavior of one object

use std::fmt;

/// Stable identity of a simulation object.
///
/// Drawn from a monotonic counter starting at 1 and never reused.
/// Zero is reserved as the invalid id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    /// The invalid id.
    pub const INVALID: Self = Self(0);

    /// The first id handed out.
    pub const FIRST: Self = Self(1);

    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns true unless this is [`ObjectId::INVALID`].
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Returns the id that follows this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arena address of a registered object.
///
/// - Lower 32 bits: slot index
/// - Upper 32 bits: generation of the slot when the handle was issued
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    /// Creates a handle from slot index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

/// One update behavior of one object: the object plus the behavior's
/// position in that object's behavior list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BehaviorRef {
    /// Owning object.
    pub object: ObjectId,
    /// Index into the object's behaviors.
    pub module: u16,
}

impl BehaviorRef {
    /// Creates a behavior reference.
    #[inline]
    #[must_use]
    pub const fn new(object: ObjectId, module: u16) -> Self {
        Self { object, module }
    }
}

impl fmt::Display for BehaviorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object, self.module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_roundtrip() {
        let handle = ObjectHandle::new(12345, 67890);
        assert_eq!(handle.index(), 12345);
        assert_eq!(handle.generation(), 67890);
    }

    #[test]
    fn test_object_id_ordering() {
        assert!(!ObjectId::INVALID.is_valid());
        assert!(ObjectId::FIRST.is_valid());
        assert!(ObjectId::FIRST < ObjectId::FIRST.next());
        assert_eq!(ObjectId::default(), ObjectId::INVALID);
    }

    #[test]
    fn test_behavior_ref_orders_by_object_then_module() {
        let a = BehaviorRef::new(ObjectId::new(1), 7);
        let b = BehaviorRef::new(ObjectId::new(2), 0);
        let c = BehaviorRef::new(ObjectId::new(2), 1);
        assert!(a < b && b < c);
        assert_eq!(c.to_string(), "#2/1");
    }
}
