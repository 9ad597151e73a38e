//! # Interned ephemeris and frame identifiers
//!
//! [`EphemerisId`] and [`FrameId`] are opaque handles naming a body (or spacecraft)
//! and a reference frame. They are cheap to clone (an `Arc<str>` under the hood) and
//! compare by name.
//!
//! Handles are handed out by an [`IdRegistry`], which interns them so that every
//! request for the same name returns the same allocation. A registry is **owned** by
//! the builder that created it: every new
//! [`SpicePointingProviderBuilder`](crate::pointing::builder::SpicePointingProviderBuilder)
//! starts from an empty registry, so identifiers from a previous session never alias
//! into a freshly built provider. There is no process-wide table.
//!
//! ## Example
//!
//! ```rust
//! use spice_pointing::ids::IdRegistry;
//!
//! let mut ids = IdRegistry::new();
//! let a = ids.ephemeris_id("DIDYMOS");
//! let b = ids.ephemeris_id("DIDYMOS");
//! assert_eq!(a, b);
//! assert!(a.same_handle(&b));
//! ```

use std::{collections::HashMap, fmt, sync::Arc};

/// Handle naming a body, barycenter or spacecraft.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EphemerisId(Arc<str>);

/// Handle naming a reference frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(Arc<str>);

impl EphemerisId {
    fn new(name: &str) -> Self {
        EphemerisId(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// `true` if both handles point to the same interned allocation.
    pub fn same_handle(&self, other: &EphemerisId) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl FrameId {
    fn new(name: &str) -> Self {
        FrameId(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// `true` if both handles point to the same interned allocation.
    pub fn same_handle(&self, other: &FrameId) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for EphemerisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name → handle interning tables for one builder session.
#[derive(Debug, Clone, Default)]
pub struct IdRegistry {
    ephemeris_ids: HashMap<String, EphemerisId>,
    frame_ids: HashMap<String, FrameId>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the interned [`EphemerisId`] for `name`, creating it on first request.
    pub fn ephemeris_id(&mut self, name: &str) -> EphemerisId {
        self.ephemeris_ids
            .entry(name.to_string())
            .or_insert_with(|| EphemerisId::new(name))
            .clone()
    }

    /// Return the interned [`FrameId`] for `name`, creating it on first request.
    pub fn frame_id(&mut self, name: &str) -> FrameId {
        self.frame_ids
            .entry(name.to_string())
            .or_insert_with(|| FrameId::new(name))
            .clone()
    }

    pub fn get_ephemeris_id(&self, name: &str) -> Option<&EphemerisId> {
        self.ephemeris_ids.get(name)
    }

    pub fn get_frame_id(&self, name: &str) -> Option<&FrameId> {
        self.frame_ids.get(name)
    }

    /// Drop every interned handle.
    pub fn clear(&mut self) {
        self.ephemeris_ids.clear();
        self.frame_ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ephemeris_ids.len() + self.frame_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ephemeris_ids.is_empty() && self.frame_ids.is_empty()
    }
}
