//! # Module Factory
//!
//! Maps stable type tags to constructors. Loading reads a tag, builds a
//! default instance here, then lets the instance read its own state.

use std::collections::BTreeMap;

use cadence_core::{Capability, ModuleSource, UpdateBehavior};

use crate::subsystem::Subsystem;

/// Builds a default update behavior.
pub type BehaviorCtor = Box<dyn Fn() -> Box<dyn UpdateBehavior>>;
/// Builds a default capability.
pub type CapabilityCtor = Box<dyn Fn() -> Box<dyn Capability>>;
/// Builds a default subsystem.
pub type SubsystemCtor = Box<dyn Fn() -> Box<dyn Subsystem>>;

/// Tag to constructor tables for everything a save can contain.
#[derive(Default)]
pub struct ModuleFactory {
    behaviors: BTreeMap<&'static str, BehaviorCtor>,
    capabilities: BTreeMap<&'static str, CapabilityCtor>,
    subsystems: BTreeMap<&'static str, SubsystemCtor>,
}

impl ModuleFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an update behavior constructor under `tag`.
    ///
    /// A later registration for the same tag replaces the earlier one.
    #[must_use]
    pub fn with_behavior<F>(mut self, tag: &'static str, ctor: F) -> Self
    where
        F: Fn() -> Box<dyn UpdateBehavior> + 'static,
    {
        self.behaviors.insert(tag, Box::new(ctor));
        self
    }

    /// Registers a capability constructor under `tag`.
    #[must_use]
    pub fn with_capability<F>(mut self, tag: &'static str, ctor: F) -> Self
    where
        F: Fn() -> Box<dyn Capability> + 'static,
    {
        self.capabilities.insert(tag, Box::new(ctor));
        self
    }

    /// Registers a subsystem constructor under its name.
    #[must_use]
    pub fn with_subsystem<F>(mut self, name: &'static str, ctor: F) -> Self
    where
        F: Fn() -> Box<dyn Subsystem> + 'static,
    {
        self.subsystems.insert(name, Box::new(ctor));
        self
    }

    /// Builds a default subsystem by name.
    #[must_use]
    pub fn subsystem(&self, name: &str) -> Option<Box<dyn Subsystem>> {
        self.subsystems.get(name).map(|ctor| ctor())
    }

    /// Iterates every registered tag, behaviors then capabilities then
    /// subsystems, each group sorted.
    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.behaviors
            .keys()
            .chain(self.capabilities.keys())
            .chain(self.subsystems.keys())
            .copied()
    }
}

impl ModuleSource for ModuleFactory {
    fn behavior(&self, tag: &str) -> Option<Box<dyn UpdateBehavior>> {
        self.behaviors.get(tag).map(|ctor| ctor())
    }

    fn capability(&self, tag: &str) -> Option<Box<dyn Capability>> {
        self.capabilities.get(tag).map(|ctor| ctor())
    }
}

impl std::fmt::Debug for ModuleFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleFactory")
            .field("behaviors", &self.behaviors.keys().collect::<Vec<_>>())
            .field("capabilities", &self.capabilities.keys().collect::<Vec<_>>())
            .field("subsystems", &self.subsystems.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;

    #[test]
    fn test_builds_registered_tags_only() {
        let factory = demo::factory();
        assert_eq!(factory.behavior("Wanderer").map(|b| b.type_tag()), Some("Wanderer"));
        assert!(factory.behavior("Ghost").is_none());
        assert!(factory.capability("Ghost").is_none());
        assert_eq!(factory.subsystem("Census").map(|s| s.name()), Some("Census"));
    }

    #[test]
    fn test_tags_are_sorted_per_group() {
        let factory = ModuleFactory::new()
            .with_behavior("Zeta", || Box::new(demo::Beacon::default()))
            .with_behavior("Alpha", || Box::new(demo::Beacon::default()));
        assert_eq!(factory.tags().collect::<Vec<_>>(), vec!["Alpha", "Zeta"]);
    }
}
