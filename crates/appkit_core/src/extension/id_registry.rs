//! Per-application registry minting readable, collision-free ids.
//!
//! # Invariants
//! - An object keeps the id it was first given for the registry's lifetime.
//! - No two objects ever receive the same id.
//! - The registry is never cleared.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

static TYPE_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(extension|ext)$").expect("valid type suffix regex"));

/// Suffix numbering starts here for the second object of a base name.
const FIRST_COLLISION_SUFFIX: u32 = 2;

/// Anything the id registry can name: a stable identity plus a type name.
pub trait Identified {
    fn identity(&self) -> Uuid;
    fn type_name(&self) -> &str;
}

#[derive(Debug, Default)]
pub struct IdRegistry {
    state: RefCell<IdRegistryState>,
}

#[derive(Debug, Default)]
struct IdRegistryState {
    /// Base name -> next suffix to try.
    seen: HashMap<String, u32>,
    assigned: HashSet<String>,
    id_of: HashMap<Uuid, String>,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `object`, minting one from its type name on first use.
    pub fn id(&self, object: &dyn Identified) -> String {
        self.id_for(object.identity(), object.type_name())
    }

    /// Same as [`IdRegistry::id`] for callers holding the parts separately.
    pub fn id_for(&self, identity: Uuid, type_name: &str) -> String {
        let mut state = self.state.borrow_mut();
        if let Some(id) = state.id_of.get(&identity) {
            return id.clone();
        }

        let base = derive_base_name(type_name);
        let id = if !state.seen.contains_key(&base) && !state.assigned.contains(&base) {
            state.seen.insert(base.clone(), FIRST_COLLISION_SUFFIX);
            base
        } else {
            let mut suffix = state
                .seen
                .get(&base)
                .copied()
                .unwrap_or(FIRST_COLLISION_SUFFIX);
            loop {
                let candidate = format!("{base}{suffix}");
                suffix += 1;
                if !state.assigned.contains(&candidate) {
                    state.seen.insert(base.clone(), suffix);
                    break candidate;
                }
            }
        };

        debug!("event=id_minted module=id_registry status=ok type={type_name} id={id}");
        state.assigned.insert(id.clone());
        state.id_of.insert(identity, id.clone());
        id
    }

    /// Returns an already minted id without minting a new one.
    pub fn lookup(&self, identity: Uuid) -> Option<String> {
        self.state.borrow().id_of.get(&identity).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().id_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Derives the base id for a type name.
///
/// Module paths and generic arguments are dropped, a trailing
/// `Extension`/`Ext` (any case) is stripped, and the rest is lowercased.
/// A name that is nothing but the suffix keeps its full lowercased form.
pub fn derive_base_name(type_name: &str) -> String {
    let short = short_type_name(type_name);
    let stripped = TYPE_SUFFIX_RE.replace(short, "");
    if stripped.is_empty() {
        short.to_lowercase()
    } else {
        stripped.to_lowercase()
    }
}

/// `my_crate::nav::NavExtension<T>` -> `NavExtension`.
pub fn short_type_name(type_name: &str) -> &str {
    let without_generics = type_name.split('<').next().unwrap_or(type_name);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::{derive_base_name, short_type_name, IdRegistry};
    use uuid::Uuid;

    #[test]
    fn strips_suffix_case_insensitively() {
        assert_eq!(derive_base_name("PageExtension"), "page");
        assert_eq!(derive_base_name("PageExt"), "page");
        assert_eq!(derive_base_name("PAGEEXT"), "page");
        assert_eq!(derive_base_name("Router"), "router");
    }

    #[test]
    fn keeps_bare_suffix_names() {
        assert_eq!(derive_base_name("Extension"), "extension");
        assert_eq!(derive_base_name("Ext"), "ext");
    }

    #[test]
    fn short_type_name_drops_path_and_generics() {
        assert_eq!(
            short_type_name("appkit::nav::NavExtension<alloc::string::String>"),
            "NavExtension"
        );
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[test]
    fn numbers_collisions_from_two() {
        let registry = IdRegistry::new();
        let ids = (0..3)
            .map(|_| registry.id_for(Uuid::new_v4(), "PageExtension"))
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["page", "page2", "page3"]);
    }

    #[test]
    fn repeat_lookup_is_idempotent() {
        let registry = IdRegistry::new();
        let identity = Uuid::new_v4();
        let first = registry.id_for(identity, "Page");
        let second = registry.id_for(identity, "Renamed");
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(identity).as_deref(), Some("page"));
    }

    #[test]
    fn never_reuses_an_id_across_base_names() {
        let registry = IdRegistry::new();
        assert_eq!(registry.id_for(Uuid::new_v4(), "Page2"), "page2");
        assert_eq!(registry.id_for(Uuid::new_v4(), "Page"), "page");
        assert_eq!(registry.id_for(Uuid::new_v4(), "Page"), "page3");
    }
}
