//! String intern table.
//!
//! Type and variant names, module names, and export symbols are interned
//! once per VM lifetime, using `hashbrown` for the backing map.

use alloc::{
    sync::Arc,
    vec::Vec,
};
use hashbrown::HashMap;

/// A handle to an interned string. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternedStr(u32);

impl InternedStr {
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Reconstructs a handle from a raw index previously obtained from
    /// [`InternedStr::index`], to decode a symbol id a compiled chunk stored
    /// as a bytecode operand back into a handle against the same interner
    /// that produced it.
    pub(crate) const fn from_raw(index: u32) -> Self {
        Self(index)
    }
}

/// Interns strings for the lifetime of one VM instance.
#[derive(Debug, Default)]
pub struct StringInterner {
    strings: Vec<Arc<str>>,
    lookup: HashMap<Arc<str>, InternedStr>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `s`, returning the existing handle if already interned.
    pub fn intern(&mut self, s: &str) -> InternedStr {
        if let Some(existing) = self.lookup.get(s) {
            return *existing;
        }
        let arc: Arc<str> = Arc::from(s);
        let id = InternedStr(self.strings.len() as u32);
        self.strings.push(arc.clone());
        self.lookup.insert(arc, id);
        id
    }

    pub fn resolve(&self, handle: InternedStr) -> &str {
        &self.strings[handle.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}
