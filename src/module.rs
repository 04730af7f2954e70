//! Module manager: canonical↔alias module name map and export resolution.
//!
//! Aliases are a pointer-equality relation on handles, not a copy:
//! `alias_module` never clones a module's export table, it only adds a
//! second name that resolves to the same [`ModuleHandle`].

use alloc::{
    rc::Rc,
    string::String,
    vec::Vec,
};
use core::cell::RefCell;

use hashbrown::HashMap;

use crate::{
    compiler::ModuleExport,
    error::{
        simple_err,
        ErrorKind,
        SimpleResult,
    },
    intern::StringInterner,
};

/// A loaded module's export table, reference-counted so aliasing can be a
/// pointer-equality relation.
#[derive(Debug)]
pub struct ModuleData {
    pub name: String,
    exports: RefCell<Vec<ModuleExport>>,
}

pub type ModuleHandle = Rc<ModuleData>;

/// Stores canonical module names → handles and alias → canonical names.
#[derive(Debug, Default)]
pub struct ModuleManager {
    canonical: HashMap<String, ModuleHandle>,
    aliases: HashMap<String, String>,
}

impl ModuleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new canonical module. Re-loading an already-canonical
    /// name replaces its handle (a fresh compile of the same source),
    /// treating a repeated insert as an update rather than an error.
    pub fn load_module(&mut self, name: &str) -> ModuleHandle {
        let handle = Rc::new(ModuleData {
            name: String::from(name),
            exports: RefCell::new(Vec::new()),
        });
        self.canonical.insert(String::from(name), handle.clone());
        handle
    }

    /// Appends `export` to `canonical`'s table. Fails if `canonical` has
    /// not been loaded.
    pub fn declare_export(&mut self, canonical: &str, export: ModuleExport) -> SimpleResult<()> {
        let Some(handle) = self.canonical.get(canonical) else {
            return simple_err(
                ErrorKind::Name,
                alloc::format!("cannot declare export on unloaded module: {canonical}"),
            );
        };
        handle.exports.borrow_mut().push(export);
        Ok(())
    }

    /// Registers `alias` as another name for `canonical`. Fails if
    /// `canonical` does not exist, or if `alias` is already registered as
    /// either a canonical module or an existing alias.
    pub fn alias_module(&mut self, canonical: &str, alias: &str) -> SimpleResult<()> {
        if !self.canonical.contains_key(canonical) {
            return simple_err(
                ErrorKind::Name,
                alloc::format!("no such canonical module: {canonical}"),
            );
        }
        if self.canonical.contains_key(alias) || self.aliases.contains_key(alias) {
            return simple_err(
                ErrorKind::Name,
                alloc::format!("alias already registered: {alias}"),
            );
        }
        self.aliases.insert(String::from(alias), String::from(canonical));
        Ok(())
    }

    /// Follows `name` through the alias map (if it is one) to the
    /// canonical module's handle. `find_module(alias)` and
    /// `find_module(canonical)` return the same handle by `Rc::ptr_eq`.
    pub fn find_module(&self, name: &str) -> Option<&ModuleHandle> {
        if let Some(handle) = self.canonical.get(name) {
            return Some(handle);
        }
        let canonical_name = self.aliases.get(name)?;
        self.canonical.get(canonical_name)
    }

    /// Resolves `symbol` within the module named `name` (itself possibly an
    /// alias), returning its export entry (`{ kind, register_id, type }`
    /// live on [`ModuleExport`]).
    pub fn resolve_export<'a>(
        &'a self,
        interner: &StringInterner,
        name: &str,
        symbol: &str,
    ) -> Option<core::cell::Ref<'a, ModuleExport>> {
        let handle = self.find_module(name)?;
        let exports = handle.exports.borrow();
        let index = exports
            .iter()
            .position(|export| interner.resolve(export.name) == symbol)?;
        Some(core::cell::Ref::map(exports, |exports| &exports[index]))
    }
}
