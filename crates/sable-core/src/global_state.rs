//! The authoritative symbol table.
//!
//! A `GlobalState` owns interned names, symbols, and the file table for one
//! workspace. The main thread keeps one instance current with edits but never
//! typechecks against it; every slow path clones it with [`GlobalState::deep_copy`]
//! and hands the clone to the typechecker thread. The only thing a clone
//! shares with its original is the epoch word used for slow-path
//! cancellation.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::diagnostics::Diagnostic;
use crate::epochs::{Epoch, EpochState};
use crate::file::FileContent;
use crate::name::NameInterner;
use crate::symbols::{Symbol, SymbolKind, SymbolLoc, Visibility};
use crate::{FileId, NameId, SymbolId};

/// Properties of a method entered into the table.
#[derive(Debug, Clone)]
pub struct MethodProps {
    pub arity: u8,
    pub visibility: Visibility,
    pub is_self_method: bool,
    pub sig: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GlobalState {
    names: NameInterner,
    symbols: Vec<Symbol>,
    /// (owner, name, is-self-method) -> symbol. Classes are keyed with
    /// `is-self-method == false`.
    symbols_by_key: HashMap<(SymbolId, NameId, bool), SymbolId>,
    root: SymbolId,

    files: Vec<Arc<FileContent>>,
    files_by_path: HashMap<String, FileId>,
    file_table_frozen: bool,

    diagnostics: HashMap<FileId, Vec<Diagnostic>>,

    /// Epoch of the most recently committed edit.
    epoch: Epoch,
    epochs: Arc<EpochState>,
}

/// Workspace-level builtin classes seeded into every fresh state.
///
/// These are symbol-table entries, not process globals, so they travel with
/// `deep_copy` like everything else.
const BUILTIN_CLASSES: &[(&str, &[&str])] = &[
    ("BasicObject", &[]),
    ("Object", &["BasicObject"]),
    ("Kernel", &[]),
    ("StandardError", &["Object"]),
    ("Errno", &["Object"]),
    ("Process", &["Object"]),
];

impl GlobalState {
    pub fn new() -> Self {
        let mut names = NameInterner::new();
        let root_name = names.intern("<root>");
        let root = SymbolId::from_raw(0);
        let symbols = vec![Symbol {
            name: root_name,
            kind: SymbolKind::Class,
            owner: root,
            loc: None,
            visibility: Visibility::Public,
            is_self_method: false,
            arity: 0,
            sig: None,
            ancestors: Vec::new(),
        }];

        let mut gs = Self {
            names,
            symbols,
            symbols_by_key: HashMap::new(),
            root,
            files: Vec::new(),
            files_by_path: HashMap::new(),
            file_table_frozen: true,
            diagnostics: HashMap::new(),
            epoch: Epoch::default(),
            epochs: Arc::new(EpochState::new()),
        };
        for &(name, ancestors) in BUILTIN_CLASSES {
            let ancestors: Vec<String> = ancestors.iter().map(|s| (*s).to_owned()).collect();
            gs.enter_class(name, &ancestors, None);
        }
        gs
    }

    /// Yields an independent mutable clone. The epoch word stays shared so the
    /// clone observes cancellation triggered through the original.
    pub fn deep_copy(&self) -> GlobalState {
        self.clone()
    }

    // ------------------------------------------------------------------
    // Epochs
    // ------------------------------------------------------------------

    pub fn epochs(&self) -> &Arc<EpochState> {
        &self.epochs
    }

    pub fn start_commit_epoch(&self, epoch: Epoch) {
        self.epochs.start_commit(epoch);
    }

    pub fn running_slow_path(&self) -> Option<Epoch> {
        self.epochs.running_slow_path()
    }

    pub fn try_cancel_slow_path(&self) -> bool {
        self.epochs.try_cancel()
    }

    pub fn committed_epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn set_committed_epoch(&mut self, epoch: Epoch) {
        self.epoch = epoch;
    }

    // ------------------------------------------------------------------
    // File table
    // ------------------------------------------------------------------

    pub fn find_file_by_path(&self, path: &str) -> Option<FileId> {
        self.files_by_path.get(path).copied()
    }

    pub fn file(&self, id: FileId) -> &Arc<FileContent> {
        &self.files[id.index()]
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn files(&self) -> impl Iterator<Item = (FileId, &Arc<FileContent>)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, file)| (FileId::from_raw(i as u32), file))
    }

    /// Registers a new file, allocating the next dense id.
    ///
    /// The file table must be unfrozen (see [`UnfreezeFileTable`]); entering a
    /// file while it is frozen is an internal invariant violation and aborts.
    pub fn enter_file(&mut self, file: Arc<FileContent>) -> FileId {
        assert!(
            !self.file_table_frozen,
            "tried to enter {} into a frozen file table",
            file.path()
        );
        let id = FileId::from_raw(u32::try_from(self.files.len()).expect("file table overflow"));
        self.files_by_path.insert(file.path().to_owned(), id);
        self.files.push(file);
        id
    }

    /// Replaces the contents registered for an existing file.
    pub fn replace_file(&mut self, id: FileId, file: Arc<FileContent>) {
        assert!(
            !self.file_table_frozen,
            "tried to replace {} in a frozen file table",
            file.path()
        );
        debug_assert_eq!(self.files[id.index()].path(), file.path());
        self.files[id.index()] = file;
    }

    // ------------------------------------------------------------------
    // Symbols
    // ------------------------------------------------------------------

    pub fn root(&self) -> SymbolId {
        self.root
    }

    pub fn intern_name(&mut self, text: &str) -> NameId {
        self.names.intern(text)
    }

    pub fn name_str(&self, id: NameId) -> &str {
        self.names.resolve(id)
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, sym)| (SymbolId::from_raw(i as u32), sym))
    }

    /// Enters (or refreshes) a top-level class.
    pub fn enter_class(
        &mut self,
        name: &str,
        ancestors: &[String],
        loc: Option<SymbolLoc>,
    ) -> SymbolId {
        let name = self.names.intern(name);
        let ancestors: Vec<NameId> = ancestors.iter().map(|a| self.names.intern(a)).collect();
        let key = (self.root, name, false);
        if let Some(&id) = self.symbols_by_key.get(&key) {
            let sym = &mut self.symbols[id.index()];
            sym.ancestors = ancestors;
            sym.loc = loc;
            return id;
        }
        let id = self.push_symbol(Symbol {
            name,
            kind: SymbolKind::Class,
            owner: self.root,
            loc,
            visibility: Visibility::Public,
            is_self_method: false,
            arity: 0,
            sig: None,
            ancestors,
        });
        self.symbols_by_key.insert(key, id);
        id
    }

    /// Enters (or refreshes) a method under `owner`.
    pub fn enter_method(
        &mut self,
        owner: SymbolId,
        name: &str,
        props: MethodProps,
        loc: Option<SymbolLoc>,
    ) -> SymbolId {
        let name = self.names.intern(name);
        let key = (owner, name, props.is_self_method);
        if let Some(&id) = self.symbols_by_key.get(&key) {
            let sym = &mut self.symbols[id.index()];
            sym.arity = props.arity;
            sym.visibility = props.visibility;
            sym.sig = props.sig;
            sym.loc = loc;
            return id;
        }
        let id = self.push_symbol(Symbol {
            name,
            kind: SymbolKind::Method,
            owner,
            loc,
            visibility: props.visibility,
            is_self_method: props.is_self_method,
            arity: props.arity,
            sig: props.sig,
            ancestors: Vec::new(),
        });
        self.symbols_by_key.insert(key, id);
        id
    }

    pub fn find_class(&self, name: &str) -> Option<SymbolId> {
        let name = self.names.lookup(name)?;
        self.symbols_by_key.get(&(self.root, name, false)).copied()
    }

    pub fn find_method(&self, owner: SymbolId, name: &str, is_self: bool) -> Option<SymbolId> {
        let name = self.names.lookup(name)?;
        self.symbols_by_key.get(&(owner, name, is_self)).copied()
    }

    fn push_symbol(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId::from_raw(u32::try_from(self.symbols.len()).expect("symbol overflow"));
        self.symbols.push(symbol);
        id
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub fn set_diagnostics(&mut self, file: FileId, diagnostics: Vec<Diagnostic>) {
        self.diagnostics.insert(file, diagnostics);
    }

    pub fn diagnostics(&self, file: FileId) -> &[Diagnostic] {
        self.diagnostics.get(&file).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Default for GlobalState {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped write access to the file table.
///
/// The table stays frozen except while one of these guards is alive on the
/// main thread; no other thread may touch it during that window.
pub struct UnfreezeFileTable<'gs> {
    gs: &'gs mut GlobalState,
}

impl<'gs> UnfreezeFileTable<'gs> {
    pub fn new(gs: &'gs mut GlobalState) -> Self {
        gs.file_table_frozen = false;
        Self { gs }
    }
}

impl Deref for UnfreezeFileTable<'_> {
    type Target = GlobalState;

    fn deref(&self) -> &GlobalState {
        self.gs
    }
}

impl DerefMut for UnfreezeFileTable<'_> {
    fn deref_mut(&mut self) -> &mut GlobalState {
        self.gs
    }
}

impl Drop for UnfreezeFileTable<'_> {
    fn drop(&mut self) {
        self.gs.file_table_frozen = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StrictLevel;
    use pretty_assertions::assert_eq;

    fn file(path: &str, text: &str) -> Arc<FileContent> {
        Arc::new(FileContent::new(path, text, StrictLevel::True))
    }

    #[test]
    fn file_ids_are_dense_and_stable() {
        let mut gs = GlobalState::new();
        let (a, b) = {
            let mut table = UnfreezeFileTable::new(&mut gs);
            let a = table.enter_file(file("a.rb", "class A; end"));
            let b = table.enter_file(file("b.rb", "class B; end"));
            (a, b)
        };

        assert_eq!(a.to_raw(), 0);
        assert_eq!(b.to_raw(), 1);
        assert_eq!(gs.find_file_by_path("a.rb"), Some(a));

        {
            let mut table = UnfreezeFileTable::new(&mut gs);
            table.replace_file(a, file("a.rb", "class A; def f; end; end"));
        }
        assert_eq!(gs.find_file_by_path("a.rb"), Some(a));
        assert_eq!(gs.file(a).source(), "class A; def f; end; end");
    }

    #[test]
    #[should_panic(expected = "frozen file table")]
    fn entering_a_file_while_frozen_aborts() {
        let mut gs = GlobalState::new();
        gs.enter_file(file("a.rb", ""));
    }

    #[test]
    fn deep_copy_is_independent_but_shares_the_epoch_word() {
        let mut gs = GlobalState::new();
        {
            let mut table = UnfreezeFileTable::new(&mut gs);
            table.enter_file(file("a.rb", "class A; end"));
        }

        let mut copy = gs.deep_copy();
        {
            let mut table = UnfreezeFileTable::new(&mut copy);
            table.enter_file(file("b.rb", "class B; end"));
        }

        assert_eq!(gs.file_count(), 1);
        assert_eq!(copy.file_count(), 2);

        // Cancellation flows from the original to the clone.
        gs.start_commit_epoch(Epoch::new(9));
        assert_eq!(copy.running_slow_path(), Some(Epoch::new(9)));
    }

    #[test]
    fn builtins_are_seeded_and_cloned() {
        let gs = GlobalState::new();
        for name in ["Object", "Kernel", "Errno", "Process"] {
            assert!(gs.find_class(name).is_some(), "missing builtin {name}");
        }
        let copy = gs.deep_copy();
        assert!(copy.find_class("Errno").is_some());
    }

    #[test]
    fn methods_are_keyed_by_owner_name_and_staticness() {
        let mut gs = GlobalState::new();
        let class = gs.enter_class("A", &[], None);
        let props = MethodProps {
            arity: 0,
            visibility: Visibility::Public,
            is_self_method: false,
            sig: None,
        };
        let instance = gs.enter_method(class, "f", props.clone(), None);
        let class_method = gs.enter_method(
            class,
            "f",
            MethodProps {
                is_self_method: true,
                ..props.clone()
            },
            None,
        );
        assert_ne!(instance, class_method);

        // Re-entering refreshes in place instead of allocating.
        let again = gs.enter_method(
            class,
            "f",
            MethodProps {
                arity: 2,
                ..props
            },
            None,
        );
        assert_eq!(again, instance);
        assert_eq!(gs.symbol(instance).arity, 2);
    }
}
