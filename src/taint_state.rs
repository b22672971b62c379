//! Flow-sensitive per-symbol abstract taint state for the function under
//! analysis.

use crate::ast::SymbolId;
use crate::containers::unordered::{UnorderedMap, UnorderedSet};
use crate::containers::InsertionOrderedSet;
use crate::log::*;

/// One abstract-state tag. A symbol holds a *set* of these: states are
/// additive across merged control-flow paths (a symbol may simultaneously be
/// `Local` and `LocalFromHost`) and are never removed while the enclosing
/// function is being analyzed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum TaintTag {
    /// Declared within the function under analysis (locals and parameters).
    Local,
    /// A local that received a value directly from a host-input read.
    LocalFromHost,
    /// Holds a value derived from host input, by propagation or by a
    /// source-only macro capture.
    TaintedFromHost,
    /// A function definition observed at its entry.
    DefinedFunction,
}

/// Tracks the abstract state of every symbol seen while analyzing one
/// function. Reset between functions; the recorded function-entry lines feed
/// fingerprint line offsets.
#[derive(Default, Debug)]
pub struct TaintTracker {
    states: UnorderedMap<SymbolId, UnorderedSet<TaintTag>>,
    /// Function definitions observed, with their entry lines.
    function_entries: Vec<(String, u32)>,
    /// Symbols in first-registration order, so that dumps and the debug
    /// graph come out in a stable order even without the
    /// `deterministic_containers` feature.
    registration_order: InsertionOrderedSet<SymbolId>,
}

impl TaintTracker {
    pub fn new() -> Self {
        Default::default()
    }

    /// Drop all per-function state. Called when the traversal leaves a
    /// function.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn add_tag(&mut self, sym: SymbolId, tag: TaintTag) {
        self.registration_order.insert(sym);
        let added = self.states.entry(sym).or_default().insert(tag);
        if added {
            trace!("taint state extended"; "sym" => ?sym, "tag" => ?tag);
        }
    }

    /// Register a declaration: the symbol is in local scope.
    pub fn declare(&mut self, sym: SymbolId) {
        self.add_tag(sym, TaintTag::Local);
    }

    /// The symbol received a value directly from a host read.
    pub fn mark_from_host(&mut self, sym: SymbolId) {
        self.add_tag(sym, TaintTag::LocalFromHost);
    }

    /// The symbol holds a value derived from host input.
    pub fn mark_tainted(&mut self, sym: SymbolId) {
        self.add_tag(sym, TaintTag::TaintedFromHost);
    }

    /// Register the entry of a function definition and its start line.
    pub fn record_function_entry(
        &mut self,
        sym: Option<SymbolId>,
        name: impl Into<String>,
        line: u32,
    ) {
        if let Some(sym) = sym {
            self.add_tag(sym, TaintTag::DefinedFunction);
        }
        let name = name.into();
        debug!("function entry"; "name" => &name, "line" => line);
        self.function_entries.push((name, line));
    }

    /// Whether the symbol may carry host-derived data.
    pub fn is_tainted(&self, sym: SymbolId) -> bool {
        self.states.get(&sym).map_or(false, |tags| {
            tags.contains(&TaintTag::LocalFromHost) || tags.contains(&TaintTag::TaintedFromHost)
        })
    }

    /// Whether the symbol is known to live in the current function's local
    /// scope.
    pub fn is_local_scope(&self, sym: SymbolId) -> bool {
        self.states.get(&sym).map_or(false, |tags| {
            tags.contains(&TaintTag::Local) || tags.contains(&TaintTag::LocalFromHost)
        })
    }

    /// The recorded entry line of a function definition, by name.
    pub fn function_start_line(&self, name: &str) -> Option<u32> {
        self.function_entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, line)| line)
    }

    /// The tags currently attached to a symbol, if any.
    pub fn tags_of(&self, sym: SymbolId) -> Option<&UnorderedSet<TaintTag>> {
        self.states.get(&sym)
    }

    /// All currently tainted symbols, in first-registration order.
    pub fn tainted_symbols(&self) -> Vec<SymbolId> {
        self.registration_order
            .iter()
            .copied()
            .filter(|&s| self.is_tainted(s))
            .collect()
    }
}
