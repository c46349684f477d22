use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::builtins::BuiltinFunction;
use crate::token::Span;

use super::StaticType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Variable,
    Function,
    Parameter,
}

/// A declaration recorded during analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolEntry {
    pub name: String,
    pub kind: SymbolKind,
    pub scope: usize,
    pub span: Span,
    pub ty: StaticType,
    pub fixed: bool,
    /// Parameter count for functions.
    pub arity: usize,
}

impl SymbolEntry {
    pub fn variable(name: &str, span: Span, ty: StaticType) -> Self {
        Self {
            name: name.to_string(),
            kind: SymbolKind::Variable,
            scope: 0,
            span,
            ty,
            fixed: false,
            arity: 0,
        }
    }

    pub fn function(name: &str, span: Span, arity: usize) -> Self {
        Self {
            kind: SymbolKind::Function,
            arity,
            ..Self::variable(name, span, StaticType::Unknown)
        }
    }

    pub fn parameter(name: &str, span: Span) -> Self {
        Self {
            kind: SymbolKind::Parameter,
            ..Self::variable(name, span, StaticType::Unknown)
        }
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }
}

/// Symbol as listed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub scope: String,
    pub line: usize,
    pub column: usize,
    pub is_parameter: bool,
}

impl Symbol {
    pub fn builtin(function: BuiltinFunction) -> Self {
        Self {
            name: function.name().to_string(),
            kind: SymbolKind::Function,
            scope: "builtin".to_string(),
            line: 0,
            column: 0,
            is_parameter: false,
        }
    }
}

impl From<&SymbolEntry> for Symbol {
    fn from(entry: &SymbolEntry) -> Self {
        let scope = if entry.scope == 0 {
            "global".to_string()
        } else {
            format!("local:{}", entry.scope)
        };
        Self {
            name: entry.name.clone(),
            kind: entry.kind,
            scope,
            line: entry.span.line,
            column: entry.span.column,
            is_parameter: entry.kind == SymbolKind::Parameter,
        }
    }
}

struct Scope {
    id: usize,
    names: FxHashMap<String, usize>,
}

/// Nested scopes over a flat, declaration-ordered list of every symbol seen.
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
    scopes: Vec<Scope>,
    next_scope: usize,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// A table with the global scope (id 0) open.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            scopes: vec![Scope {
                id: 0,
                names: FxHashMap::default(),
            }],
            next_scope: 1,
        }
    }

    pub fn enter_scope(&mut self) -> usize {
        let id = self.next_scope;
        self.next_scope += 1;
        self.scopes.push(Scope {
            id,
            names: FxHashMap::default(),
        });
        id
    }

    pub fn leave_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn current_scope(&self) -> usize {
        self.scopes.last().map_or(0, |scope| scope.id)
    }

    pub fn is_global(&self) -> bool {
        self.scopes.len() == 1
    }

    /// Adds `entry` to the innermost scope. Returns the existing entry on a clash.
    pub fn declare(&mut self, mut entry: SymbolEntry) -> Result<(), &SymbolEntry> {
        let index = self.entries.len();
        let Some(scope) = self.scopes.last_mut() else {
            return Ok(());
        };
        if let Some(&existing) = scope.names.get(&entry.name) {
            return Err(&self.entries[existing]);
        }
        entry.scope = scope.id;
        scope.names.insert(entry.name.clone(), index);
        self.entries.push(entry);
        Ok(())
    }

    /// Declares in the global scope regardless of the current nesting.
    pub fn declare_global(&mut self, mut entry: SymbolEntry) -> Result<(), &SymbolEntry> {
        let index = self.entries.len();
        let global = &mut self.scopes[0];
        if let Some(&existing) = global.names.get(&entry.name) {
            return Err(&self.entries[existing]);
        }
        entry.scope = 0;
        global.names.insert(entry.name.clone(), index);
        self.entries.push(entry);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&SymbolEntry> {
        self.resolve(name).map(|index| &self.entries[index])
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut SymbolEntry> {
        self.resolve(name).map(|index| &mut self.entries[index])
    }

    /// Entry declared under `name` in the innermost scope only.
    pub fn lookup_local(&self, name: &str) -> Option<&SymbolEntry> {
        let scope = self.scopes.last()?;
        scope.names.get(name).map(|&index| &self.entries[index])
    }

    fn resolve(&self, name: &str) -> Option<usize> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.names.get(name).copied())
    }

    pub fn entries(&self) -> &[SymbolEntry] {
        &self.entries
    }

    /// Every user symbol, in declaration order.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.entries.iter().map(Symbol::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_declarations_shadow_and_disappear_with_their_scope() {
        let mut table = SymbolTable::new();
        let span = Span::default();
        table
            .declare(SymbolEntry::variable("x", span, StaticType::Integer))
            .unwrap();
        let inner = table.enter_scope();
        table
            .declare(SymbolEntry::variable("x", span, StaticType::Text))
            .unwrap();
        assert_eq!(table.lookup("x").map(|entry| entry.scope), Some(inner));
        assert!(table
            .declare(SymbolEntry::variable("x", span, StaticType::Text))
            .is_err());
        table.leave_scope();
        assert_eq!(table.lookup("x").map(|entry| entry.ty), Some(StaticType::Integer));

        let scopes = table
            .symbols()
            .into_iter()
            .map(|symbol| symbol.scope)
            .collect::<Vec<_>>();
        assert_eq!(scopes, vec!["global", "local:1"]);
    }
}
