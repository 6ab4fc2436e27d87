use std::collections::HashMap;

/// Identifies a name by spelling. Two occurrences of the same
/// identifier text anywhere in a program share a `SharedSymbol`, which
/// is also the key the resolver binds directly into a `Scope` — this
/// language never needs the teacher's separate unique-per-binding-site
/// symbol, since names are resolved with a single top-down walk rather
/// than a forward-reference hoisting pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SharedSymbol(pub usize);

/// Interns identifier spellings into `SharedSymbol`s.
#[derive(Debug, Default)]
pub struct SymbolTable {
    names: Vec<String>,
    lookup: HashMap<String, SharedSymbol>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    pub fn intern(&mut self, name: &str) -> SharedSymbol {
        if let Some(symbol) = self.lookup.get(name) {
            return *symbol;
        }

        let symbol = SharedSymbol(self.names.len());
        self.names.push(name.to_string());
        self.lookup.insert(name.to_string(), symbol);
        symbol
    }

    pub fn name(&self, symbol: SharedSymbol) -> &str {
        &self.names[symbol.0]
    }

    /// Read-only lookup: `None` if `name` was never interned, unlike
    /// `intern` which would create it.
    pub fn get(&self, name: &str) -> Option<SharedSymbol> {
        self.lookup.get(name).copied()
    }
}
