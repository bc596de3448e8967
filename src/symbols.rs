use std::collections::HashMap;

use crate::config;
use crate::error::{CompileError, CompileErrorKind};
use crate::lexer::is_identifier;
use crate::parser::{Program, Scope};

/// Variable name -> frame-relative address, assigned from 1 in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableTable {
    addresses: HashMap<String, u32>,
    order: Vec<String>,
}

impl VariableTable {
    fn declare(&mut self, name: &str) -> Option<u32> {
        if self.addresses.contains_key(name) {
            return None;
        }
        let address = self.order.len() as u32 + 1;
        self.addresses.insert(name.to_string(), address);
        self.order.push(name.to_string());
        Some(address)
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.addresses.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Variables in declaration order with their addresses.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.order.iter().map(|name| (name.as_str(), self.addresses[name]))
    }
}

/// Base addresses of every scope plus per-scope variable tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    scope_bases: HashMap<String, u32>,
    layout: Vec<(String, u32, u32)>,
    variables: HashMap<String, VariableTable>,
    program_size: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&mut self, program: &Program) -> Result<(), CompileError> {
        let main = program.main();
        self.add_scope(main, 1);

        // main, then the halt separator, then each function back to back
        let mut address = main.size() + 2;
        for function in program.functions() {
            self.add_scope(function, address);
            address += function.size();
        }
        self.program_size = address - 1;

        for scope in &program.scopes {
            let table = allocate_variables(scope)?;
            self.variables.insert(scope.name.clone(), table);
        }

        tracing::debug!(words = self.program_size, scopes = program.scopes.len(), "allocated addresses");
        Ok(())
    }

    fn add_scope(&mut self, scope: &Scope, base: u32) {
        self.scope_bases.insert(scope.name.clone(), base);
        self.layout.push((scope.name.clone(), base, scope.size()));
    }

    pub fn scope_base(&self, scope: &str) -> Option<u32> {
        self.scope_bases.get(scope).copied()
    }

    /// Entry address of a user function; the main scope is not callable.
    pub fn function_address(&self, name: &str) -> Option<u32> {
        if name == config::MAIN_SCOPE {
            return None;
        }
        self.scope_base(name)
    }

    pub fn variables(&self, scope: &str) -> Option<&VariableTable> {
        self.variables.get(scope)
    }

    /// Scope that owns the word at `address`, if any.
    pub fn scope_at(&self, address: u32) -> Option<&str> {
        self.layout
            .iter()
            .find(|(_, base, size)| address >= *base && address < base + size)
            .map(|(name, _, _)| name.as_str())
    }

    /// Total number of words, halt separator included.
    pub fn program_size(&self) -> u32 {
        self.program_size
    }
}

fn allocate_variables(scope: &Scope) -> Result<VariableTable, CompileError> {
    let mut table = VariableTable::default();
    for token in scope.tokens.iter().filter(|t| t.mnemonic == "VAR") {
        let [name] = token.args.as_slice() else {
            return Err(token.error(CompileErrorKind::Syntax("VAR takes exactly one name".into())));
        };
        if !is_identifier(name) {
            return Err(token.error(CompileErrorKind::Syntax(format!("invalid variable name '{}'", name))));
        }
        if table.declare(name).is_none() {
            return Err(token.error(CompileErrorKind::DuplicateVariable(name.clone())));
        }
    }
    Ok(table)
}
