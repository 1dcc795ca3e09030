use std::collections::HashMap;

use thiserror::Error;

use crate::bytecode::program::cells_for;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Void,
    Char,
    Int,
}

impl Type {
    pub fn name(self) -> &'static str {
        match self {
            Type::Void => "void",
            Type::Char => "char",
            Type::Int => "int",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    Single,
    Array(u32),
}

impl Extent {
    pub fn cells(self) -> i32 {
        match self {
            Extent::Single => 1,
            Extent::Array(n) => n as i32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Local,
    Param,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarId {
    Global(u32),
    Local(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunId(pub u32);

// =============================================================================
// Pending writes
// =============================================================================

/// Instructions that may have last written a local, per nesting depth.
#[derive(Debug, Clone, Default)]
pub struct PendingWrites {
    lists: Vec<Vec<usize>>,
    written: Vec<bool>,
}

impl PendingWrites {
    /// Starts with empty frames for depths `0..=depth`.
    pub fn new(depth: usize) -> Self {
        Self {
            lists: vec![Vec::new(); depth + 1],
            written: vec![false; depth + 1],
        }
    }

    pub fn push_frame(&mut self) {
        self.lists.push(Vec::new());
        self.written.push(false);
    }

    /// Merges the innermost frame into its parent. The parent's flag stays.
    pub fn pop_frame(&mut self) {
        if self.lists.len() < 2 {
            return;
        }
        let inner = self.lists.pop().unwrap_or_default();
        self.written.pop();
        if let Some(parent) = self.lists.last_mut() {
            for index in inner {
                if !parent.contains(&index) {
                    parent.push(index);
                }
            }
        }
    }

    /// A whole-variable write replaces everything seen at this depth.
    pub fn write_scalar(&mut self, index: usize) {
        if let (Some(list), Some(flag)) = (self.lists.last_mut(), self.written.last_mut()) {
            list.clear();
            list.push(index);
            *flag = true;
        }
    }

    /// An element write adds to the candidates.
    pub fn write_element(&mut self, index: usize) {
        if let Some(list) = self.lists.last_mut() {
            list.push(index);
        }
    }

    /// Writes that may reach a read at the current depth.
    pub fn reaching(&self) -> Vec<usize> {
        let from = self.written.iter().rposition(|&w| w).unwrap_or(0);
        let mut out: Vec<usize> = self.lists[from..].iter().flatten().copied().collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

// =============================================================================
// Descriptors
// =============================================================================

#[derive(Debug, Clone)]
pub struct Var {
    pub name: String,
    pub ty: Type,
    pub scope: Scope,
    pub writable: bool,
    /// Constant value, global address, or parameter slot. Locals get their
    /// frame slot from the allocator.
    pub addr: i32,
    pub extent: Extent,
    pub writes: PendingWrites,
}

impl Var {
    pub fn constant(name: &str, ty: Type, value: i32) -> Self {
        Self {
            name: name.to_string(),
            ty,
            scope: Scope::Global,
            writable: false,
            addr: value,
            extent: Extent::Single,
            writes: PendingWrites::default(),
        }
    }

    pub fn variable(name: &str, ty: Type, extent: Extent) -> Self {
        Self {
            name: name.to_string(),
            ty,
            scope: Scope::Global,
            writable: true,
            addr: 0,
            extent,
            writes: PendingWrites::default(),
        }
    }

    pub fn is_const(&self) -> bool {
        !self.writable
    }

    pub fn is_array(&self) -> bool {
        matches!(self.extent, Extent::Array(_))
    }
}

#[derive(Debug, Clone)]
pub struct Fun {
    pub name: String,
    pub ret: Type,
    /// Index of the function's first instruction record.
    pub entry: usize,
    pub params: Vec<Type>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("'{0}' is already declared")]
    Duplicate(String),

    #[error("'{0}' is not declared")]
    Undeclared(String),
}

// =============================================================================
// String pool
// =============================================================================

/// Literal strings, deduplicated, with cell offsets into the pool.
#[derive(Debug, Default)]
pub struct StringTable {
    strings: Vec<String>,
    offsets: HashMap<String, i32>,
    size: i32,
}

impl StringTable {
    pub fn intern(&mut self, text: &str) -> i32 {
        if let Some(&offset) = self.offsets.get(text) {
            return offset;
        }
        let offset = self.size;
        self.size += cells_for(text) as i32;
        self.strings.push(text.to_string());
        self.offsets.insert(text.to_string(), offset);
        offset
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn into_strings(self) -> Vec<String> {
        self.strings
    }
}

// =============================================================================
// Tables
// =============================================================================

#[derive(Debug, Default)]
pub struct SymbolTables {
    globals: Vec<Var>,
    global_names: HashMap<String, u32>,
    locals: Vec<Var>,
    local_names: HashMap<String, u32>,
    funs: Vec<Fun>,
    fun_names: HashMap<String, u32>,
    pub strings: StringTable,
    global_size: i32,
}

impl SymbolTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a global constant or variable; variables get the next
    /// addresses of the global region.
    pub fn declare_global(&mut self, mut var: Var) -> Result<VarId, SymbolError> {
        if self.global_names.contains_key(&var.name) || self.fun_names.contains_key(&var.name) {
            return Err(SymbolError::Duplicate(var.name));
        }
        var.scope = Scope::Global;
        if var.writable {
            var.addr = self.global_size;
            self.global_size += var.extent.cells();
        }
        let id = self.globals.len() as u32;
        self.global_names.insert(var.name.clone(), id);
        self.globals.push(var);
        Ok(VarId::Global(id))
    }

    /// Declares a local at the given nesting depth. Parameters keep their
    /// declaration order in `addr` until [`Self::seal_params`].
    pub fn declare_local(
        &mut self,
        mut var: Var,
        scope: Scope,
        depth: usize,
    ) -> Result<VarId, SymbolError> {
        if self.local_names.contains_key(&var.name) {
            return Err(SymbolError::Duplicate(var.name));
        }
        var.scope = scope;
        if scope == Scope::Param {
            var.addr = self.locals.iter().filter(|v| v.scope == Scope::Param).count() as i32;
        }
        var.writes = PendingWrites::new(depth);
        let id = self.locals.len() as u32;
        self.local_names.insert(var.name.clone(), id);
        self.locals.push(var);
        Ok(VarId::Local(id))
    }

    /// Moves parameters to their frame slots: of `n`, the `i`th is at `i - n`.
    pub fn seal_params(&mut self) {
        let n = self.param_count() as i32;
        for var in self.locals.iter_mut().filter(|v| v.scope == Scope::Param) {
            var.addr -= n;
        }
    }

    pub fn param_count(&self) -> usize {
        self.locals.iter().filter(|v| v.scope == Scope::Param).count()
    }

    pub fn declare_fun(&mut self, fun: Fun) -> Result<FunId, SymbolError> {
        if self.fun_names.contains_key(&fun.name) || self.global_names.contains_key(&fun.name) {
            return Err(SymbolError::Duplicate(fun.name));
        }
        let id = self.funs.len() as u32;
        self.fun_names.insert(fun.name.clone(), id);
        self.funs.push(fun);
        Ok(FunId(id))
    }

    /// Locals shadow globals.
    pub fn lookup(&self, name: &str) -> Result<VarId, SymbolError> {
        if let Some(&id) = self.local_names.get(name) {
            return Ok(VarId::Local(id));
        }
        self.global_names
            .get(name)
            .map(|&id| VarId::Global(id))
            .ok_or_else(|| SymbolError::Undeclared(name.to_string()))
    }

    pub fn lookup_fun(&self, name: &str) -> Result<FunId, SymbolError> {
        self.fun_names
            .get(name)
            .map(|&id| FunId(id))
            .ok_or_else(|| SymbolError::Undeclared(name.to_string()))
    }

    pub fn var(&self, id: VarId) -> &Var {
        match id {
            VarId::Global(i) => &self.globals[i as usize],
            VarId::Local(i) => &self.locals[i as usize],
        }
    }

    pub fn var_mut(&mut self, id: VarId) -> &mut Var {
        match id {
            VarId::Global(i) => &mut self.globals[i as usize],
            VarId::Local(i) => &mut self.locals[i as usize],
        }
    }

    pub fn fun(&self, id: FunId) -> &Fun {
        &self.funs[id.0 as usize]
    }

    pub fn fun_mut(&mut self, id: FunId) -> &mut Fun {
        &mut self.funs[id.0 as usize]
    }

    pub fn locals(&self) -> &[Var] {
        &self.locals
    }

    /// Clears the local scope for a new function body.
    pub fn begin_function(&mut self) {
        self.locals.clear();
        self.local_names.clear();
    }

    pub fn begin_loop(&mut self) {
        for var in &mut self.locals {
            var.writes.push_frame();
        }
    }

    pub fn end_loop(&mut self) {
        for var in &mut self.locals {
            var.writes.pop_frame();
        }
    }

    pub fn global_size(&self) -> i32 {
        self.global_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(name: &str) -> Var {
        Var::variable(name, Type::Int, Extent::Single)
    }

    fn fun(name: &str) -> Fun {
        Fun {
            name: name.to_string(),
            ret: Type::Void,
            entry: 0,
            params: vec![],
        }
    }

    #[test]
    fn test_global_addresses() {
        let mut symbols = SymbolTables::new();
        let a = symbols.declare_global(int("a")).unwrap();
        let c = symbols
            .declare_global(Var::constant("c", Type::Char, 'x' as i32))
            .unwrap();
        let arr = symbols
            .declare_global(Var::variable("arr", Type::Int, Extent::Array(4)))
            .unwrap();
        let b = symbols.declare_global(int("b")).unwrap();

        assert_eq!(symbols.var(a).addr, 0);
        assert_eq!(symbols.var(c).addr, 'x' as i32);
        assert_eq!(symbols.var(arr).addr, 1);
        assert_eq!(symbols.var(b).addr, 5);
        assert_eq!(symbols.global_size(), 6);
    }

    #[test]
    fn test_duplicates() {
        let mut symbols = SymbolTables::new();
        symbols.declare_global(int("x")).unwrap();
        assert_eq!(
            symbols.declare_global(int("x")),
            Err(SymbolError::Duplicate("x".to_string()))
        );
        assert!(symbols.declare_fun(fun("x")).is_err());
        symbols.declare_fun(fun("f")).unwrap();
        assert!(symbols.declare_fun(fun("f")).is_err());
        assert!(symbols.declare_global(int("f")).is_err());
    }

    #[test]
    fn test_locals_shadow_globals() {
        let mut symbols = SymbolTables::new();
        let global = symbols.declare_global(int("x")).unwrap();
        let local = symbols.declare_local(int("x"), Scope::Local, 0).unwrap();
        assert_eq!(symbols.lookup("x"), Ok(local));

        symbols.begin_function();
        assert_eq!(symbols.lookup("x"), Ok(global));
        assert_eq!(
            symbols.lookup("y"),
            Err(SymbolError::Undeclared("y".to_string()))
        );
    }

    #[test]
    fn test_param_slots() {
        let mut symbols = SymbolTables::new();
        let p0 = symbols.declare_local(int("p"), Scope::Param, 0).unwrap();
        let p1 = symbols.declare_local(int("q"), Scope::Param, 0).unwrap();
        let l = symbols.declare_local(int("l"), Scope::Local, 0).unwrap();
        let p2 = symbols.declare_local(int("r"), Scope::Param, 0).unwrap();
        symbols.seal_params();

        assert_eq!(symbols.var(p0).addr, -3);
        assert_eq!(symbols.var(p1).addr, -2);
        assert_eq!(symbols.var(p2).addr, -1);
        assert_eq!(symbols.var(l).scope, Scope::Local);
        assert_eq!(symbols.param_count(), 3);
    }

    #[test]
    fn test_string_table_dedups() {
        let mut strings = StringTable::default();
        assert_eq!(strings.intern("hello"), 0);
        assert_eq!(strings.intern("x"), 2);
        assert_eq!(strings.intern("hello"), 0);
        assert_eq!(strings.size(), 3);
        assert_eq!(strings.into_strings(), vec!["hello", "x"]);
    }

    #[test]
    fn test_pending_writes_scalar() {
        let mut writes = PendingWrites::new(0);
        writes.write_scalar(3);
        writes.push_frame();
        assert_eq!(writes.reaching(), vec![3]);

        writes.write_scalar(7);
        assert_eq!(writes.reaching(), vec![7]);

        writes.pop_frame();
        assert_eq!(writes.reaching(), vec![3, 7]);
    }

    #[test]
    fn test_pending_writes_elements() {
        let mut writes = PendingWrites::new(0);
        writes.write_element(1);
        writes.push_frame();
        writes.write_element(4);
        assert_eq!(writes.reaching(), vec![1, 4]);
        writes.pop_frame();
        writes.write_element(9);
        assert_eq!(writes.reaching(), vec![1, 4, 9]);
    }

    #[test]
    fn test_pending_writes_nearest_flag() {
        let mut writes = PendingWrites::new(0);
        writes.write_scalar(1);
        writes.push_frame();
        writes.write_scalar(2);
        writes.push_frame();
        writes.write_element(3);
        assert_eq!(writes.reaching(), vec![2, 3]);
    }
}
