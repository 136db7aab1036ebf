use std::sync::Arc;

use crate::line_table::LineTable;
use crate::pool::Constant;

/// `swap_code` must be a single reference swap: code already running keeps
/// executing the buffer it started on.
pub trait CodeObject {
    fn name(&self) -> &str;

    fn code(&self) -> &[u8];

    fn swap_code(&mut self, code: Vec<u8>) -> Arc<[u8]>;

    fn constants(&self) -> &Arc<Vec<Constant>>;

    fn constants_mut(&mut self) -> &mut Arc<Vec<Constant>>;

    fn names(&self) -> &Arc<Vec<String>>;

    fn names_mut(&mut self) -> &mut Arc<Vec<String>>;

    fn line_table(&self) -> &LineTable;

    fn set_line_table(&mut self, table: LineTable);

    fn stack_depth(&self) -> u32;

    fn set_stack_depth(&mut self, depth: u32);
}

#[derive(Clone, Debug)]
pub struct Function {
    name: String,
    code: Arc<[u8]>,
    constants: Arc<Vec<Constant>>,
    names: Arc<Vec<String>>,
    line_table: LineTable,
    stack_depth: u32,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        code: Vec<u8>,
        constants: Vec<Constant>,
        names: Vec<String>,
        line_table: LineTable,
        stack_depth: u32,
    ) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            constants: Arc::new(constants),
            names: Arc::new(names),
            line_table,
            stack_depth,
        }
    }

    pub fn share_pools_with(&mut self, other: &Function) {
        self.constants = Arc::clone(&other.constants);
        self.names = Arc::clone(&other.names);
    }

    pub fn code_handle(&self) -> Arc<[u8]> {
        Arc::clone(&self.code)
    }
}

impl CodeObject for Function {
    fn name(&self) -> &str {
        &self.name
    }

    fn code(&self) -> &[u8] {
        &self.code
    }

    fn swap_code(&mut self, code: Vec<u8>) -> Arc<[u8]> {
        std::mem::replace(&mut self.code, code.into())
    }

    fn constants(&self) -> &Arc<Vec<Constant>> {
        &self.constants
    }

    fn constants_mut(&mut self) -> &mut Arc<Vec<Constant>> {
        &mut self.constants
    }

    fn names(&self) -> &Arc<Vec<String>> {
        &self.names
    }

    fn names_mut(&mut self) -> &mut Arc<Vec<String>> {
        &mut self.names
    }

    fn line_table(&self) -> &LineTable {
        &self.line_table
    }

    fn set_line_table(&mut self, table: LineTable) {
        self.line_table = table;
    }

    fn stack_depth(&self) -> u32 {
        self.stack_depth
    }

    fn set_stack_depth(&mut self, depth: u32) {
        self.stack_depth = depth;
    }
}
