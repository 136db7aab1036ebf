use tracing::debug;

use crate::codec::{Instruction, stream_len};
use crate::editor::{StreamEditor, apply_line_adjustments};
use crate::error::{PatchError, PatchResult};
use crate::host::CodeObject;
use crate::opcode::OpCode;
use crate::pool::{Constant, PoolEntry, constant_index, find_entry, plan_merge};
use crate::registry::{Breakpoint, BreakpointRegistry};

pub const CALL_SEQUENCE_LEN: usize = 5;

const DEFAULT_MODULE: &str = "linehook";
const DEFAULT_CALLBACK: &str = "breakpoint_callback";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InjectorConfig {
    pub module: String,
    pub callback: String,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            module: DEFAULT_MODULE.to_string(),
            callback: DEFAULT_CALLBACK.to_string(),
        }
    }
}

impl InjectorConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(module) = non_empty_env("LINEHOOK_MODULE") {
            config.module = module;
        }
        if let Some(callback) = non_empty_env("LINEHOOK_CALLBACK") {
            config.callback = callback;
        }
        config
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Default)]
pub struct Injector {
    config: InjectorConfig,
    registry: BreakpointRegistry,
}

impl Injector {
    pub fn new(config: InjectorConfig) -> Self {
        Self {
            config,
            registry: BreakpointRegistry::new(),
        }
    }

    pub fn config(&self) -> &InjectorConfig {
        &self.config
    }

    pub fn registry(&self) -> &BreakpointRegistry {
        &self.registry
    }

    pub fn insert_breakpoint<F>(&mut self, function: &mut F, line: u32, id: u32) -> PatchResult<()>
    where
        F: CodeObject + ?Sized,
    {
        self.registry.ensure_inactive(id)?;
        let offset = locate_line(function, line)?;
        let editor = StreamEditor::new(function.code())?;

        let names = plan_merge(
            function.names().as_slice(),
            &[self.config.module.clone(), self.config.callback.clone()],
        );
        let constants = plan_merge(
            function.constants().as_slice(),
            &[Constant::Int(i64::from(id))],
        );
        let block = call_sequence(names.indices()[0], names.indices()[1], constants.indices()[0]);
        let injected_size = stream_len(&block);
        let stack_growth = stack_growth(&block);

        let outcome = editor.insert(&block, offset)?;
        let mut table = function.line_table().try_clone()?;
        apply_line_adjustments(&mut table, &outcome.insertions)?;
        let depth = function
            .stack_depth()
            .checked_add(stack_growth)
            .ok_or_else(|| PatchError::consistency("stack depth budget overflows u32"))?;

        let names = names.stage(function.names_mut())?;
        let constants = constants.stage(function.constants_mut())?;
        self.registry.activate(Breakpoint {
            id,
            line,
            injected_size,
            stack_growth,
        })?;

        names.commit(function.names_mut());
        constants.commit(function.constants_mut());
        function.set_line_table(table);
        function.set_stack_depth(depth);
        function.swap_code(outcome.code);
        debug!(
            "inserted breakpoint {id} into {} at line {line} (offset {offset}, {injected_size} bytes, {} resizes)",
            function.name(),
            outcome.insertions.len() - 1
        );
        Ok(())
    }

    pub fn remove_breakpoint<F>(&mut self, function: &mut F, line: u32, id: u32) -> PatchResult<()>
    where
        F: CodeObject + ?Sized,
    {
        let breakpoint = self.registry.ensure_active(id)?.clone();
        let offset = locate_line(function, line)?;
        let editor = StreamEditor::new(function.code())?;
        let start = self.find_call_sequence(&editor, function, offset, line, id)?;

        let outcome = editor.remove(start, CALL_SEQUENCE_LEN)?;
        let removed_size = stream_len(&outcome.removed);
        if removed_size != breakpoint.injected_size {
            return Err(PatchError::consistency(format!(
                "breakpoint {id} injected {} bytes but {removed_size} were found",
                breakpoint.injected_size
            )));
        }
        let mut table = function.line_table().try_clone()?;
        apply_line_adjustments(&mut table, &outcome.insertions)?;
        let budget = function.stack_depth();
        let depth = budget
            .checked_sub(breakpoint.stack_growth)
            .ok_or_else(|| PatchError::Underrun {
                what: "stack depth budget",
                by: u64::from(breakpoint.stack_growth - budget),
            })?;

        self.registry.deactivate(id)?;
        function.set_line_table(table);
        function.set_stack_depth(depth);
        function.swap_code(outcome.code);
        debug!(
            "removed breakpoint {id} from {} at line {line} (offset {start}, {removed_size} bytes)",
            function.name()
        );
        Ok(())
    }

    // blocks for one line sit back to back at its first offset
    fn find_call_sequence<F>(
        &self,
        editor: &StreamEditor,
        function: &F,
        offset: u32,
        line: u32,
        id: u32,
    ) -> PatchResult<u32>
    where
        F: CodeObject + ?Sized,
    {
        let missing = || {
            PatchError::consistency(format!(
                "no call sequence for breakpoint {id} at line {line}"
            ))
        };
        let names = function.names().as_slice();
        let module = find_entry(names, &self.config.module).ok_or_else(missing)?;
        let callback = find_entry(names, &self.config.callback).ok_or_else(missing)?;
        let wanted = Constant::Int(i64::from(id));

        let instructions = editor.instructions();
        let mut index = editor.index_at(offset)?;
        while let Some(window) = instructions.get(index..index + CALL_SEQUENCE_LEN) {
            let Some(constant) = match_call_sequence(window, module, callback) else {
                break;
            };
            if constant_index(function.constants(), constant)?.same_entry(&wanted) {
                return Ok(editor.offsets()[index]);
            }
            index += CALL_SEQUENCE_LEN;
        }
        Err(missing())
    }
}

fn locate_line<F: CodeObject + ?Sized>(function: &F, line: u32) -> PatchResult<u32> {
    if line == 0 {
        return Err(PatchError::LineNotFound { line });
    }
    function.line_table().find_offset_for_line(line)
}

pub fn call_sequence(module: u32, callback: u32, id_constant: u32) -> Vec<Instruction> {
    vec![
        Instruction::new(OpCode::LoadGlobal, module),
        Instruction::new(OpCode::LoadMethod, callback),
        Instruction::new(OpCode::LoadConst, id_constant),
        Instruction::new(OpCode::CallMethod, 1),
        Instruction::bare(OpCode::PopTop),
    ]
}

fn match_call_sequence(window: &[Instruction], module: u32, callback: u32) -> Option<u32> {
    let [load_global, load_method, load_const, call, pop] = window else {
        return None;
    };
    let matches = load_global.opcode == OpCode::LoadGlobal
        && load_global.arg == module
        && load_method.opcode == OpCode::LoadMethod
        && load_method.arg == callback
        && load_const.opcode == OpCode::LoadConst
        && call.opcode == OpCode::CallMethod
        && call.arg == 1
        && pop.opcode == OpCode::PopTop;
    matches.then_some(load_const.arg)
}

pub fn stack_growth(block: &[Instruction]) -> u32 {
    let mut depth = 0i64;
    let mut peak = 0i64;
    for instruction in block {
        depth += instruction.opcode.stack_effect(instruction.arg, false);
        peak = peak.max(depth);
    }
    peak as u32
}
