#![allow(dead_code, unused_imports)]

pub use patch::{
    CodeObject, Constant, Function, Injector, InjectorConfig, Instruction, OpCode, PatchError,
    assemble, decode, encode,
};

/// A loop that counts local 0 down to zero. Lines 2 to 5; line 3 starts at
/// byte 8 and the conditional exit at byte 6 jumps to byte 18.
pub const COUNTDOWN: &str = r#"
.function countdown
.line 2
.label top
    load_fast 0
    load_const 0
    compare_op >
    pop_jump_if_false done
.line 3
    load_fast 0
    load_const 1
    binary_subtract
    store_fast 0
.line 4
    jump_absolute top
.line 5
.label done
    load_const None
    return_value
"#;

pub fn countdown() -> Function {
    assemble(COUNTDOWN).expect("countdown should assemble")
}

/// Encodes `(opcode, operand)` pairs at their minimal widths.
pub fn raw(program: &[(OpCode, u32)]) -> Vec<u8> {
    let instructions = program
        .iter()
        .map(|(opcode, arg)| Instruction::new(*opcode, *arg))
        .collect::<Vec<_>>();
    encode(&instructions).expect("encode should succeed")
}

pub fn nops(count: usize) -> Vec<Instruction> {
    vec![Instruction::bare(OpCode::Nop); count]
}

pub fn line_table_covers_code(function: &Function) -> bool {
    function.line_table().total_len() == function.code().len() as u64
}
