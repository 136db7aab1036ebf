use std::fmt::Write as _;

use crate::codec::{DecodeError, Instruction, branch_target, decode, instruction_offsets};
use crate::host::CodeObject;
use crate::opcode::{OperandKind, compare_op_name};

pub fn disassemble<F: CodeObject + ?Sized>(function: &F) -> Result<String, DecodeError> {
    let code = function.code();
    let instructions = decode(code)?;
    let offsets = instruction_offsets(&instructions);
    let constants = function.constants();
    let names = function.names();

    let mut out = String::new();
    let _ = writeln!(
        &mut out,
        "function {} (stack {}):",
        function.name(),
        function.stack_depth()
    );
    let _ = writeln!(&mut out, "constants ({}):", constants.len());
    for (index, constant) in constants.iter().enumerate() {
        let _ = writeln!(&mut out, "  [{index:04}] {constant}");
    }
    let _ = writeln!(&mut out, "names ({}):", names.len());
    for (index, name) in names.iter().enumerate() {
        let _ = writeln!(&mut out, "  [{index:04}] {name}");
    }

    let _ = writeln!(&mut out, "code ({} bytes):", code.len());
    let mut lines = function.line_table().entries().peekable();
    for (instruction, offset) in instructions.iter().zip(&offsets) {
        while let Some(entry) = lines.next_if(|entry| entry.start <= *offset) {
            match entry.line {
                Some(line) => {
                    let _ = writeln!(&mut out, "      ; line {line}");
                }
                None => {
                    let _ = writeln!(&mut out, "      ; line -");
                }
            }
        }
        let start = *offset as usize;
        let encoded = format_hex_bytes(&code[start..start + instruction.byte_len() as usize]);
        let text = describe(function, instruction, *offset);
        let _ = writeln!(&mut out, "{offset:04}\t{encoded:<14}\t{text}");
    }
    Ok(out)
}

fn describe<F: CodeObject + ?Sized>(function: &F, instruction: &Instruction, offset: u32) -> String {
    let mnemonic = instruction.opcode.mnemonic();
    let arg = instruction.arg;
    match instruction.opcode.operand_kind() {
        OperandKind::None => mnemonic.to_string(),
        OperandKind::Const => match function.constants().get(arg as usize) {
            Some(value) => format!("{mnemonic} {arg} ; {value}"),
            None => format!("{mnemonic} {arg} ; <missing const>"),
        },
        OperandKind::Name => match function.names().get(arg as usize) {
            Some(name) => format!("{mnemonic} {arg} ; {name}"),
            None => format!("{mnemonic} {arg} ; <missing name>"),
        },
        OperandKind::Local | OperandKind::Count => format!("{mnemonic} {arg}"),
        OperandKind::Compare => match compare_op_name(arg) {
            Some(name) => format!("{mnemonic} {arg} ; {name}"),
            None => format!("{mnemonic} {arg}"),
        },
        OperandKind::Jump => match branch_target(instruction, offset) {
            Some(target) => format!("{mnemonic} {arg} ; to {target}"),
            None => format!("{mnemonic} {arg}"),
        },
    }
}

fn format_hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}
