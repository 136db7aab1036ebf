use std::collections::HashMap;

use crate::codec::{Instruction, InstructionKind, classify, encode, instruction_offsets, width_for};
use crate::error::PatchError;
use crate::host::Function;
use crate::line_table::LineTable;
use crate::opcode::{OpCode, OperandKind, compare_op_name};
use crate::pool::{Constant, find_entry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    DuplicateLabel(String),
    UnknownLabel(String),
    DanglingLabel(String),
    BackwardRelativeJump(String),
    NotAJump(OpCode),
    Encode(PatchError),
}

impl std::fmt::Display for AssemblerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssemblerError::DuplicateLabel(name) => write!(f, "duplicate label '{name}'"),
            AssemblerError::UnknownLabel(name) => write!(f, "unknown label '{name}'"),
            AssemblerError::DanglingLabel(name) => {
                write!(f, "label '{name}' is not followed by an instruction")
            }
            AssemblerError::BackwardRelativeJump(name) => {
                write!(f, "relative jumps only go forward, but '{name}' is behind")
            }
            AssemblerError::NotAJump(opcode) => {
                write!(f, "{} does not take a jump target", opcode.mnemonic())
            }
            AssemblerError::Encode(err) => write!(f, "encode error: {err}"),
        }
    }
}

impl std::error::Error for AssemblerError {}

#[derive(Clone, Debug)]
enum Operand {
    Value(u32),
    Label(String),
}

#[derive(Clone, Debug)]
struct Item {
    opcode: OpCode,
    operand: Operand,
    line: Option<u32>,
}

pub struct FunctionBuilder {
    name: String,
    first_line: Option<u32>,
    items: Vec<Item>,
    constants: Vec<Constant>,
    names: Vec<String>,
    labels: HashMap<String, usize>,
    line: Option<u32>,
    stack_depth: Option<u32>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            first_line: None,
            items: Vec::new(),
            constants: Vec::new(),
            names: Vec::new(),
            labels: HashMap::new(),
            line: None,
            stack_depth: None,
        }
    }

    pub fn set_first_line(&mut self, line: u32) {
        self.first_line = Some(line);
    }

    pub fn set_stack_depth(&mut self, depth: u32) {
        self.stack_depth = Some(depth);
    }

    pub fn mark_line(&mut self, line: u32) {
        self.line = Some(line);
    }

    pub fn clear_line(&mut self) {
        self.line = None;
    }

    pub fn label(&mut self, name: &str) -> Result<(), AssemblerError> {
        if self.labels.contains_key(name) {
            return Err(AssemblerError::DuplicateLabel(name.to_string()));
        }
        self.labels.insert(name.to_string(), self.items.len());
        Ok(())
    }

    pub fn add_constant(&mut self, value: Constant) -> u32 {
        if let Some(index) = find_entry(&self.constants, &value) {
            return index;
        }
        self.constants.push(value);
        (self.constants.len() - 1) as u32
    }

    pub fn add_name(&mut self, name: &str) -> u32 {
        let name = name.to_string();
        if let Some(index) = find_entry(&self.names, &name) {
            return index;
        }
        self.names.push(name);
        (self.names.len() - 1) as u32
    }

    pub fn emit(&mut self, opcode: OpCode, arg: u32) {
        self.items.push(Item {
            opcode,
            operand: Operand::Value(arg),
            line: self.line,
        });
    }

    pub fn op(&mut self, opcode: OpCode) {
        self.emit(opcode, 0);
    }

    pub fn jump(&mut self, opcode: OpCode, label: &str) {
        self.items.push(Item {
            opcode,
            operand: Operand::Label(label.to_string()),
            line: self.line,
        });
    }

    pub fn load_const(&mut self, value: Constant) -> u32 {
        let index = self.add_constant(value);
        self.emit(OpCode::LoadConst, index);
        index
    }

    pub fn load_global(&mut self, name: &str) -> u32 {
        let index = self.add_name(name);
        self.emit(OpCode::LoadGlobal, index);
        index
    }

    pub fn finish(self) -> Result<Function, AssemblerError> {
        let instructions = self.layout()?;
        let code = encode(&instructions).map_err(AssemblerError::Encode)?;

        let mut spans: Vec<(u32, Option<u32>)> = Vec::new();
        for (item, instruction) in self.items.iter().zip(&instructions) {
            if let Some((len, line)) = spans.last_mut()
                && *line == item.line
            {
                *len += instruction.byte_len();
            } else {
                spans.push((instruction.byte_len(), item.line));
            }
        }
        let first_line = self
            .first_line
            .or_else(|| self.items.iter().filter_map(|item| item.line).min())
            .unwrap_or(1);
        let line_table = LineTable::from_spans(first_line, spans);
        let stack_depth = self
            .stack_depth
            .unwrap_or_else(|| straight_line_depth(&instructions));

        Ok(Function::new(
            self.name,
            code,
            self.constants,
            self.names,
            line_table,
            stack_depth,
        ))
    }

    fn layout(&self) -> Result<Vec<Instruction>, AssemblerError> {
        let mut targets = vec![None; self.items.len()];
        for (index, item) in self.items.iter().enumerate() {
            if let Operand::Label(name) = &item.operand {
                if !classify(&Instruction::bare(item.opcode)).is_jump() {
                    return Err(AssemblerError::NotAJump(item.opcode));
                }
                let target = *self
                    .labels
                    .get(name)
                    .ok_or_else(|| AssemblerError::UnknownLabel(name.clone()))?;
                if target >= self.items.len() {
                    return Err(AssemblerError::DanglingLabel(name.clone()));
                }
                targets[index] = Some((target, name.as_str()));
            }
        }

        let mut instructions = self
            .items
            .iter()
            .map(|item| match item.operand {
                Operand::Value(arg) => Instruction::new(item.opcode, arg),
                Operand::Label(_) => Instruction::bare(item.opcode),
            })
            .collect::<Vec<_>>();

        // Widths only grow, so this settles after at most three passes per jump.
        loop {
            let offsets = instruction_offsets(&instructions);
            let mut changed = false;
            for (index, target) in targets.iter().enumerate() {
                let Some((target, label)) = target else {
                    continue;
                };
                let target_offset = offsets[*target];
                let instruction = &mut instructions[index];
                let arg = match classify(instruction) {
                    InstructionKind::AbsoluteJump => target_offset,
                    _ => {
                        let end = offsets[index] + instruction.byte_len();
                        target_offset.checked_sub(end).ok_or_else(|| {
                            AssemblerError::BackwardRelativeJump(label.to_string())
                        })?
                    }
                };
                instruction.arg = arg;
                let width = width_for(arg);
                if width > instruction.width {
                    instruction.width = width;
                    changed = true;
                }
            }
            if !changed {
                return Ok(instructions);
            }
        }
    }
}

fn straight_line_depth(instructions: &[Instruction]) -> u32 {
    let mut depth = 0i64;
    let mut peak = 0i64;
    for instruction in instructions {
        depth = (depth + instruction.opcode.stack_effect(instruction.arg, false)).max(0);
        peak = peak.max(depth);
    }
    peak as u32
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmParseError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for AsmParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for AsmParseError {}

/// Assembles the textual listing format:
///
/// ```text
/// .function countdown
/// .line 2
///     load_fast 0
///     pop_jump_if_false done
/// .label done
/// .line 3
///     load_const None
///     return_value
/// ```
pub fn assemble(source: &str) -> Result<Function, AsmParseError> {
    let mut builder = FunctionBuilder::new("<asm>");
    let mut consts: HashMap<String, u32> = HashMap::new();

    for (line_idx, raw_line) in source.lines().enumerate() {
        let line_no = line_idx + 1;
        let line = strip_comments(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let error = |message: String| AsmParseError {
            line: line_no,
            message,
        };

        if let Some(rest) = line.strip_prefix('.') {
            let mut parts = rest.split_whitespace();
            let directive = parts.next().unwrap_or("").to_ascii_lowercase();
            match directive.as_str() {
                "function" => {
                    builder.name = next_token(&mut parts, line_no, "function name")?.to_string();
                }
                "firstline" => {
                    let value = next_token(&mut parts, line_no, "first line")?;
                    builder.set_first_line(parse_u32(value, line_no)?);
                }
                "stack" => {
                    let value = next_token(&mut parts, line_no, "stack depth")?;
                    builder.set_stack_depth(parse_u32(value, line_no)?);
                }
                "line" => {
                    let value = next_token(&mut parts, line_no, "line number")?;
                    builder.mark_line(parse_u32(value, line_no)?);
                }
                "noline" => builder.clear_line(),
                "label" => {
                    let name = next_token(&mut parts, line_no, "label name")?;
                    builder
                        .label(name)
                        .map_err(|err| error(format!("label error: {err}")))?;
                }
                "const" => {
                    let name = next_token(&mut parts, line_no, "const name")?;
                    if consts.contains_key(name) {
                        return Err(error(format!("duplicate const '{name}'")));
                    }
                    let literal = rest_after_n_tokens(line, 2).unwrap_or("");
                    if literal.is_empty() {
                        return Err(error("missing const value".to_string()));
                    }
                    let index = builder.add_constant(parse_literal(literal, line_no)?);
                    consts.insert(name.to_string(), index);
                    continue;
                }
                other => return Err(error(format!("unknown directive '.{other}'"))),
            }
            if parts.next().is_some() {
                return Err(error("unexpected extra tokens".to_string()));
            }
            continue;
        }

        let mut parts = line.split_whitespace();
        let op = parts
            .next()
            .ok_or_else(|| error("missing opcode".to_string()))?
            .to_ascii_lowercase();
        let opcode =
            OpCode::parse_mnemonic(&op).ok_or_else(|| error(format!("unknown opcode '{op}'")))?;
        if opcode == OpCode::ExtendedArg {
            return Err(error(
                "extended_arg is emitted by the assembler, not written by hand".to_string(),
            ));
        }

        match opcode.operand_kind() {
            OperandKind::None => builder.op(opcode),
            OperandKind::Const => {
                let literal = rest_after_n_tokens(line, 1).unwrap_or("");
                if literal.is_empty() {
                    return Err(error("missing constant".to_string()));
                }
                let index = match consts.get(literal) {
                    Some(index) => *index,
                    None => builder.add_constant(parse_literal(literal, line_no)?),
                };
                builder.emit(opcode, index);
                continue;
            }
            OperandKind::Name => {
                let name = next_token(&mut parts, line_no, "name")?;
                let index = builder.add_name(name);
                builder.emit(opcode, index);
            }
            OperandKind::Local | OperandKind::Count => {
                let value = next_token(&mut parts, line_no, "operand")?;
                builder.emit(opcode, parse_u32(value, line_no)?);
            }
            OperandKind::Compare => {
                let token = next_token(&mut parts, line_no, "comparison")?;
                let index = (0..6)
                    .find(|index| compare_op_name(*index) == Some(token))
                    .map_or_else(|| parse_u32(token, line_no), Ok)?;
                builder.emit(opcode, index);
            }
            OperandKind::Jump => {
                let label = next_token(&mut parts, line_no, "jump target")?;
                if label.parse::<u32>().is_ok() {
                    return Err(error("numeric jump targets are not supported".to_string()));
                }
                builder.jump(opcode, label);
            }
        }

        if parts.next().is_some() {
            return Err(error("unexpected extra tokens".to_string()));
        }
    }

    builder.finish().map_err(|err| AsmParseError {
        line: 0,
        message: format!("assembler error: {err}"),
    })
}

fn strip_comments(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            ';' | '#' => return &line[..idx],
            _ => {}
        }
    }
    line
}

fn next_token<'a>(
    parts: &mut impl Iterator<Item = &'a str>,
    line_no: usize,
    what: &str,
) -> Result<&'a str, AsmParseError> {
    parts.next().ok_or_else(|| AsmParseError {
        line: line_no,
        message: format!("missing {what}"),
    })
}

fn parse_u32(token: &str, line_no: usize) -> Result<u32, AsmParseError> {
    token.parse::<u32>().map_err(|_| AsmParseError {
        line: line_no,
        message: format!("invalid u32 '{token}'"),
    })
}

fn parse_literal(token: &str, line_no: usize) -> Result<Constant, AsmParseError> {
    let token = token.trim();
    if token.starts_with('"') {
        return Ok(Constant::Str(parse_string_literal(token, line_no)?));
    }
    match token {
        "None" => return Ok(Constant::None),
        "True" | "true" => return Ok(Constant::Bool(true)),
        "False" | "false" => return Ok(Constant::Bool(false)),
        _ => {}
    }
    if let Ok(value) = token.parse::<i64>() {
        return Ok(Constant::Int(value));
    }
    token
        .parse::<f64>()
        .map(Constant::Float)
        .map_err(|_| AsmParseError {
            line: line_no,
            message: format!("invalid literal '{token}'"),
        })
}

fn parse_string_literal(token: &str, line_no: usize) -> Result<String, AsmParseError> {
    let error = |message: &str| AsmParseError {
        line: line_no,
        message: message.to_string(),
    };
    let mut chars = token.char_indices();
    if chars.next().map(|(_, ch)| ch) != Some('"') {
        return Err(error("string literal must start with '\"'"));
    }

    let mut out = String::new();
    let mut escaped = false;
    let mut end_idx = None;
    for (idx, ch) in chars {
        if escaped {
            out.push(match ch {
                'n' => '\n',
                't' => '\t',
                '\\' => '\\',
                '"' => '"',
                other => {
                    return Err(AsmParseError {
                        line: line_no,
                        message: format!("invalid escape '\\{other}'"),
                    });
                }
            });
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => {
                end_idx = Some(idx);
                break;
            }
            other => out.push(other),
        }
    }

    let Some(end_idx) = end_idx else {
        return Err(error("unterminated string literal"));
    };
    if token[end_idx + 1..].trim().is_empty() {
        Ok(out)
    } else {
        Err(error("unexpected trailing characters after string literal"))
    }
}

fn rest_after_n_tokens(line: &str, n: usize) -> Option<&str> {
    let mut rest = line.trim_start();
    for _ in 0..n {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }
    Some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_inside_strings_are_kept() {
        assert_eq!(strip_comments("load_const \"a;b\" ; note"), "load_const \"a;b\" ");
        assert_eq!(strip_comments("nop # trailing"), "nop ");
    }

    #[test]
    fn rest_after_tokens_skips_leading_words() {
        assert_eq!(rest_after_n_tokens(".const X \"a b\"", 2), Some("\"a b\""));
        assert_eq!(rest_after_n_tokens("load_const", 1), None);
    }
}
