use std::collections::HashSet;
use std::collections::TryReserveError;

use crate::error::{PatchError, PatchResult};
use crate::opcode::{OpCode, WORD_SIZE};

pub const MAX_PREFIX_WORDS: u8 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: OpCode,
    pub arg: u32,
    /// Encoded size in words, prefix words included.
    pub width: u8,
}

impl Instruction {
    pub fn new(opcode: OpCode, arg: u32) -> Self {
        Self {
            opcode,
            arg,
            width: width_for(arg),
        }
    }

    pub fn bare(opcode: OpCode) -> Self {
        Self::new(opcode, 0)
    }

    pub fn byte_len(&self) -> u32 {
        u32::from(self.width) * WORD_SIZE
    }

    pub fn kind(&self) -> InstructionKind {
        classify(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionKind {
    AbsoluteJump,
    RelativeJump,
    Suspension,
    Other,
}

impl InstructionKind {
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            InstructionKind::AbsoluteJump | InstructionKind::RelativeJump
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    OddLength(usize),
    DanglingPrefix { offset: u32 },
    InvalidOpcode { offset: u32, opcode: u8 },
    OperandOverflow { offset: u32 },
    AllocationFailure(TryReserveError),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::OddLength(len) => {
                write!(f, "stream length {len} is not a whole number of words")
            }
            DecodeError::DanglingPrefix { offset } => {
                write!(f, "extended_arg at offset {offset} has no instruction to extend")
            }
            DecodeError::InvalidOpcode { offset, opcode } => {
                write!(f, "invalid opcode {opcode:#04x} at offset {offset}")
            }
            DecodeError::OperandOverflow { offset } => write!(
                f,
                "instruction at offset {offset} carries more than {MAX_PREFIX_WORDS} extended_arg prefixes",
            ),
            DecodeError::AllocationFailure(err) => write!(f, "decode buffer: {err}"),
        }
    }
}

impl std::error::Error for DecodeError {}

pub fn width_for(arg: u32) -> u8 {
    if arg > 0x00FF_FFFF {
        4
    } else if arg > 0xFFFF {
        3
    } else if arg > 0xFF {
        2
    } else {
        1
    }
}

pub fn classify(instruction: &Instruction) -> InstructionKind {
    match instruction.opcode {
        OpCode::YieldValue | OpCode::YieldFrom => InstructionKind::Suspension,
        OpCode::JumpAbsolute
        | OpCode::PopJumpIfFalse
        | OpCode::PopJumpIfTrue
        | OpCode::JumpIfFalseOrPop
        | OpCode::JumpIfTrueOrPop
        | OpCode::JumpIfNotExcMatch => InstructionKind::AbsoluteJump,
        OpCode::JumpForward
        | OpCode::ForIter
        | OpCode::SetupFinally
        | OpCode::SetupWith
        | OpCode::SetupAsyncWith => InstructionKind::RelativeJump,
        _ => InstructionKind::Other,
    }
}

pub fn branch_target(instruction: &Instruction, offset: u32) -> Option<u32> {
    match classify(instruction) {
        InstructionKind::AbsoluteJump => Some(instruction.arg),
        InstructionKind::RelativeJump => offset
            .checked_add(instruction.byte_len())?
            .checked_add(instruction.arg),
        InstructionKind::Suspension | InstructionKind::Other => None,
    }
}

pub fn decode(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let word = WORD_SIZE as usize;
    if code.len() % word != 0 {
        return Err(DecodeError::OddLength(code.len()));
    }
    let mut instructions = Vec::new();
    instructions
        .try_reserve_exact(code.len() / word)
        .map_err(DecodeError::AllocationFailure)?;
    let mut ip = 0usize;
    while ip < code.len() {
        let start = ip as u32;
        let mut arg = 0u32;
        let mut width = 0u8;
        loop {
            let Some(bytes) = code.get(ip..ip + word) else {
                return Err(DecodeError::DanglingPrefix { offset: start });
            };
            let opcode = OpCode::from_byte(bytes[0]).ok_or(DecodeError::InvalidOpcode {
                offset: ip as u32,
                opcode: bytes[0],
            })?;
            if width > MAX_PREFIX_WORDS {
                return Err(DecodeError::OperandOverflow { offset: start });
            }
            arg = (arg << 8) | u32::from(bytes[1]);
            width += 1;
            ip += word;
            if opcode != OpCode::ExtendedArg {
                instructions.push(Instruction { opcode, arg, width });
                break;
            }
        }
    }
    Ok(instructions)
}

pub fn encode(instructions: &[Instruction]) -> PatchResult<Vec<u8>> {
    let total = instructions
        .iter()
        .map(|instruction| instruction.width.max(width_for(instruction.arg)) as usize)
        .sum::<usize>()
        * WORD_SIZE as usize;
    let mut out = Vec::new();
    out.try_reserve_exact(total)?;
    for instruction in instructions {
        write_instruction(&mut out, instruction);
    }
    Ok(out)
}

fn write_instruction(out: &mut Vec<u8>, instruction: &Instruction) {
    let width = instruction.width.max(width_for(instruction.arg));
    for word in (1..width).rev() {
        let shift = u32::from(word) * 8;
        out.push(OpCode::ExtendedArg as u8);
        out.push(((instruction.arg >> shift) & 0xFF) as u8);
    }
    out.push(instruction.opcode as u8);
    out.push((instruction.arg & 0xFF) as u8);
}

pub fn instruction_offsets(instructions: &[Instruction]) -> Vec<u32> {
    offsets_of(instructions).collect()
}

pub(crate) fn offsets_of(instructions: &[Instruction]) -> impl Iterator<Item = u32> + '_ {
    let mut offset = 0u32;
    instructions.iter().map(move |instruction| {
        let start = offset;
        offset += instruction.byte_len();
        start
    })
}

/// Collects into a buffer reserved up front, so a failed allocation comes
/// back as an error instead of aborting.
pub(crate) fn collect_exact<T>(
    capacity: usize,
    items: impl IntoIterator<Item = T>,
) -> Result<Vec<T>, TryReserveError> {
    let mut out = Vec::new();
    out.try_reserve_exact(capacity)?;
    out.extend(items);
    Ok(out)
}

pub fn stream_len(instructions: &[Instruction]) -> u32 {
    instructions.iter().map(Instruction::byte_len).sum()
}

pub fn verify_targets(instructions: &[Instruction]) -> PatchResult<()> {
    let offsets = collect_exact(instructions.len(), offsets_of(instructions))?;
    let mut starts = HashSet::new();
    starts.try_reserve(offsets.len())?;
    starts.extend(offsets.iter().copied());
    for (instruction, offset) in instructions.iter().zip(&offsets) {
        if !classify(instruction).is_jump() {
            continue;
        }
        match branch_target(instruction, *offset) {
            Some(target) if starts.contains(&target) => {}
            target => {
                return Err(PatchError::consistency(format!(
                    "{} at offset {offset} targets {target:?}, which is not an instruction boundary",
                    instruction.opcode.mnemonic()
                )));
            }
        }
    }
    Ok(())
}
