pub const WORD_SIZE: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Nop = 0x00,
    PopTop = 0x01,
    DupTop = 0x02,
    RotTwo = 0x03,
    BinaryAdd = 0x04,
    BinarySubtract = 0x05,
    BinaryMultiply = 0x06,
    CompareOp = 0x07,
    ReturnValue = 0x08,
    GetIter = 0x09,
    PopBlock = 0x0A,
    YieldValue = 0x0B,
    YieldFrom = 0x0C,
    LoadConst = 0x10,
    LoadFast = 0x11,
    StoreFast = 0x12,
    LoadGlobal = 0x13,
    StoreGlobal = 0x14,
    LoadAttr = 0x15,
    LoadMethod = 0x16,
    CallMethod = 0x17,
    CallFunction = 0x18,
    BuildList = 0x19,
    JumpForward = 0x20,
    ForIter = 0x21,
    SetupFinally = 0x22,
    SetupWith = 0x23,
    SetupAsyncWith = 0x24,
    JumpAbsolute = 0x28,
    PopJumpIfFalse = 0x29,
    PopJumpIfTrue = 0x2A,
    JumpIfFalseOrPop = 0x2B,
    JumpIfTrueOrPop = 0x2C,
    JumpIfNotExcMatch = 0x2D,
    ExtendedArg = 0x7F,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Const,
    Name,
    Local,
    Jump,
    Count,
    Compare,
}

const ALL: [OpCode; 35] = [
    OpCode::Nop,
    OpCode::PopTop,
    OpCode::DupTop,
    OpCode::RotTwo,
    OpCode::BinaryAdd,
    OpCode::BinarySubtract,
    OpCode::BinaryMultiply,
    OpCode::CompareOp,
    OpCode::ReturnValue,
    OpCode::GetIter,
    OpCode::PopBlock,
    OpCode::YieldValue,
    OpCode::YieldFrom,
    OpCode::LoadConst,
    OpCode::LoadFast,
    OpCode::StoreFast,
    OpCode::LoadGlobal,
    OpCode::StoreGlobal,
    OpCode::LoadAttr,
    OpCode::LoadMethod,
    OpCode::CallMethod,
    OpCode::CallFunction,
    OpCode::BuildList,
    OpCode::JumpForward,
    OpCode::ForIter,
    OpCode::SetupFinally,
    OpCode::SetupWith,
    OpCode::SetupAsyncWith,
    OpCode::JumpAbsolute,
    OpCode::PopJumpIfFalse,
    OpCode::PopJumpIfTrue,
    OpCode::JumpIfFalseOrPop,
    OpCode::JumpIfTrueOrPop,
    OpCode::JumpIfNotExcMatch,
    OpCode::ExtendedArg,
];

impl OpCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        ALL.iter().copied().find(|op| *op as u8 == byte)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Nop => "nop",
            OpCode::PopTop => "pop_top",
            OpCode::DupTop => "dup_top",
            OpCode::RotTwo => "rot_two",
            OpCode::BinaryAdd => "binary_add",
            OpCode::BinarySubtract => "binary_subtract",
            OpCode::BinaryMultiply => "binary_multiply",
            OpCode::CompareOp => "compare_op",
            OpCode::ReturnValue => "return_value",
            OpCode::GetIter => "get_iter",
            OpCode::PopBlock => "pop_block",
            OpCode::YieldValue => "yield_value",
            OpCode::YieldFrom => "yield_from",
            OpCode::LoadConst => "load_const",
            OpCode::LoadFast => "load_fast",
            OpCode::StoreFast => "store_fast",
            OpCode::LoadGlobal => "load_global",
            OpCode::StoreGlobal => "store_global",
            OpCode::LoadAttr => "load_attr",
            OpCode::LoadMethod => "load_method",
            OpCode::CallMethod => "call_method",
            OpCode::CallFunction => "call_function",
            OpCode::BuildList => "build_list",
            OpCode::JumpForward => "jump_forward",
            OpCode::ForIter => "for_iter",
            OpCode::SetupFinally => "setup_finally",
            OpCode::SetupWith => "setup_with",
            OpCode::SetupAsyncWith => "setup_async_with",
            OpCode::JumpAbsolute => "jump_absolute",
            OpCode::PopJumpIfFalse => "pop_jump_if_false",
            OpCode::PopJumpIfTrue => "pop_jump_if_true",
            OpCode::JumpIfFalseOrPop => "jump_if_false_or_pop",
            OpCode::JumpIfTrueOrPop => "jump_if_true_or_pop",
            OpCode::JumpIfNotExcMatch => "jump_if_not_exc_match",
            OpCode::ExtendedArg => "extended_arg",
        }
    }

    pub fn parse_mnemonic(op: &str) -> Option<Self> {
        ALL.iter().copied().find(|candidate| candidate.mnemonic() == op)
    }

    pub fn operand_kind(self) -> OperandKind {
        match self {
            OpCode::LoadConst => OperandKind::Const,
            OpCode::LoadGlobal
            | OpCode::StoreGlobal
            | OpCode::LoadAttr
            | OpCode::LoadMethod => OperandKind::Name,
            OpCode::LoadFast | OpCode::StoreFast => OperandKind::Local,
            OpCode::CallMethod | OpCode::CallFunction | OpCode::BuildList => OperandKind::Count,
            OpCode::CompareOp => OperandKind::Compare,
            OpCode::JumpForward
            | OpCode::ForIter
            | OpCode::SetupFinally
            | OpCode::SetupWith
            | OpCode::SetupAsyncWith
            | OpCode::JumpAbsolute
            | OpCode::PopJumpIfFalse
            | OpCode::PopJumpIfTrue
            | OpCode::JumpIfFalseOrPop
            | OpCode::JumpIfTrueOrPop
            | OpCode::JumpIfNotExcMatch => OperandKind::Jump,
            _ => OperandKind::None,
        }
    }

    /// Net stack change of executing this opcode. `jump` selects the effect
    /// on the taken branch for conditional control transfers.
    pub fn stack_effect(self, arg: u32, jump: bool) -> i64 {
        let arg = i64::from(arg);
        match self {
            OpCode::Nop
            | OpCode::RotTwo
            | OpCode::GetIter
            | OpCode::PopBlock
            | OpCode::YieldValue
            | OpCode::LoadAttr
            | OpCode::JumpForward
            | OpCode::JumpAbsolute
            | OpCode::ExtendedArg => 0,
            OpCode::PopTop
            | OpCode::BinaryAdd
            | OpCode::BinarySubtract
            | OpCode::BinaryMultiply
            | OpCode::CompareOp
            | OpCode::ReturnValue
            | OpCode::YieldFrom
            | OpCode::StoreFast
            | OpCode::StoreGlobal
            | OpCode::PopJumpIfFalse
            | OpCode::PopJumpIfTrue => -1,
            OpCode::DupTop
            | OpCode::LoadConst
            | OpCode::LoadFast
            | OpCode::LoadGlobal
            | OpCode::LoadMethod => 1,
            OpCode::CallMethod => -(arg + 1),
            OpCode::CallFunction => -arg,
            OpCode::BuildList => 1 - arg,
            OpCode::ForIter => {
                if jump {
                    -1
                } else {
                    1
                }
            }
            OpCode::SetupFinally => {
                if jump {
                    6
                } else {
                    0
                }
            }
            OpCode::SetupWith => {
                if jump {
                    6
                } else {
                    1
                }
            }
            OpCode::SetupAsyncWith => {
                if jump {
                    5
                } else {
                    0
                }
            }
            OpCode::JumpIfFalseOrPop | OpCode::JumpIfTrueOrPop => {
                if jump {
                    0
                } else {
                    -1
                }
            }
            OpCode::JumpIfNotExcMatch => -2,
        }
    }
}

pub fn compare_op_name(arg: u32) -> Option<&'static str> {
    const NAMES: [&str; 6] = ["<", "<=", "==", "!=", ">", ">="];
    NAMES.get(arg as usize).copied()
}
