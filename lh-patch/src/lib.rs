pub mod assembler;
pub mod codec;
pub mod disasm;
pub mod editor;
pub mod error;
pub mod host;
pub mod injector;
pub mod line_table;
pub mod opcode;
pub mod pool;
pub mod registry;

pub use assembler::{AsmParseError, AssemblerError, FunctionBuilder, assemble};
pub use codec::{DecodeError, Instruction, InstructionKind, decode, encode};
pub use disasm::disassemble;
pub use editor::{EditOutcome, Insertion, Placement, StreamEditor, insert_at, remove_at};
pub use error::{ErrorKind, PatchError, PatchResult};
pub use host::{CodeObject, Function};
pub use injector::{CALL_SEQUENCE_LEN, Injector, InjectorConfig};
pub use line_table::{LineEntry, LineRun, LineTable};
pub use opcode::{OpCode, OperandKind, WORD_SIZE};
pub use pool::{Constant, PoolEntry, merge_into};
pub use registry::{Breakpoint, BreakpointRegistry, BreakpointState, BreakpointStatus};
