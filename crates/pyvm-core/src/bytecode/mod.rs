pub mod code;
pub mod decoder;
pub mod disassembler;
pub mod instruction;
pub mod opcode;

pub use code::CodeObject;
pub use decoder::{decode, Decoder, OperandExtensions};
pub use disassembler::{CodeSummary, Disassembler};
pub use instruction::Instruction;
pub use opcode::OpCode;
