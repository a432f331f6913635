//! Bytecode Opcode Definitions
//!
//! Opcode numbers follow the CPython 3.12 encoding. `OpCode` only lists the
//! subset the interpreter executes; the name table covers the full 3.12 set
//! so the disassembler can still label instructions it cannot run.

/// Executable opcodes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    // Stack operations
    PopTop   = 1,
    PushNull = 2,

    // Name access
    StoreName  = 90,
    DeleteName = 91,
    LoadConst  = 100,
    LoadName   = 101,
    ImportName = 108,

    // Calls and functions
    ReturnConst  = 121,
    MakeFunction = 132,
    Call         = 171,

    // Markers
    Resume = 151,
}

impl OpCode {
    /// Convert raw byte to an executable opcode
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(OpCode::PopTop),
            2 => Some(OpCode::PushNull),

            90 => Some(OpCode::StoreName),
            91 => Some(OpCode::DeleteName),
            100 => Some(OpCode::LoadConst),
            101 => Some(OpCode::LoadName),
            108 => Some(OpCode::ImportName),

            121 => Some(OpCode::ReturnConst),
            132 => Some(OpCode::MakeFunction),
            171 => Some(OpCode::Call),

            151 => Some(OpCode::Resume),

            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        name(self as u8)
    }

    /// What the operand indexes, if anything
    pub fn operand_kind(self) -> OperandKind {
        match self {
            OpCode::LoadConst | OpCode::ReturnConst | OpCode::MakeFunction => {
                OperandKind::Constant
            }
            OpCode::LoadName | OpCode::StoreName | OpCode::DeleteName | OpCode::ImportName => {
                OperandKind::Name
            }
            OpCode::PopTop | OpCode::PushNull | OpCode::Resume | OpCode::Call => {
                OperandKind::Plain
            }
        }
    }
}

/// Meaning of an instruction operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// Index into the constant pool
    Constant,
    /// Index into the name pool
    Name,
    /// Raw number (or ignored)
    Plain,
}

/// CPython 3.12 opcode names
const OPNAMES: &[(u8, &str)] = &[
    (0, "CACHE"),
    (1, "POP_TOP"),
    (2, "PUSH_NULL"),
    (3, "INTERPRETER_EXIT"),
    (4, "END_FOR"),
    (5, "END_SEND"),
    (9, "NOP"),
    (11, "UNARY_NEGATIVE"),
    (12, "UNARY_NOT"),
    (15, "UNARY_INVERT"),
    (17, "RESERVED"),
    (25, "BINARY_SUBSCR"),
    (26, "BINARY_SLICE"),
    (27, "STORE_SLICE"),
    (30, "GET_LEN"),
    (31, "MATCH_MAPPING"),
    (32, "MATCH_SEQUENCE"),
    (33, "MATCH_KEYS"),
    (35, "PUSH_EXC_INFO"),
    (36, "CHECK_EXC_MATCH"),
    (37, "CHECK_EG_MATCH"),
    (49, "WITH_EXCEPT_START"),
    (50, "GET_AITER"),
    (51, "GET_ANEXT"),
    (52, "BEFORE_ASYNC_WITH"),
    (53, "BEFORE_WITH"),
    (54, "END_ASYNC_FOR"),
    (55, "CLEANUP_THROW"),
    (60, "STORE_SUBSCR"),
    (61, "DELETE_SUBSCR"),
    (68, "GET_ITER"),
    (69, "GET_YIELD_FROM_ITER"),
    (71, "LOAD_BUILD_CLASS"),
    (74, "LOAD_ASSERTION_ERROR"),
    (75, "RETURN_GENERATOR"),
    (83, "RETURN_VALUE"),
    (85, "SETUP_ANNOTATIONS"),
    (87, "LOAD_LOCALS"),
    (89, "POP_EXCEPT"),
    (90, "STORE_NAME"),
    (91, "DELETE_NAME"),
    (92, "UNPACK_SEQUENCE"),
    (93, "FOR_ITER"),
    (94, "UNPACK_EX"),
    (95, "STORE_ATTR"),
    (96, "DELETE_ATTR"),
    (97, "STORE_GLOBAL"),
    (98, "DELETE_GLOBAL"),
    (99, "SWAP"),
    (100, "LOAD_CONST"),
    (101, "LOAD_NAME"),
    (102, "BUILD_TUPLE"),
    (103, "BUILD_LIST"),
    (104, "BUILD_SET"),
    (105, "BUILD_MAP"),
    (106, "LOAD_ATTR"),
    (107, "COMPARE_OP"),
    (108, "IMPORT_NAME"),
    (109, "IMPORT_FROM"),
    (110, "JUMP_FORWARD"),
    (114, "POP_JUMP_IF_FALSE"),
    (115, "POP_JUMP_IF_TRUE"),
    (116, "LOAD_GLOBAL"),
    (117, "IS_OP"),
    (118, "CONTAINS_OP"),
    (119, "RERAISE"),
    (120, "COPY"),
    (121, "RETURN_CONST"),
    (122, "BINARY_OP"),
    (123, "SEND"),
    (124, "LOAD_FAST"),
    (125, "STORE_FAST"),
    (126, "DELETE_FAST"),
    (127, "LOAD_FAST_CHECK"),
    (128, "POP_JUMP_IF_NOT_NONE"),
    (129, "POP_JUMP_IF_NONE"),
    (130, "RAISE_VARARGS"),
    (131, "GET_AWAITABLE"),
    (132, "MAKE_FUNCTION"),
    (133, "BUILD_SLICE"),
    (134, "JUMP_BACKWARD_NO_INTERRUPT"),
    (135, "MAKE_CELL"),
    (136, "LOAD_CLOSURE"),
    (137, "LOAD_DEREF"),
    (138, "STORE_DEREF"),
    (139, "DELETE_DEREF"),
    (140, "JUMP_BACKWARD"),
    (141, "LOAD_SUPER_ATTR"),
    (142, "CALL_FUNCTION_EX"),
    (143, "LOAD_FAST_AND_CLEAR"),
    (144, "EXTENDED_ARG"),
    (145, "LIST_APPEND"),
    (146, "SET_ADD"),
    (147, "MAP_ADD"),
    (149, "COPY_FREE_VARS"),
    (150, "YIELD_VALUE"),
    (151, "RESUME"),
    (152, "MATCH_CLASS"),
    (155, "FORMAT_VALUE"),
    (156, "BUILD_CONST_KEY_MAP"),
    (157, "BUILD_STRING"),
    (162, "LIST_EXTEND"),
    (163, "SET_UPDATE"),
    (164, "DICT_MERGE"),
    (165, "DICT_UPDATE"),
    (171, "CALL"),
    (172, "KW_NAMES"),
    (173, "CALL_INTRINSIC_1"),
    (174, "CALL_INTRINSIC_2"),
    (175, "LOAD_FROM_DICT_OR_GLOBALS"),
    (176, "LOAD_FROM_DICT_OR_DEREF"),
];

/// Display name of any opcode byte, `"<unknown>"` when unassigned
pub fn name(byte: u8) -> &'static str {
    OPNAMES
        .iter()
        .find(|(op, _)| *op == byte)
        .map(|(_, name)| *name)
        .unwrap_or("<unknown>")
}

/// Reverse lookup used by assemblers and configuration
pub fn from_name(name: &str) -> Option<u8> {
    OPNAMES
        .iter()
        .find(|(_, n)| n.eq_ignore_ascii_case(name))
        .map(|(op, _)| *op)
}
