//! The stack-machine instruction set of the BF container: one `u32` word per
//! opcode (low 16 bits instruction, high 16 bits short operand), except the
//! two push-literal forms which occupy a second word.

/// Instruction identifiers, low 16 bits of an opcode word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    PushUInt32,
    PushFloat,
    PushUInt16,
    PushLocalInt,
    PushLocalFloat,
    PopLocalInt,
    PopLocalFloat,
    BeginProcedure,
    CallNative,
    Return,
    Jump,
    CallProcedure,
    JumpIfFalse,
    PushResult,
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    PushString,
    Unknown(u16),
}

impl Instruction {
    pub fn from_u16(value: u16) -> Self {
        use Instruction::*;
        match value {
            0 => PushUInt32,
            1 => PushFloat,
            2 => PushUInt16,
            3 => PushLocalInt,
            4 => PushLocalFloat,
            5 => PopLocalInt,
            6 => PopLocalFloat,
            7 => BeginProcedure,
            8 => CallNative,
            9 => Return,
            10 => Jump,
            11 => CallProcedure,
            12 => JumpIfFalse,
            13 => PushResult,
            14 => Add,
            15 => Subtract,
            16 => Multiply,
            17 => Divide,
            18 => Equal,
            19 => NotEqual,
            20 => PushString,
            other => Unknown(other),
        }
    }

    pub fn value(self) -> u16 {
        use Instruction::*;
        match self {
            PushUInt32 => 0,
            PushFloat => 1,
            PushUInt16 => 2,
            PushLocalInt => 3,
            PushLocalFloat => 4,
            PopLocalInt => 5,
            PopLocalFloat => 6,
            BeginProcedure => 7,
            CallNative => 8,
            Return => 9,
            Jump => 10,
            CallProcedure => 11,
            JumpIfFalse => 12,
            PushResult => 13,
            Add => 14,
            Subtract => 15,
            Multiply => 16,
            Divide => 17,
            Equal => 18,
            NotEqual => 19,
            PushString => 20,
            Unknown(v) => v,
        }
    }

    /// Two-word opcodes carrying a 32-bit literal in the following word.
    pub fn is_extended(self) -> bool {
        matches!(self, Instruction::PushUInt32 | Instruction::PushFloat)
    }

    /// Opcodes that never carry an operand.
    pub fn is_zero_operand(self) -> bool {
        use Instruction::*;
        matches!(self, Add | Subtract | Equal | NotEqual | PushResult | Return)
    }

    pub fn mnemonic(self) -> Option<&'static str> {
        use Instruction::*;
        Some(match self {
            PushUInt32 => "pushi",
            PushFloat => "pushf",
            PushUInt16 => "pushis",
            PushLocalInt => "pushlix",
            PushLocalFloat => "pushlfx",
            PopLocalInt => "popix",
            PopLocalFloat => "popfx",
            BeginProcedure => "proc",
            CallNative => "comm",
            Return => "ret",
            Jump => "goto",
            CallProcedure => "call",
            JumpIfFalse => "if",
            PushResult => "pushres",
            Add => "add",
            Subtract => "sub",
            Multiply => "mul",
            Divide => "div",
            Equal => "eq",
            NotEqual => "neq",
            PushString => "pushstr",
            Unknown(_) => return None,
        })
    }

    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        use Instruction::*;
        Some(match mnemonic {
            "pushi" => PushUInt32,
            "pushf" => PushFloat,
            "pushis" => PushUInt16,
            "pushlix" => PushLocalInt,
            "pushlfx" => PushLocalFloat,
            "popix" => PopLocalInt,
            "popfx" => PopLocalFloat,
            "proc" => BeginProcedure,
            "comm" => CallNative,
            "ret" => Return,
            "goto" => Jump,
            "call" => CallProcedure,
            "if" => JumpIfFalse,
            "pushres" => PushResult,
            "add" => Add,
            "sub" => Subtract,
            "mul" => Multiply,
            "div" => Divide,
            "eq" => Equal,
            "neq" => NotEqual,
            "pushstr" => PushString,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    None,
    Short(u16),
    Int(u32),
    Float(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Opcode {
    pub instruction: Instruction,
    pub operand: Operand,
}

impl Opcode {
    pub fn new(instruction: Instruction, operand: Operand) -> Self {
        Self { instruction, operand }
    }

    /// Number of 32-bit words this opcode occupies on disk.
    pub fn word_size(&self) -> u32 {
        if self.instruction.is_extended() {
            2
        } else {
            1
        }
    }
}

/// Friendly-name and argument-count hints for recognised native calls,
/// shared by the assembler and disassembler. Read-only after init; safe to
/// share across concurrent decodes.
#[derive(Debug, Clone, Copy)]
pub struct NativeFunction {
    pub id: u16,
    pub name: &'static str,
    pub arg_count: u8,
}

pub static NATIVE_FUNCTIONS: &[NativeFunction] = &[
    NativeFunction { id: 0x0000, name: "SYNC", arg_count: 0 },
    NativeFunction { id: 0x0001, name: "WAIT", arg_count: 1 },
    NativeFunction { id: 0x0002, name: "MSG", arg_count: 1 },
    NativeFunction { id: 0x0003, name: "MSG_SEL", arg_count: 1 },
    NativeFunction { id: 0x0004, name: "MSG_WND_OPEN", arg_count: 0 },
    NativeFunction { id: 0x0005, name: "MSG_WND_CLOSE", arg_count: 0 },
    NativeFunction { id: 0x0008, name: "GET_RESULT", arg_count: 0 },
    NativeFunction { id: 0x000B, name: "FADE_IN", arg_count: 1 },
    NativeFunction { id: 0x000C, name: "FADE_OUT", arg_count: 1 },
    NativeFunction { id: 0x0011, name: "RND", arg_count: 1 },
    NativeFunction { id: 0x0036, name: "GET_MONEY", arg_count: 0 },
    NativeFunction { id: 0x0037, name: "SET_MONEY", arg_count: 1 },
];

pub fn native_by_id(id: u16) -> Option<&'static NativeFunction> {
    NATIVE_FUNCTIONS.iter().find(|n| n.id == id)
}

pub fn native_by_name(name: &str) -> Option<&'static NativeFunction> {
    NATIVE_FUNCTIONS.iter().find(|n| n.name == name)
}
