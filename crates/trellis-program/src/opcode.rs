//! Opcode definitions and header-word encoding
//!
//! Instructions are encoded as a header word followed by 0-3 operand words.
//! The header packs the opcode tag, the machine flag (frame/jump/return
//! primitives the VM core dispatches directly), and the operand count:
//!
//! ```text
//! bits 0..=9   opcode tag
//! bit  10      machine flag
//! bits 11..=12 operand count
//! ```
//!
//! Words are 16-bit aligned but stored as `i32` so the `-1` placeholder
//! sentinel used for deferred operands is representable.

use serde::{Deserialize, Serialize};

/// Sentinel written where a word's true value is not yet known.
pub const PLACEHOLDER_WORD: i32 = -1;

pub const OPCODE_MASK: i32 = 0b0000_0011_1111_1111;
pub const MACHINE_MASK: i32 = 0b0000_0100_0000_0000;
pub const ARITY_SHIFT: u32 = 11;

macro_rules! opcodes {
    ($( $op:ident = $code:literal [machine: $machine:literal, arity: $arity:literal] ),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u16)]
        pub enum Op {
            $( $op = $code, )*
        }

        impl Op {
            pub fn name(self) -> &'static str {
                match self {
                    $( Op::$op => stringify!($op), )*
                }
            }

            /// Number of operand words following the header.
            pub fn arity(self) -> u8 {
                match self {
                    $( Op::$op => $arity, )*
                }
            }

            /// Machine opcodes are dispatched by the VM core loop rather
            /// than the syscall table.
            pub fn is_machine(self) -> bool {
                match self {
                    $( Op::$op => $machine, )*
                }
            }

            pub fn from_u16(raw: u16) -> Option<Op> {
                match raw {
                    $( $code => Some(Op::$op), )*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    // Machine opcodes
    PushFrame = 0 [machine: true, arity: 0],
    PopFrame = 1 [machine: true, arity: 0],
    InvokeVirtual = 2 [machine: true, arity: 0],
    InvokeStatic = 3 [machine: true, arity: 1],
    Jump = 4 [machine: true, arity: 1],
    Return = 5 [machine: true, arity: 0],
    ReturnTo = 6 [machine: true, arity: 1],

    // Expressions
    Helper = 16 [machine: false, arity: 1],
    GetVariable = 17 [machine: false, arity: 1],
    SetVariable = 18 [machine: false, arity: 1],
    SetBlock = 19 [machine: false, arity: 1],
    GetProperty = 20 [machine: false, arity: 1],
    GetBlock = 21 [machine: false, arity: 1],
    HasBlock = 22 [machine: false, arity: 1],
    HasBlockParams = 23 [machine: false, arity: 1],
    Concat = 24 [machine: false, arity: 1],
    Constant = 25 [machine: false, arity: 1],
    Primitive = 26 [machine: false, arity: 1],
    PrimitiveReference = 27 [machine: false, arity: 0],
    ReifyU32 = 28 [machine: false, arity: 0],
    Dup = 29 [machine: false, arity: 0],
    Pop = 30 [machine: false, arity: 1],
    Load = 31 [machine: false, arity: 1],
    Fetch = 32 [machine: false, arity: 1],
    ResolveMaybeLocal = 33 [machine: false, arity: 1],

    // Scopes
    RootScope = 34 [machine: false, arity: 1],
    ChildScope = 35 [machine: false, arity: 0],
    PopScope = 36 [machine: false, arity: 0],
    BindDynamicScope = 37 [machine: false, arity: 1],
    PushDynamicScope = 38 [machine: false, arity: 0],
    PopDynamicScope = 39 [machine: false, arity: 0],

    // Content
    Text = 40 [machine: false, arity: 1],
    Comment = 41 [machine: false, arity: 1],
    AppendHTML = 42 [machine: false, arity: 0],
    AppendSafeHTML = 43 [machine: false, arity: 0],
    AppendDocumentFragment = 44 [machine: false, arity: 0],
    AppendNode = 45 [machine: false, arity: 0],
    AppendText = 46 [machine: false, arity: 0],
    ContentType = 47 [machine: false, arity: 0],

    // Elements
    OpenElement = 48 [machine: false, arity: 1],
    OpenDynamicElement = 49 [machine: false, arity: 0],
    FlushElement = 50 [machine: false, arity: 0],
    CloseElement = 51 [machine: false, arity: 0],
    StaticAttr = 52 [machine: false, arity: 3],
    DynamicAttr = 53 [machine: false, arity: 3],
    Modifier = 54 [machine: false, arity: 1],

    // Control flow
    JumpIf = 55 [machine: false, arity: 1],
    JumpUnless = 56 [machine: false, arity: 1],
    JumpEq = 57 [machine: false, arity: 2],
    AssertSame = 58 [machine: false, arity: 0],
    Enter = 59 [machine: false, arity: 1],
    Exit = 60 [machine: false, arity: 0],
    ToBoolean = 61 [machine: false, arity: 0],

    // Blocks
    CompileBlock = 62 [machine: false, arity: 0],
    PushBlockScope = 63 [machine: false, arity: 0],
    PushSymbolTable = 64 [machine: false, arity: 1],
    InvokeYield = 65 [machine: false, arity: 0],

    // Arguments
    PushArgs = 66 [machine: false, arity: 2],
    PushEmptyArgs = 67 [machine: false, arity: 0],
    PrepareArgs = 68 [machine: false, arity: 0],
    CaptureArgs = 69 [machine: false, arity: 0],

    // Components
    Main = 70 [machine: false, arity: 0],
    PushComponentDefinition = 71 [machine: false, arity: 1],
    PushDynamicComponentInstance = 72 [machine: false, arity: 0],
    ResolveDynamicComponent = 73 [machine: false, arity: 1],
    PushCurriedComponent = 74 [machine: false, arity: 0],
    CreateComponent = 75 [machine: false, arity: 1],
    RegisterComponentDestructor = 76 [machine: false, arity: 0],
    PutComponentOperations = 77 [machine: false, arity: 0],
    GetComponentSelf = 78 [machine: false, arity: 0],
    GetComponentLayout = 79 [machine: false, arity: 0],
    PopulateLayout = 80 [machine: false, arity: 0],
    InvokeComponentLayout = 81 [machine: false, arity: 0],
    BeginComponentTransaction = 82 [machine: false, arity: 0],
    CommitComponentTransaction = 83 [machine: false, arity: 0],
    DidCreateElement = 84 [machine: false, arity: 0],
    DidRenderLayout = 85 [machine: false, arity: 0],

    // Partials and debugging
    InvokePartial = 86 [machine: false, arity: 3],
    Debugger = 87 [machine: false, arity: 2],

    // Iteration
    PutIterator = 88 [machine: false, arity: 0],
    EnterList = 89 [machine: false, arity: 1],
    ExitList = 90 [machine: false, arity: 0],
    Iterate = 91 [machine: false, arity: 1],
}

pub fn pack_header(op: Op) -> i32 {
    (op as i32 & OPCODE_MASK)
        | if op.is_machine() { MACHINE_MASK } else { 0 }
        | ((op.arity() as i32) << ARITY_SHIFT)
}

/// Decodes a header word. Returns the opcode plus the machine flag and
/// operand count as encoded; the caller may cross-check them against the
/// opcode metadata.
pub fn unpack_header(word: i32) -> Option<(Op, bool, u8)> {
    let op = Op::from_u16((word & OPCODE_MASK) as u16)?;
    let machine = word & MACHINE_MASK != 0;
    let arity = ((word >> ARITY_SHIFT) & 0b11) as u8;
    Some((op, machine, arity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        for op in [Op::PushFrame, Op::Helper, Op::StaticAttr, Op::JumpEq, Op::Debugger] {
            let word = pack_header(op);
            let (decoded, machine, arity) = unpack_header(word).unwrap();
            assert_eq!(decoded, op);
            assert_eq!(machine, op.is_machine());
            assert_eq!(arity, op.arity());
        }
    }

    #[test]
    fn test_machine_split() {
        assert!(Op::Jump.is_machine());
        assert!(Op::InvokeStatic.is_machine());
        assert!(!Op::Helper.is_machine());
        assert!(!Op::Text.is_machine());
    }

    #[test]
    fn test_unknown_opcode_rejected() {
        assert!(unpack_header(0b11_1111_1111).is_none());
    }

    #[test]
    fn test_placeholder_is_not_a_valid_header() {
        // -1 has all opcode bits set; it must never decode as an opcode.
        assert!(unpack_header(PLACEHOLDER_WORD).is_none());
    }
}
