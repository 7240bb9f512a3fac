use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

// =============================================================================
// OP - Bytecode instructions
// =============================================================================

/// A single VM instruction: an opcode tag plus its fixed-arity parameters.
///
/// Jump targets are absolute indices into the enclosing instruction set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum Op {
    // literals
    PushInt(i64),
    PushString(String),
    PushTrue,
    PushFalse,
    PushNull,

    /// Push the current frame's `self`.
    PushSelf,

    // locals
    /// Walk `depth` lexical parent frames, then push the named local.
    GetLocal { depth: usize, name: String },

    /// Walk `depth` lexical parent frames, then bind the named local to the
    /// stack top. The value stays on the stack.
    SetLocal { depth: usize, name: String },

    // constants
    GetConstant(String),
    SetConstant(String),

    // instance variables
    GetInstanceVariable(String),
    SetInstanceVariable(String),

    // stack ops
    Pop,
    Dup,

    // control flow
    /// Pop; if the value is falsy, set PC to the target.
    BranchIfFalse(usize),
    Jump(usize),

    // dispatch
    /// Invoke `method` on a receiver with `argc` arguments. `block` carries
    /// the id of a `<Block:id>` instruction set when the call site passes one.
    Send {
        method: String,
        argc: usize,
        block: Option<String>,
    },

    /// Invoke the current frame's bound block (`yield`).
    InvokeBlock(usize),

    // definitions
    /// Consume the next pending `Def:name` instruction set and register it
    /// on the enclosing class (or Object at the top level).
    DefMethod(String),

    /// Consume the next pending `DefClass:name` instruction set, materialize
    /// the class and run its body. With `has_super`, the superclass is
    /// popped from the stack.
    DefClass { name: String, has_super: bool },

    /// Terminate the current call frame; the stack top becomes the caller's
    /// result.
    Leave,
}
