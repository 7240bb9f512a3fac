use crate::bytecode::Op;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

/// What a labeled instruction set is for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Archive,
    RkyvSerialize,
    RkyvDeserialize,
)]
#[archive(check_bytes)]
#[archive_attr(derive(PartialEq, Eq, Hash))]
pub enum LabelKind {
    /// The program entry point, `<ProgramStart>`.
    Program,
    /// A method body, `<Def:name>`.
    Def,
    /// A class body, `<DefClass:name>`.
    DefClass,
    /// A block body, `<Block:id>`.
    Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct Label {
    pub kind: LabelKind,
    pub name: String,
}

impl Label {
    pub fn new(kind: LabelKind, name: impl Into<String>) -> Self {
        Label {
            kind,
            name: name.into(),
        }
    }

    pub fn program_start() -> Self {
        Label::new(LabelKind::Program, "ProgramStart")
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            LabelKind::Program => write!(f, "ProgramStart"),
            LabelKind::Def => write!(f, "Def:{}", self.name),
            LabelKind::DefClass => write!(f, "DefClass:{}", self.name),
            LabelKind::Block => write!(f, "Block:{}", self.name),
        }
    }
}

/// A labeled, ordered sequence of instructions forming one callable unit:
/// a method body, class body, block, or the program entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct InstructionSet {
    pub label: Label,

    /// Parameter names, in declaration order. Empty for class bodies and
    /// the program entry.
    pub params: Vec<String>,

    pub instructions: Vec<Op>,
}

impl InstructionSet {
    pub fn new(label: Label) -> Self {
        InstructionSet {
            label,
            params: Vec::new(),
            instructions: Vec::new(),
        }
    }
}

/// A compiled program bundle: every instruction set the compiler emitted,
/// in registration order. `sets` keeps duplicates (method redefinitions)
/// in the order they appeared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct Program {
    pub sets: Vec<InstructionSet>,
}

impl Program {
    pub fn new() -> Self {
        Program { sets: Vec::new() }
    }
}

impl Default for Program {
    fn default() -> Self {
        Program::new()
    }
}
