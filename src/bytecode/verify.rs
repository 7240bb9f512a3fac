use crate::bytecode::ir::{LabelKind, Program};
use crate::bytecode::op::Op;
use std::collections::HashSet;

/// Error produced by the pre-execution bundle check.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyError {
    pub label: String,
    pub message: String,
}

impl VerifyError {
    fn new(label: impl Into<String>, message: impl Into<String>) -> Self {
        VerifyError {
            label: label.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "verify error: <{}>: {}", self.label, self.message)
    }
}

impl std::error::Error for VerifyError {}

/// Statically check a program bundle before execution.
///
/// Rejects bundles the evaluator could only fail on at runtime: a missing
/// or duplicated entry point, jumps outside their instruction set, sets
/// that run off the end without `leave`, and references to labels that
/// were never registered.
pub fn check_program(program: &Program) -> Result<(), VerifyError> {
    let starts = program
        .sets
        .iter()
        .filter(|s| s.label.kind == LabelKind::Program)
        .count();
    if starts == 0 {
        return Err(VerifyError::new("ProgramStart", "no entry point"));
    }
    if starts > 1 {
        return Err(VerifyError::new("ProgramStart", "duplicate entry point"));
    }

    let mut defs: HashSet<&str> = HashSet::new();
    let mut classes: HashSet<&str> = HashSet::new();
    let mut blocks: HashSet<&str> = HashSet::new();
    for set in &program.sets {
        match set.label.kind {
            LabelKind::Def => {
                defs.insert(&set.label.name);
            }
            LabelKind::DefClass => {
                classes.insert(&set.label.name);
            }
            LabelKind::Block => {
                blocks.insert(&set.label.name);
            }
            LabelKind::Program => {}
        }
    }

    for set in &program.sets {
        let label = set.label.to_string();
        let len = set.instructions.len();

        if len == 0 {
            return Err(VerifyError::new(label, "empty instruction set"));
        }
        if set.instructions[len - 1] != Op::Leave {
            return Err(VerifyError::new(label, "does not end with leave"));
        }

        for (pc, op) in set.instructions.iter().enumerate() {
            match op {
                Op::Jump(target) | Op::BranchIfFalse(target) => {
                    if *target >= len {
                        return Err(VerifyError::new(
                            label,
                            format!("jump at pc {} targets {} (set has {} instructions)", pc, target, len),
                        ));
                    }
                }
                Op::Send {
                    block: Some(id), ..
                } => {
                    if !blocks.contains(id.as_str()) {
                        return Err(VerifyError::new(
                            label,
                            format!("send at pc {} references missing <Block:{}>", pc, id),
                        ));
                    }
                }
                Op::DefMethod(name) => {
                    if !defs.contains(name.as_str()) {
                        return Err(VerifyError::new(
                            label,
                            format!("def_method at pc {} references missing <Def:{}>", pc, name),
                        ));
                    }
                }
                Op::DefClass { name, .. } => {
                    if !classes.contains(name.as_str()) {
                        return Err(VerifyError::new(
                            label,
                            format!(
                                "def_class at pc {} references missing <DefClass:{}>",
                                pc, name
                            ),
                        ));
                    }
                }
                _ => {}
            }
        }
    }

    Ok(())
}
