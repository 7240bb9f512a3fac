use crate::bytecode::{InstructionSet, LabelKind, Program};
use std::collections::HashMap;
use std::rc::Rc;

/// The label registry: every instruction set the compiler emitted, grouped
/// by (kind, name) in registration order, plus per-kind fetch cursors.
///
/// `def_method` and `def_class` consume the next unfetched set for their
/// name, so redefinitions materialize in program order. Block lookups are
/// by exact id and always take the single registered set.
#[derive(Debug, Default)]
pub struct Registry {
    labels: HashMap<LabelKind, HashMap<String, Vec<Rc<InstructionSet>>>>,
    method_cursors: HashMap<String, usize>,
    class_cursors: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn from_program(program: &Program) -> Self {
        let mut registry = Registry::new();
        for set in &program.sets {
            registry
                .labels
                .entry(set.label.kind)
                .or_default()
                .entry(set.label.name.clone())
                .or_default()
                .push(Rc::new(set.clone()));
        }
        registry
    }

    pub fn program_start(&self) -> Option<Rc<InstructionSet>> {
        self.labels
            .get(&LabelKind::Program)?
            .get("ProgramStart")?
            .first()
            .cloned()
    }

    /// The next unconsumed `Def:name` set, advancing the cursor.
    pub fn fetch_method(&mut self, name: &str) -> Option<Rc<InstructionSet>> {
        let sets = self.labels.get(&LabelKind::Def)?.get(name)?;
        let cursor = self.method_cursors.entry(name.to_string()).or_insert(0);
        let set = sets.get(*cursor)?.clone();
        *cursor += 1;
        Some(set)
    }

    /// The next unconsumed `DefClass:name` set, advancing the cursor.
    pub fn fetch_class(&mut self, name: &str) -> Option<Rc<InstructionSet>> {
        let sets = self.labels.get(&LabelKind::DefClass)?.get(name)?;
        let cursor = self.class_cursors.entry(name.to_string()).or_insert(0);
        let set = sets.get(*cursor)?.clone();
        *cursor += 1;
        Some(set)
    }

    pub fn block(&self, id: &str) -> Option<Rc<InstructionSet>> {
        self.labels
            .get(&LabelKind::Block)?
            .get(id)?
            .first()
            .cloned()
    }
}
