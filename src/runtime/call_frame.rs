use crate::bytecode::InstructionSet;
use crate::lang::value::Pointer;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// What `leave` does for this frame beyond popping it.
#[derive(Debug, Clone)]
pub enum FrameMode {
    /// The callee's stack top is the caller's result.
    Normal,

    /// Class body: discard the body's result and push the class.
    ClassBody { class: Pointer },

    /// `initialize` call: discard its result and push the new instance.
    Initializer { instance: Pointer },
}

/// The per-invocation execution record: current instruction set, PC,
/// locals, `self`, the caller-provided block, and the lexical parent frame
/// (set for blocks only).
pub struct CallFrame {
    pub is: Rc<InstructionSet>,
    pub pc: usize,
    pub locals: HashMap<String, Pointer>,
    pub self_ptr: Pointer,
    pub block: Option<Pointer>,
    pub parent: Option<Rc<RefCell<CallFrame>>>,
    pub mode: FrameMode,
}

impl CallFrame {
    pub fn new(is: Rc<InstructionSet>, self_ptr: Pointer) -> Self {
        CallFrame {
            is,
            pc: 0,
            locals: HashMap::new(),
            self_ptr,
            block: None,
            parent: None,
            mode: FrameMode::Normal,
        }
    }

    /// Bind arguments positionally under the instruction set's parameter
    /// names. The caller checks arity first.
    pub fn with_args(mut self, args: Vec<Pointer>) -> Self {
        for (name, arg) in self.is.params.iter().zip(args) {
            self.locals.insert(name.clone(), arg);
        }
        self
    }

    pub fn with_block(mut self, block: Option<Pointer>) -> Self {
        self.block = block;
        self
    }

    pub fn with_parent(mut self, parent: Rc<RefCell<CallFrame>>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_mode(mut self, mode: FrameMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn label(&self) -> String {
        self.is.label.to_string()
    }
}

impl std::fmt::Debug for CallFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CallFrame(<{}> pc {})", self.is.label, self.pc)
    }
}

/// Walk `depth` lexical parent links starting from `frame`.
pub fn frame_at_depth(
    frame: &Rc<RefCell<CallFrame>>,
    depth: usize,
) -> Option<Rc<RefCell<CallFrame>>> {
    let mut current = Rc::clone(frame);
    for _ in 0..depth {
        let parent = current.borrow().parent.clone();
        current = parent?;
    }
    Some(current)
}

/// The first block bound on the frame or one of its lexical parents.
///
/// `yield` inside a block refers to the block of the method the block was
/// written in, which is always reachable through the parent chain.
pub fn bound_block(frame: &Rc<RefCell<CallFrame>>) -> Option<Pointer> {
    let mut current = Some(Rc::clone(frame));
    while let Some(f) = current {
        if let Some(block) = f.borrow().block.clone() {
            return Some(block);
        }
        let next = f.borrow().parent.clone();
        current = next;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{InstructionSet, Label, LabelKind};
    use crate::lang::value::{pointer, Value};

    fn dummy_is(kind: LabelKind, name: &str) -> Rc<InstructionSet> {
        Rc::new(InstructionSet::new(Label::new(kind, name)))
    }

    #[test]
    fn test_frame_at_depth_walks_parents() {
        let outer = Rc::new(RefCell::new(CallFrame::new(
            dummy_is(LabelKind::Program, "ProgramStart"),
            pointer(Value::Null),
        )));
        let inner = Rc::new(RefCell::new(
            CallFrame::new(dummy_is(LabelKind::Block, "0"), pointer(Value::Null))
                .with_parent(outer.clone()),
        ));

        let found = frame_at_depth(&inner, 1).expect("parent should exist");
        assert!(Rc::ptr_eq(&found, &outer));
        assert!(frame_at_depth(&inner, 2).is_none());
    }

    #[test]
    fn test_frame_at_depth_zero_is_identity() {
        let frame = Rc::new(RefCell::new(CallFrame::new(
            dummy_is(LabelKind::Def, "f"),
            pointer(Value::Null),
        )));
        let found = frame_at_depth(&frame, 0).expect("depth 0 always resolves");
        assert!(Rc::ptr_eq(&found, &frame));
    }

    #[test]
    fn test_bound_block_searches_parent_chain() {
        let block_ptr = pointer(Value::Null);
        let method = Rc::new(RefCell::new(
            CallFrame::new(dummy_is(LabelKind::Def, "f"), pointer(Value::Null))
                .with_block(Some(block_ptr.clone())),
        ));
        let inner = Rc::new(RefCell::new(
            CallFrame::new(dummy_is(LabelKind::Block, "0"), pointer(Value::Null))
                .with_parent(method.clone()),
        ));

        let found = bound_block(&inner).expect("block should be found");
        assert!(Rc::ptr_eq(&found, &block_ptr));
        assert!(bound_block(&Rc::new(RefCell::new(CallFrame::new(
            dummy_is(LabelKind::Def, "g"),
            pointer(Value::Null),
        ))))
        .is_none());
    }
}
