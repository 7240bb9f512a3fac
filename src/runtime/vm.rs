use crate::bytecode::{disasm, verify, Op, Program};
use crate::lang::object::{
    resolve_class_method, resolve_method, Block, ClassObj, ErrorObj, Instance, Method, MethodBody,
};
use crate::lang::value::{pointer, Pointer, Value};
use crate::runtime::builtins::{self, Builtins};
use crate::runtime::call_frame::{bound_block, frame_at_depth, CallFrame, FrameMode};
use crate::runtime::registry::Registry;
use crate::runtime::runtime_error::{self as fault, VmFault};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_call_depth: usize,
    pub max_steps: Option<usize>,
    pub max_stack_size: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 1000,
            max_steps: None,
            max_stack_size: 10_000,
        }
    }
}

/// The virtual machine: one operand stack, one call-frame stack, the
/// process-wide constants map, and the label registry. Strictly
/// single-threaded; execution order is program order.
pub struct Vm {
    stack: Vec<Pointer>,
    frames: Vec<Rc<RefCell<CallFrame>>>,
    constants: HashMap<String, Pointer>,
    registry: Registry,
    builtins: Builtins,
    config: VmConfig,
    steps: usize,
    trace: bool,
    captured: Option<Vec<String>>,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let builtins = builtins::init();
        let mut vm = Vm {
            stack: Vec::new(),
            frames: Vec::new(),
            constants: HashMap::new(),
            registry: Registry::new(),
            builtins,
            config,
            steps: 0,
            trace: false,
            captured: None,
        };
        vm.reset_constants();
        vm
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Collect `puts` output instead of writing to stdout.
    #[allow(dead_code)]
    pub fn capture_output(&mut self) {
        self.captured = Some(Vec::new());
    }

    #[allow(dead_code)]
    pub fn captured_output(&self) -> &[String] {
        self.captured.as_deref().unwrap_or(&[])
    }

    #[allow(dead_code)]
    pub fn stack(&self) -> &[Pointer] {
        &self.stack
    }

    #[allow(dead_code)]
    pub fn sp(&self) -> usize {
        self.stack.len()
    }

    fn reset_constants(&mut self) {
        self.constants = self.builtins.constants().into_iter().collect();
    }

    /// Run a program bundle from its `ProgramStart` frame and return the
    /// final stack top. The stack is left in place for inspection.
    pub fn exec(&mut self, program: &Program) -> Result<Pointer, VmFault> {
        verify::check_program(program).map_err(|e| fault::malformed(e.to_string()))?;

        self.stack.clear();
        self.frames.clear();
        self.steps = 0;
        self.reset_constants();
        self.registry = Registry::from_program(program);

        let start = self
            .registry
            .program_start()
            .ok_or_else(|| fault::missing_label("ProgramStart", ""))?;

        // Top-level self: an anonymous instance of Object.
        let main = Rc::new(RefCell::new(Instance::new(self.builtins.object.clone())));
        let main_ptr = pointer(Value::Instance(main));
        self.frames
            .push(Rc::new(RefCell::new(CallFrame::new(start, main_ptr))));

        while !self.frames.is_empty() {
            self.step()?;
        }

        Ok(self
            .stack
            .last()
            .cloned()
            .unwrap_or_else(|| pointer(Value::Null)))
    }

    fn step(&mut self) -> Result<(), VmFault> {
        self.check_limits()?;

        let frame = self
            .frames
            .last()
            .cloned()
            .ok_or_else(|| fault::malformed("step with no active frame"))?;

        let (op, pc, label) = {
            let f = frame.borrow();
            let pc = f.pc;
            if pc >= f.is.instructions.len() {
                return Err(
                    fault::malformed("instruction set ended without leave").at(&f.label(), pc)
                );
            }
            (f.is.instructions[pc].clone(), pc, f.label())
        };
        frame.borrow_mut().pc = pc + 1;

        if self.trace {
            eprintln!("{:>4}  {:<28} {}", pc, disasm::format_op(&op), self.inspect_stack());
        }

        self.exec_op(&frame, op).map_err(|e| e.at(&label, pc))
    }

    fn check_limits(&mut self) -> Result<(), VmFault> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(fault::step_limit(max));
            }
        }
        if self.stack.len() > self.config.max_stack_size {
            return Err(fault::stack_limit(self.config.max_stack_size));
        }
        if self.frames.len() > self.config.max_call_depth {
            return Err(fault::depth_limit(self.config.max_call_depth));
        }

        Ok(())
    }

    fn exec_op(&mut self, frame: &Rc<RefCell<CallFrame>>, op: Op) -> Result<(), VmFault> {
        match op {
            Op::PushInt(n) => self.push(Value::Integer(n)),
            Op::PushString(s) => self.push(Value::Str(s)),
            Op::PushTrue => self.push(Value::Boolean(true)),
            Op::PushFalse => self.push(Value::Boolean(false)),
            Op::PushNull => self.push(Value::Null),
            Op::PushSelf => {
                let self_ptr = frame.borrow().self_ptr.clone();
                self.push_ptr(self_ptr);
            }

            Op::GetLocal { depth, name } => self.exec_get_local(frame, depth, &name),
            Op::SetLocal { depth, name } => self.exec_set_local(frame, depth, &name)?,

            Op::GetConstant(name) => {
                let constant = self.constants.get(&name).cloned();
                match constant {
                    Some(p) => self.push_ptr(p),
                    None => self.push(ErrorObj::uninitialized_constant(&name).into_value()),
                }
            }
            Op::SetConstant(name) => {
                let top = self.peek()?;
                self.constants.insert(name, top);
            }

            Op::GetInstanceVariable(name) => self.exec_get_ivar(frame, &name),
            Op::SetInstanceVariable(name) => self.exec_set_ivar(frame, &name)?,

            Op::Pop => {
                self.pop_ptr()?;
            }
            Op::Dup => {
                let top = self.peek()?;
                self.push_ptr(top);
            }

            Op::BranchIfFalse(target) => {
                let cond = self.pop_ptr()?;
                let falsy = !cond.borrow().is_truthy();
                if falsy {
                    self.set_pc(frame, target)?;
                }
            }
            Op::Jump(target) => self.set_pc(frame, target)?,

            Op::Send {
                method,
                argc,
                block,
            } => self.exec_send(frame, &method, argc, block.as_deref())?,
            Op::InvokeBlock(argc) => self.exec_invoke_block(frame, argc)?,

            Op::DefMethod(name) => self.exec_def_method(frame, &name)?,
            Op::DefClass { name, has_super } => self.exec_def_class(&name, has_super)?,

            Op::Leave => self.exec_leave()?,
        }
        Ok(())
    }

    // ── locals, constants, ivars ────────────────────────────────────

    fn exec_get_local(&mut self, frame: &Rc<RefCell<CallFrame>>, depth: usize, name: &str) {
        match frame_at_depth(frame, depth) {
            Some(target) => {
                let local = target.borrow().locals.get(name).cloned();
                match local {
                    Some(p) => self.push_ptr(p),
                    None if depth == 0 => self.push(Value::Null),
                    None => self.push(ErrorObj::undefined_local(name, depth).into_value()),
                }
            }
            None => self.push(ErrorObj::undefined_local(name, depth).into_value()),
        }
    }

    fn exec_set_local(
        &mut self,
        frame: &Rc<RefCell<CallFrame>>,
        depth: usize,
        name: &str,
    ) -> Result<(), VmFault> {
        let top = self.peek()?;
        match frame_at_depth(frame, depth) {
            Some(target) => {
                target.borrow_mut().locals.insert(name.to_string(), top);
            }
            None => {
                self.pop_ptr()?;
                self.push(ErrorObj::undefined_local(name, depth).into_value());
            }
        }
        Ok(())
    }

    fn exec_get_ivar(&mut self, frame: &Rc<RefCell<CallFrame>>, name: &str) {
        let self_ptr = frame.borrow().self_ptr.clone();
        let value = match &*self_ptr.borrow() {
            Value::Instance(instance) => instance.borrow().ivars.get(name).cloned(),
            Value::Class(class) => class.borrow().ivars.get(name).cloned(),
            _ => None,
        };
        match value {
            Some(p) => self.push_ptr(p),
            None => self.push(Value::Null),
        }
    }

    fn exec_set_ivar(&mut self, frame: &Rc<RefCell<CallFrame>>, name: &str) -> Result<(), VmFault> {
        let top = self.peek()?;
        let self_ptr = frame.borrow().self_ptr.clone();
        let stored = match &*self_ptr.borrow() {
            Value::Instance(instance) => {
                instance.borrow_mut().ivars.insert(name.to_string(), top);
                true
            }
            Value::Class(class) => {
                class.borrow_mut().ivars.insert(name.to_string(), top);
                true
            }
            _ => false,
        };
        if !stored {
            self.pop_ptr()?;
            let class_name = self_ptr.borrow().class_name();
            self.push(
                ErrorObj::type_error(format!(
                    "cannot set instance variable {} on {}",
                    name, class_name
                ))
                .into_value(),
            );
        }
        Ok(())
    }

    fn set_pc(&mut self, frame: &Rc<RefCell<CallFrame>>, target: usize) -> Result<(), VmFault> {
        let len = frame.borrow().is.instructions.len();
        if target >= len {
            return Err(fault::jump_out_of_bounds(target, len));
        }
        frame.borrow_mut().pc = target;
        Ok(())
    }

    // ── dispatch ────────────────────────────────────────────────────

    fn exec_send(
        &mut self,
        frame: &Rc<RefCell<CallFrame>>,
        method: &str,
        argc: usize,
        block_id: Option<&str>,
    ) -> Result<(), VmFault> {
        // The block closes over the sending frame: that frame is its
        // lexical parent when it later runs.
        let block_ptr = match block_id {
            Some(id) => {
                let is = self
                    .registry
                    .block(id)
                    .ok_or_else(|| fault::missing_label("Block", id))?;
                Some(pointer(Value::Block(Block {
                    is,
                    frame: frame.clone(),
                })))
            }
            None => None,
        };

        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.pop_ptr()?);
        }
        args.reverse();
        let receiver = self.pop_ptr()?;

        let receiver_value = receiver.borrow().clone();
        match receiver_value {
            // The first failure in a chain stays observable at the end.
            Value::Error(e) => {
                self.push(Value::Error(e));
                Ok(())
            }
            Value::Class(class) if method == "new" => self.exec_new(&class, args, block_ptr),
            Value::Class(class) => {
                let resolved = resolve_class_method(&class, method)
                    .or_else(|| resolve_method(&self.builtins.class, method));
                match resolved {
                    Some((m, _owner)) => self.invoke_method(m, receiver, args, block_ptr),
                    None => {
                        let name = class.borrow().name.clone();
                        self.push(ErrorObj::no_method(&name, method).into_value());
                        Ok(())
                    }
                }
            }
            other => {
                let class = self.class_of(&other);
                match resolve_method(&class, method) {
                    Some((m, _owner)) => self.invoke_method(m, receiver, args, block_ptr),
                    None => {
                        self.push(ErrorObj::no_method(&other.class_name(), method).into_value());
                        Ok(())
                    }
                }
            }
        }
    }

    fn invoke_method(
        &mut self,
        method: Method,
        receiver: Pointer,
        args: Vec<Pointer>,
        block_ptr: Option<Pointer>,
    ) -> Result<(), VmFault> {
        match method.body {
            MethodBody::Native(f) => {
                let block = block_ptr.as_ref().and_then(|p| match &*p.borrow() {
                    Value::Block(b) => Some(b.clone()),
                    _ => None,
                });
                let result = f(self, receiver, args, block)?;
                self.push(result);
                Ok(())
            }
            MethodBody::Compiled(is) => {
                if is.params.len() != args.len() {
                    self.push(ErrorObj::argument_error(is.params.len(), args.len()).into_value());
                    return Ok(());
                }
                // Method frames do not close over caller locals: no parent.
                let callee = CallFrame::new(is, receiver)
                    .with_args(args)
                    .with_block(block_ptr);
                self.frames.push(Rc::new(RefCell::new(callee)));
                Ok(())
            }
        }
    }

    /// `Class#new`. Collection classes produce native values (the upstream
    /// compiler lowers literals to `new` plus element sends); user classes
    /// produce an instance and run `initialize` when defined.
    fn exec_new(
        &mut self,
        class: &Rc<RefCell<ClassObj>>,
        args: Vec<Pointer>,
        block_ptr: Option<Pointer>,
    ) -> Result<(), VmFault> {
        if Rc::ptr_eq(class, &self.builtins.array) {
            self.push(Value::array(args));
            return Ok(());
        }

        if Rc::ptr_eq(class, &self.builtins.hash) {
            if args.len() % 2 != 0 {
                self.push(ErrorObj::type_error("odd number of arguments for Hash").into_value());
                return Ok(());
            }
            let mut entries = HashMap::new();
            for pair in args.chunks(2) {
                let key = match &*pair[0].borrow() {
                    Value::Str(s) => s.clone(),
                    other => {
                        self.push(
                            ErrorObj::type_error(format!(
                                "hash key must be a String, got {}",
                                other.class_name()
                            ))
                            .into_value(),
                        );
                        return Ok(());
                    }
                };
                entries.insert(key, pair[1].clone());
            }
            self.push(Value::hash(entries));
            return Ok(());
        }

        if Rc::ptr_eq(class, &self.builtins.string) {
            let s = match args.first() {
                None => String::new(),
                Some(p) => match &*p.borrow() {
                    Value::Str(s) => s.clone(),
                    other => {
                        self.push(
                            ErrorObj::type_error(format!(
                                "String.new expects a String, got {}",
                                other.class_name()
                            ))
                            .into_value(),
                        );
                        return Ok(());
                    }
                },
            };
            self.push(Value::Str(s));
            return Ok(());
        }

        if Rc::ptr_eq(class, &self.builtins.integer)
            || Rc::ptr_eq(class, &self.builtins.boolean)
            || Rc::ptr_eq(class, &self.builtins.null)
        {
            let name = class.borrow().name.clone();
            self.push(ErrorObj::type_error(format!("cannot instantiate {}", name)).into_value());
            return Ok(());
        }

        let instance = Rc::new(RefCell::new(Instance::new(class.clone())));
        let instance_ptr = pointer(Value::Instance(instance));

        match resolve_method(class, "initialize") {
            Some((m, _owner)) => match m.body {
                MethodBody::Compiled(is) => {
                    if is.params.len() != args.len() {
                        self.push(
                            ErrorObj::argument_error(is.params.len(), args.len()).into_value(),
                        );
                        return Ok(());
                    }
                    let callee = CallFrame::new(is, instance_ptr.clone())
                        .with_args(args)
                        .with_block(block_ptr)
                        .with_mode(FrameMode::Initializer {
                            instance: instance_ptr,
                        });
                    self.frames.push(Rc::new(RefCell::new(callee)));
                    Ok(())
                }
                MethodBody::Native(_) => {
                    self.push_ptr(instance_ptr);
                    Ok(())
                }
            },
            None => {
                self.push_ptr(instance_ptr);
                Ok(())
            }
        }
    }

    fn exec_invoke_block(
        &mut self,
        frame: &Rc<RefCell<CallFrame>>,
        argc: usize,
    ) -> Result<(), VmFault> {
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.pop_ptr()?);
        }
        args.reverse();

        let block_ptr = match bound_block(frame) {
            Some(p) => p,
            None => {
                self.push(ErrorObj::no_block_given().into_value());
                return Ok(());
            }
        };
        let block = match &*block_ptr.borrow() {
            Value::Block(b) => b.clone(),
            _ => return Err(fault::malformed("frame block is not a Block")),
        };

        if block.is.params.len() != args.len() {
            self.push(ErrorObj::argument_error(block.is.params.len(), args.len()).into_value());
            return Ok(());
        }

        // Blocks run against their definition site: self comes from it
        // and the parent link points at it, not at the invoking frame.
        let self_ptr = block.frame.borrow().self_ptr.clone();
        let callee = CallFrame::new(block.is.clone(), self_ptr)
            .with_args(args)
            .with_parent(block.frame.clone());
        self.frames.push(Rc::new(RefCell::new(callee)));
        Ok(())
    }

    /// Run a block to completion and return its result. Used by native
    /// methods that yield (`Array#each`, `Hash#each`).
    pub(crate) fn call_block(
        &mut self,
        block: &Block,
        args: Vec<Pointer>,
    ) -> Result<Pointer, VmFault> {
        if block.is.params.len() != args.len() {
            return Ok(pointer(
                ErrorObj::argument_error(block.is.params.len(), args.len()).into_value(),
            ));
        }

        let self_ptr = block.frame.borrow().self_ptr.clone();
        let callee = CallFrame::new(block.is.clone(), self_ptr)
            .with_args(args)
            .with_parent(block.frame.clone());

        let depth = self.frames.len();
        self.frames.push(Rc::new(RefCell::new(callee)));
        while self.frames.len() > depth {
            self.step()?;
        }
        self.pop_ptr()
    }

    // ── definitions ─────────────────────────────────────────────────

    fn exec_def_method(
        &mut self,
        frame: &Rc<RefCell<CallFrame>>,
        name: &str,
    ) -> Result<(), VmFault> {
        let is = self
            .registry
            .fetch_method(name)
            .ok_or_else(|| fault::missing_label("Def", name))?;

        let self_ptr = frame.borrow().self_ptr.clone();
        let target = match &*self_ptr.borrow() {
            Value::Class(class) => class.clone(),
            _ => self.builtins.object.clone(),
        };
        let method = Method::compiled(name, is, &target);
        target
            .borrow_mut()
            .methods
            .insert(name.to_string(), Value::Method(method));

        self.push(Value::Null);
        Ok(())
    }

    fn exec_def_class(&mut self, name: &str, has_super: bool) -> Result<(), VmFault> {
        let is = self
            .registry
            .fetch_class(name)
            .ok_or_else(|| fault::missing_label("DefClass", name))?;

        let superclass = if has_super {
            let popped = self.pop_ptr()?;
            let class = match &*popped.borrow() {
                Value::Class(c) => Some(c.clone()),
                _ => None,
            };
            match class {
                Some(c) => c,
                None => {
                    let got = popped.borrow().class_name();
                    self.push(
                        ErrorObj::type_error(format!("superclass must be a Class, got {}", got))
                            .into_value(),
                    );
                    return Ok(());
                }
            }
        } else {
            self.builtins.object.clone()
        };

        let mut class = ClassObj::new(name, Some(superclass));
        class.is = Some(is.clone());
        let class_rc = Rc::new(RefCell::new(class));
        builtins::install_class_methods(&class_rc);
        let class_ptr = pointer(Value::Class(class_rc));
        self.constants.insert(name.to_string(), class_ptr.clone());

        let body = CallFrame::new(is, class_ptr.clone())
            .with_mode(FrameMode::ClassBody { class: class_ptr });
        self.frames.push(Rc::new(RefCell::new(body)));
        Ok(())
    }

    fn exec_leave(&mut self) -> Result<(), VmFault> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| fault::malformed("leave with no active frame"))?;

        let mode = frame.borrow().mode.clone();
        match mode {
            FrameMode::Normal => {}
            FrameMode::ClassBody { class } => {
                self.pop_ptr()?;
                self.push_ptr(class);
            }
            FrameMode::Initializer { instance } => {
                self.pop_ptr()?;
                self.push_ptr(instance);
            }
        }
        Ok(())
    }

    // ── stack and output ────────────────────────────────────────────

    pub(crate) fn class_of(&self, value: &Value) -> Rc<RefCell<ClassObj>> {
        match value {
            Value::Integer(_) => self.builtins.integer.clone(),
            Value::Str(_) => self.builtins.string.clone(),
            Value::Boolean(_) => self.builtins.boolean.clone(),
            Value::Null => self.builtins.null.clone(),
            Value::Array(_) => self.builtins.array.clone(),
            Value::Hash(_) => self.builtins.hash.clone(),
            Value::Class(_) => self.builtins.class.clone(),
            Value::Instance(instance) => instance.borrow().class.clone(),
            Value::Method(_) | Value::Block(_) | Value::Error(_) => self.builtins.object.clone(),
        }
    }

    fn push(&mut self, value: Value) {
        self.stack.push(pointer(value));
    }

    fn push_ptr(&mut self, p: Pointer) {
        self.stack.push(p);
    }

    fn pop_ptr(&mut self) -> Result<Pointer, VmFault> {
        self.stack.pop().ok_or_else(fault::stack_underflow)
    }

    fn peek(&self) -> Result<Pointer, VmFault> {
        self.stack.last().cloned().ok_or_else(fault::stack_underflow)
    }

    pub(crate) fn write_line(&mut self, line: String) {
        match &mut self.captured {
            Some(lines) => lines.push(line),
            None => println!("{}", line),
        }
    }

    /// Render the operand stack bottom-to-top, for `--trace` and fault
    /// diagnostics.
    pub fn inspect_stack(&self) -> String {
        let items: Vec<String> = self
            .stack
            .iter()
            .map(|p| format!("{}", p.borrow()))
            .collect();
        format!("[{}]", items.join(", "))
    }
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::parse::parse_program;
    use crate::lang::object::ErrorKind;

    fn run_vm(src: &str) -> (Vm, Pointer) {
        let program = parse_program(src).expect("program should parse");
        let mut vm = Vm::new();
        vm.capture_output();
        let result = vm.exec(&program).expect("execution should not fault");
        (vm, result)
    }

    fn run(src: &str) -> Value {
        let (_, result) = run_vm(src);
        let value = result.borrow().clone();
        value
    }

    fn run_fault(src: &str) -> VmFault {
        let program = parse_program(src).expect("program should parse");
        let mut vm = Vm::new();
        vm.capture_output();
        vm.exec(&program).expect_err("execution should fault")
    }

    fn error_kind(value: &Value) -> Option<ErrorKind> {
        match value {
            Value::Error(e) => Some(e.kind),
            _ => None,
        }
    }

    // ── literals and stack ops ──────────────────────────────────────

    #[test]
    fn test_push_literals() {
        assert_eq!(run("<ProgramStart>\npush_int 42\nleave\n"), Value::Integer(42));
        assert_eq!(
            run("<ProgramStart>\npush_string \"hi\"\nleave\n"),
            Value::Str("hi".to_string())
        );
        assert_eq!(run("<ProgramStart>\npush_true\nleave\n"), Value::Boolean(true));
        assert_eq!(run("<ProgramStart>\npush_null\nleave\n"), Value::Null);
    }

    #[test]
    fn test_pop_and_dup() {
        assert_eq!(
            run("<ProgramStart>\npush_int 1\npush_int 2\npop\nleave\n"),
            Value::Integer(1)
        );
        assert_eq!(
            run("<ProgramStart>\npush_int 1\ndup\nsend + 1\nleave\n"),
            Value::Integer(2)
        );
    }

    #[test]
    fn test_pop_on_empty_stack_is_fatal() {
        let fault = run_fault("<ProgramStart>\npop\nleave\n");
        assert!(fault.message.contains("underflow"));
        assert_eq!(fault.frame.as_deref(), Some("ProgramStart"));
        assert_eq!(fault.pc, Some(0));
    }

    // ── arithmetic through dispatch ─────────────────────────────────

    #[test]
    fn test_arithmetic_precedence_compiles_to_sends() {
        // 1 + 2 * 3
        let src = "<ProgramStart>\npush_int 1\npush_int 2\npush_int 3\nsend * 1\nsend + 1\nleave\n";
        assert_eq!(run(src), Value::Integer(7));
    }

    #[test]
    fn test_division_truncates_toward_zero() {
        assert_eq!(
            run("<ProgramStart>\npush_int 7\npush_int -2\nsend / 1\nleave\n"),
            Value::Integer(-3)
        );
        assert_eq!(
            run("<ProgramStart>\npush_int -7\npush_int 2\nsend / 1\nleave\n"),
            Value::Integer(-3)
        );
    }

    #[test]
    fn test_division_by_zero_is_an_error_value() {
        let value = run("<ProgramStart>\npush_int 1\npush_int 0\nsend / 1\nleave\n");
        assert_eq!(error_kind(&value), Some(ErrorKind::ZeroDivisionError));
    }

    #[test]
    fn test_integer_plus_string_is_type_error_and_vm_survives() {
        // 1 + "x", then more work on the same VM.
        let src = "<ProgramStart>\npush_int 1\npush_string \"x\"\nsend + 1\npush_int 5\nleave\n";
        let (vm, result) = run_vm(src);
        assert_eq!(*result.borrow(), Value::Integer(5));
        assert_eq!(vm.sp(), 2);
        assert_eq!(
            error_kind(&vm.stack()[0].borrow()),
            Some(ErrorKind::TypeError)
        );
    }

    #[test]
    fn test_error_receiver_propagates_through_chain() {
        // (1 + "x") + 2 keeps the original TypeError.
        let src = "<ProgramStart>\npush_int 1\npush_string \"x\"\nsend + 1\npush_int 2\nsend + 1\nleave\n";
        let value = run(src);
        assert_eq!(error_kind(&value), Some(ErrorKind::TypeError));
    }

    // ── control flow ────────────────────────────────────────────────

    #[test]
    fn test_branch_if_false_on_falsy_values() {
        // null is falsy: the branch takes the else arm.
        let src = "<ProgramStart>\npush_null\nbranch_if_false 4\npush_int 1\njump 5\npush_int 2\nleave\n";
        assert_eq!(run(src), Value::Integer(2));

        let src = "<ProgramStart>\npush_false\nbranch_if_false 4\npush_int 1\njump 5\npush_int 2\nleave\n";
        assert_eq!(run(src), Value::Integer(2));
    }

    #[test]
    fn test_zero_and_empty_are_truthy() {
        let src = "<ProgramStart>\npush_int 0\nbranch_if_false 4\npush_int 1\njump 5\npush_int 2\nleave\n";
        assert_eq!(run(src), Value::Integer(1));
    }

    #[test]
    fn test_loop_with_backward_jump() {
        // i = 0; while i < 3 { i = i + 1 }; i
        let src = "<ProgramStart>
push_int 0
set_local 0 i
pop
get_local 0 i
push_int 3
send < 1
branch_if_false 13
get_local 0 i
push_int 1
send + 1
set_local 0 i
pop
jump 3
get_local 0 i
leave
";
        assert_eq!(run(src), Value::Integer(3));
    }

    #[test]
    fn test_step_limit_stops_runaway_loop() {
        let program = parse_program("<ProgramStart>\njump 0\nleave\n").unwrap();
        let mut vm = Vm::with_config(VmConfig {
            max_steps: Some(100),
            ..VmConfig::default()
        });
        let fault = vm.exec(&program).expect_err("loop should hit step limit");
        assert!(fault.message.contains("step limit"));
    }

    // ── locals ──────────────────────────────────────────────────────

    #[test]
    fn test_set_local_leaves_value_on_stack() {
        assert_eq!(
            run("<ProgramStart>\npush_int 5\nset_local 0 x\nleave\n"),
            Value::Integer(5)
        );
    }

    #[test]
    fn test_assignment_then_read_matches_expression() {
        // x = 9; x
        let src = "<ProgramStart>\npush_int 9\nset_local 0 x\npop\nget_local 0 x\nleave\n";
        assert_eq!(run(src), Value::Integer(9));
    }

    #[test]
    fn test_unknown_local_at_depth_zero_is_null() {
        assert_eq!(run("<ProgramStart>\nget_local 0 nope\nleave\n"), Value::Null);
    }

    #[test]
    fn test_unknown_depth_is_name_error() {
        let value = run("<ProgramStart>\nget_local 3 x\nleave\n");
        assert_eq!(error_kind(&value), Some(ErrorKind::NameError));
    }

    // ── constants ───────────────────────────────────────────────────

    #[test]
    fn test_set_constant_binds_and_leaves_value() {
        let src = "<ProgramStart>\npush_int 3\nset_constant X\npop\nget_constant X\nleave\n";
        assert_eq!(run(src), Value::Integer(3));
    }

    #[test]
    fn test_unknown_constant_is_name_error() {
        let value = run("<ProgramStart>\nget_constant Missing\nleave\n");
        assert_eq!(error_kind(&value), Some(ErrorKind::NameError));
    }

    #[test]
    fn test_builtin_classes_are_bound_as_constants() {
        let value = run("<ProgramStart>\nget_constant Integer\nsend name 0\nleave\n");
        assert_eq!(value, Value::Str("Integer".to_string()));
    }

    // ── instance variables ──────────────────────────────────────────

    #[test]
    fn test_ivar_set_get_on_top_level_self() {
        let src = "<ProgramStart>\npush_int 7\nset_instance_variable @x\npop\nget_instance_variable @x\nleave\n";
        assert_eq!(run(src), Value::Integer(7));
    }

    #[test]
    fn test_absent_ivar_reads_null() {
        assert_eq!(
            run("<ProgramStart>\nget_instance_variable @nope\nleave\n"),
            Value::Null
        );
    }

    #[test]
    fn test_class_body_has_its_own_ivar_table() {
        let src = "<DefClass:Foo>
push_string \"v1\"
set_instance_variable @version
pop
get_instance_variable @version
leave

<ProgramStart>
def_class Foo
send name 0
leave
";
        assert_eq!(run(src), Value::Str("Foo".to_string()));
    }

    // ── methods and classes ─────────────────────────────────────────

    #[test]
    fn test_class_with_method_end_to_end() {
        // class Foo; def bar(x); x + 1; end; end; Foo.new.bar(41)
        let src = "<Def:bar>
params: x
get_local 0 x
push_int 1
send + 1
leave

<DefClass:Foo>
def_method bar
leave

<ProgramStart>
def_class Foo
pop
get_constant Foo
send new 0
push_int 41
send bar 1
leave
";
        assert_eq!(run(src), Value::Integer(42));
    }

    #[test]
    fn test_method_inherited_from_superclass() {
        // class A; def greet; "hi"; end; end; class B < A; end; B.new.greet
        let src = "<Def:greet>
push_string \"hi\"
leave

<DefClass:A>
def_method greet
leave

<DefClass:B>
push_null
leave

<ProgramStart>
def_class A
pop
get_constant A
def_class B super
pop
get_constant B
send new 0
send greet 0
leave
";
        assert_eq!(run(src), Value::Str("hi".to_string()));
    }

    #[test]
    fn test_subclass_override_does_not_change_superclass_dispatch() {
        let src = "<Def:greet>
push_string \"hi\"
leave

<Def:greet>
push_string \"yo\"
leave

<DefClass:A>
def_method greet
leave

<DefClass:B>
def_method greet
leave

<ProgramStart>
def_class A
pop
get_constant A
def_class B super
pop
get_constant B
send new 0
send greet 0
get_constant A
send new 0
send greet 0
send + 1
leave
";
        // B sees its own definition, A keeps the original.
        assert_eq!(run(src), Value::Str("yohi".to_string()));
    }

    #[test]
    fn test_method_redefinition_consumes_sets_in_order() {
        let src = "<Def:f>
push_int 1
leave

<Def:f>
push_int 2
leave

<ProgramStart>
def_method f
pop
def_method f
pop
push_self
send f 0
leave
";
        assert_eq!(run(src), Value::Integer(2));
    }

    #[test]
    fn test_def_method_statement_value_is_null() {
        let src = "<Def:f>\npush_null\nleave\n<ProgramStart>\ndef_method f\nleave\n";
        assert_eq!(run(src), Value::Null);
    }

    #[test]
    fn test_initialize_runs_with_args_and_instance_is_result() {
        let src = "<Def:initialize>
params: n
get_local 0 n
set_instance_variable @n
leave

<Def:n>
get_instance_variable @n
leave

<DefClass:Counter>
def_method initialize
pop
def_method n
leave

<ProgramStart>
def_class Counter
pop
get_constant Counter
push_int 5
send new 1
send n 0
leave
";
        assert_eq!(run(src), Value::Integer(5));
    }

    #[test]
    fn test_initialize_receives_the_callers_block() {
        let src = "<Def:initialize>
invoke_block 0
set_instance_variable @x
leave

<Def:x>
get_instance_variable @x
leave

<Block:0>
push_int 7
leave

<DefClass:Box>
def_method initialize
pop
def_method x
leave

<ProgramStart>
def_class Box
pop
get_constant Box
send new 0 &0
send x 0
leave
";
        assert_eq!(run(src), Value::Integer(7));
    }

    #[test]
    fn test_arity_mismatch_is_argument_error() {
        let src = "<Def:f>
params: a b
push_null
leave

<ProgramStart>
def_method f
pop
push_self
push_int 1
send f 1
leave
";
        let value = run(src);
        assert_eq!(error_kind(&value), Some(ErrorKind::ArgumentError));
    }

    #[test]
    fn test_instantiating_integer_is_type_error() {
        let value = run("<ProgramStart>\nget_constant Integer\nsend new 0\nleave\n");
        assert_eq!(error_kind(&value), Some(ErrorKind::TypeError));
    }

    #[test]
    fn test_class_method_falls_back_to_object_methods() {
        let src = "<DefClass:Foo>\npush_null\nleave\n<ProgramStart>\ndef_class Foo\npush_string \"x\"\nsend puts 1\nleave\n";
        let (vm, _) = run_vm(src);
        assert_eq!(vm.captured_output(), ["\"x\""]);
    }

    #[test]
    fn test_object_class_and_name() {
        let value = run("<ProgramStart>\npush_int 1\nsend class 0\nsend name 0\nleave\n");
        assert_eq!(value, Value::Str("Integer".to_string()));
    }

    #[test]
    fn test_instance_equality_is_identity() {
        let src = "<DefClass:Foo>
push_null
leave

<ProgramStart>
def_class Foo
pop
get_constant Foo
send new 0
dup
send == 1
leave
";
        assert_eq!(run(src), Value::Boolean(true));

        let src = "<DefClass:Foo>
push_null
leave

<ProgramStart>
def_class Foo
pop
get_constant Foo
send new 0
get_constant Foo
send new 0
send == 1
leave
";
        assert_eq!(run(src), Value::Boolean(false));
    }

    // ── null receiver ───────────────────────────────────────────────

    #[test]
    fn test_method_on_null_is_no_method_error() {
        let value = run("<ProgramStart>\npush_null\nsend foo 0\nleave\n");
        assert_eq!(error_kind(&value), Some(ErrorKind::NoMethodError));
    }

    #[test]
    fn test_null_does_not_inherit_object_methods() {
        let value = run("<ProgramStart>\npush_null\nsend class 0\nleave\n");
        assert_eq!(error_kind(&value), Some(ErrorKind::NoMethodError));
    }

    #[test]
    fn test_null_equality_only_with_itself() {
        assert_eq!(
            run("<ProgramStart>\npush_null\npush_null\nsend == 1\nleave\n"),
            Value::Boolean(true)
        );
        assert_eq!(
            run("<ProgramStart>\npush_null\npush_int 0\nsend == 1\nleave\n"),
            Value::Boolean(false)
        );
    }

    // ── arrays and hashes ───────────────────────────────────────────

    #[test]
    fn test_array_literal_lowering_and_each() {
        // [1,2,3].each do |e| puts(e) end
        let src = "<Block:0>
params: e
push_self
get_local 0 e
send puts 1
leave

<ProgramStart>
get_constant Array
push_int 1
push_int 2
push_int 3
send new 3
send each 0 &0
leave
";
        let (vm, result) = run_vm(src);
        assert_eq!(vm.captured_output(), ["1", "2", "3"]);
        assert!(matches!(&*result.borrow(), Value::Array(_)));
        assert_eq!(
            *result.borrow(),
            Value::array(vec![
                pointer(Value::Integer(1)),
                pointer(Value::Integer(2)),
                pointer(Value::Integer(3)),
            ])
        );
    }

    #[test]
    fn test_array_each_with_index_param() {
        let src = "<Block:0>
params: e i
push_self
get_local 0 e
get_local 0 i
send + 1
send puts 1
leave

<ProgramStart>
get_constant Array
push_int 10
push_int 20
send new 2
send each 0 &0
leave
";
        let (vm, _) = run_vm(src);
        assert_eq!(vm.captured_output(), ["10", "21"]);
    }

    #[test]
    fn test_array_mutation_is_visible_through_aliases() {
        let src = "<ProgramStart>
get_constant Array
send new 0
set_local 0 a
set_local 0 b
pop
get_local 0 a
push_int 1
send push 1
pop
get_local 0 b
send len 0
leave
";
        assert_eq!(run(src), Value::Integer(1));
    }

    #[test]
    fn test_hash_store_and_fetch() {
        // h = {}; h["k"] = 9; h["k"]
        let src = "<ProgramStart>
get_constant Hash
send new 0
set_local 0 h
pop
get_local 0 h
push_string \"k\"
push_int 9
send []= 2
pop
get_local 0 h
push_string \"k\"
send [] 1
leave
";
        assert_eq!(run(src), Value::Integer(9));
    }

    #[test]
    fn test_hash_each_yields_key_and_value() {
        let src = "<Block:0>
params: k v
push_self
get_local 0 k
send puts 1
push_self
get_local 0 v
send puts 1
leave

<ProgramStart>
get_constant Hash
push_string \"a\"
push_int 1
push_string \"b\"
push_int 2
send new 4
send each 0 &0
leave
";
        let (vm, _) = run_vm(src);
        assert_eq!(vm.captured_output(), ["\"a\"", "1", "\"b\"", "2"]);
    }

    // ── blocks and yield ────────────────────────────────────────────

    #[test]
    fn test_yield_twice_shares_enclosing_local() {
        // def twice; yield; yield; end; i = 0; twice do i = i + 1 end; i
        let src = "<Def:twice>
invoke_block 0
pop
invoke_block 0
leave

<Block:0>
get_local 1 i
push_int 1
send + 1
set_local 1 i
leave

<ProgramStart>
def_method twice
pop
push_int 0
set_local 0 i
pop
push_self
send twice 0 &0
pop
get_local 0 i
leave
";
        assert_eq!(run(src), Value::Integer(2));
    }

    #[test]
    fn test_yield_passes_arguments_positionally() {
        let src = "<Def:f>
push_int 41
invoke_block 1
leave

<Block:0>
params: x
get_local 0 x
push_int 1
send + 1
leave

<ProgramStart>
def_method f
pop
push_self
send f 0 &0
leave
";
        assert_eq!(run(src), Value::Integer(42));
    }

    #[test]
    fn test_yield_without_block_is_error_value() {
        let src = "<Def:f>
invoke_block 0
leave

<ProgramStart>
def_method f
pop
push_self
send f 0
leave
";
        let value = run(src);
        assert_eq!(error_kind(&value), Some(ErrorKind::NoBlockGivenError));
    }

    #[test]
    fn test_yield_arity_mismatch_is_argument_error() {
        let src = "<Def:f>
push_int 1
push_int 2
invoke_block 2
leave

<Block:0>
params: x
get_local 0 x
leave

<ProgramStart>
def_method f
pop
push_self
send f 0 &0
leave
";
        let value = run(src);
        assert_eq!(error_kind(&value), Some(ErrorKind::ArgumentError));
    }

    #[test]
    fn test_block_accumulates_over_each() {
        // i = 0; [1,2,3].each do |e| i = i + e end; i
        let src = "<Block:0>
params: e
get_local 1 i
get_local 0 e
send + 1
set_local 1 i
leave

<ProgramStart>
push_int 0
set_local 0 i
pop
get_constant Array
push_int 1
push_int 2
push_int 3
send new 3
send each 0 &0
pop
get_local 0 i
leave
";
        assert_eq!(run(src), Value::Integer(6));
    }

    #[test]
    fn test_block_self_comes_from_definition_site() {
        // Inside a method's block, ivars still resolve against the
        // top-level self that defined the block.
        let src = "<Def:runner>
invoke_block 0
leave

<Block:0>
get_instance_variable @tag
leave

<ProgramStart>
push_int 99
set_instance_variable @tag
pop
def_method runner
pop
push_self
send runner 0 &0
leave
";
        assert_eq!(run(src), Value::Integer(99));
    }

    // ── stack accounting ────────────────────────────────────────────

    #[test]
    fn test_send_leave_stack_effect() {
        // A full send of (receiver + 1 arg) nets one result slot.
        let src = "<Def:bar>
params: x
get_local 0 x
leave

<ProgramStart>
def_method bar
pop
push_int 1
push_self
push_int 2
send bar 1
leave
";
        let (vm, result) = run_vm(src);
        assert_eq!(vm.sp(), 2);
        assert_eq!(*result.borrow(), Value::Integer(2));
        assert_eq!(*vm.stack()[0].borrow(), Value::Integer(1));
    }

    #[test]
    fn test_program_result_is_stack_top() {
        let (vm, result) = run_vm("<ProgramStart>\npush_int 1\npush_int 2\nleave\n");
        assert_eq!(*result.borrow(), Value::Integer(2));
        assert_eq!(vm.sp(), 2);
    }

    // ── faults ──────────────────────────────────────────────────────

    #[test]
    fn test_missing_leave_rejected_before_execution() {
        let fault = run_fault("<ProgramStart>\npush_int 1\n");
        assert!(fault.message.contains("leave"));
    }

    #[test]
    fn test_malformed_bundle_missing_block_is_rejected() {
        let fault = run_fault("<ProgramStart>\nsend each 0 &9\nleave\n");
        assert!(fault.message.contains("Block:9"));
    }

    #[test]
    fn test_fault_reports_frame_and_pc() {
        let src = "<Def:f>
pop
leave

<ProgramStart>
def_method f
pop
push_self
send f 0
leave
";
        let fault = run_fault(src);
        assert_eq!(fault.frame.as_deref(), Some("Def:f"));
        assert_eq!(fault.pc, Some(0));
    }

    #[test]
    fn test_depth_limit_stops_runaway_recursion() {
        let src = "<Def:f>
push_self
send f 0
leave

<ProgramStart>
def_method f
pop
push_self
send f 0
leave
";
        let program = parse_program(src).unwrap();
        let mut vm = Vm::with_config(VmConfig {
            max_call_depth: 50,
            ..VmConfig::default()
        });
        let fault = vm.exec(&program).expect_err("recursion should hit depth limit");
        assert!(fault.message.contains("call depth"));
    }

    // ── output ──────────────────────────────────────────────────────

    #[test]
    fn test_puts_with_no_arguments_prints_blank_line() {
        let (vm, _) = run_vm("<ProgramStart>\npush_self\nsend puts 0\nleave\n");
        assert_eq!(vm.captured_output(), [""]);
    }

    #[test]
    fn test_puts_returns_null() {
        let src = "<ProgramStart>\npush_self\npush_int 3\nsend puts 1\nleave\n";
        assert_eq!(run(src), Value::Null);
    }
}
