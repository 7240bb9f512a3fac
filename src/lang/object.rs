use crate::bytecode::InstructionSet;
use crate::lang::value::{Pointer, Value};
use crate::runtime::call_frame::CallFrame;
use crate::runtime::runtime_error::VmFault;
use crate::runtime::vm::Vm;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A class: name, superclass link, method tables, and class-level state.
///
/// Built-in classes carry native method tables; user classes accumulate
/// compiled methods as their bodies execute `def_method`.
pub struct ClassObj {
    pub name: String,
    pub superclass: Option<Rc<RefCell<ClassObj>>>,
    pub methods: HashMap<String, Value>,
    pub class_methods: HashMap<String, Value>,
    pub ivars: HashMap<String, Pointer>,
    pub is: Option<Rc<InstructionSet>>,
}

impl ClassObj {
    pub fn new(name: impl Into<String>, superclass: Option<Rc<RefCell<ClassObj>>>) -> Self {
        ClassObj {
            name: name.into(),
            superclass,
            methods: HashMap::new(),
            class_methods: HashMap::new(),
            ivars: HashMap::new(),
            is: None,
        }
    }
}

impl std::fmt::Debug for ClassObj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassObj").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Walk the superclass chain looking for an instance method.
///
/// Returns the method together with the class that owns it.
pub fn resolve_method(
    class: &Rc<RefCell<ClassObj>>,
    name: &str,
) -> Option<(Method, Rc<RefCell<ClassObj>>)> {
    let mut current = Some(Rc::clone(class));
    while let Some(c) = current {
        let found = match c.borrow().methods.get(name) {
            Some(Value::Method(m)) => Some(m.clone()),
            _ => None,
        };
        if let Some(m) = found {
            return Some((m, c));
        }
        let next = c.borrow().superclass.clone();
        current = next;
    }
    None
}

/// Walk the superclass chain looking for a class method.
pub fn resolve_class_method(
    class: &Rc<RefCell<ClassObj>>,
    name: &str,
) -> Option<(Method, Rc<RefCell<ClassObj>>)> {
    let mut current = Some(Rc::clone(class));
    while let Some(c) = current {
        let found = match c.borrow().class_methods.get(name) {
            Some(Value::Method(m)) => Some(m.clone()),
            _ => None,
        };
        if let Some(m) = found {
            return Some((m, c));
        }
        let next = c.borrow().superclass.clone();
        current = next;
    }
    None
}

/// An object: its class and its instance-variable table.
pub struct Instance {
    pub class: Rc<RefCell<ClassObj>>,
    pub ivars: HashMap<String, Pointer>,
}

impl Instance {
    pub fn new(class: Rc<RefCell<ClassObj>>) -> Self {
        Instance {
            class,
            ivars: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Instance({})", self.class.borrow().name)
    }
}

/// Signature shared by every built-in method body.
pub type NativeFn =
    fn(&mut Vm, Pointer, Vec<Pointer>, Option<Block>) -> Result<Value, VmFault>;

#[derive(Clone)]
pub enum MethodBody {
    Native(NativeFn),
    Compiled(Rc<InstructionSet>),
}

/// A dispatchable method: a name, a native or compiled body, and the
/// class it is registered on.
///
/// The owning class handle closes the class → method → class cycle; those
/// cycles live for the VM's lifetime, like the registry itself.
#[derive(Clone)]
pub struct Method {
    pub name: String,
    pub body: MethodBody,
    pub owning_class: Rc<RefCell<ClassObj>>,
}

impl Method {
    pub fn native(
        name: impl Into<String>,
        body: NativeFn,
        owning_class: &Rc<RefCell<ClassObj>>,
    ) -> Self {
        Method {
            name: name.into(),
            body: MethodBody::Native(body),
            owning_class: Rc::clone(owning_class),
        }
    }

    pub fn compiled(
        name: impl Into<String>,
        is: Rc<InstructionSet>,
        owning_class: &Rc<RefCell<ClassObj>>,
    ) -> Self {
        Method {
            name: name.into(),
            body: MethodBody::Compiled(is),
            owning_class: Rc::clone(owning_class),
        }
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.body {
            MethodBody::Native(_) => "native",
            MethodBody::Compiled(_) => "compiled",
        };
        write!(
            f,
            "Method({}#{}, {})",
            self.owning_class.borrow().name,
            self.name,
            kind
        )
    }
}

/// An anonymous callable passed to a method call.
///
/// `frame` is the definition-site frame: blocks execute with that frame as
/// their lexical parent, which is how closed-over locals stay shared.
#[derive(Clone)]
pub struct Block {
    pub is: Rc<InstructionSet>,
    pub frame: Rc<RefCell<CallFrame>>,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Block({})", self.is.label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TypeError,
    NoMethodError,
    NoBlockGivenError,
    ArgumentError,
    NameError,
    ZeroDivisionError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TypeError => "TypeError",
            ErrorKind::NoMethodError => "NoMethodError",
            ErrorKind::NoBlockGivenError => "NoBlockGivenError",
            ErrorKind::ArgumentError => "ArgumentError",
            ErrorKind::NameError => "NameError",
            ErrorKind::ZeroDivisionError => "ZeroDivisionError",
        }
    }
}

/// A language-level error value. Pushed onto the operand stack; the VM
/// keeps running.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorObj {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorObj {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ErrorObj {
            kind,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        ErrorObj::new(ErrorKind::TypeError, message)
    }

    pub fn no_method(class_name: &str, method: &str) -> Self {
        ErrorObj::new(
            ErrorKind::NoMethodError,
            format!("undefined method '{}' for {}", method, class_name),
        )
    }

    pub fn no_block_given() -> Self {
        ErrorObj::new(ErrorKind::NoBlockGivenError, "no block given (yield)")
    }

    pub fn argument_error(expected: usize, got: usize) -> Self {
        ErrorObj::new(
            ErrorKind::ArgumentError,
            format!("wrong number of arguments (given {}, expected {})", got, expected),
        )
    }

    pub fn uninitialized_constant(name: &str) -> Self {
        ErrorObj::new(
            ErrorKind::NameError,
            format!("uninitialized constant {}", name),
        )
    }

    pub fn undefined_local(name: &str, depth: usize) -> Self {
        ErrorObj::new(
            ErrorKind::NameError,
            format!("undefined local variable '{}' at depth {}", name, depth),
        )
    }

    pub fn zero_division() -> Self {
        ErrorObj::new(ErrorKind::ZeroDivisionError, "divided by 0")
    }

    pub fn into_value(self) -> Value {
        Value::Error(self)
    }
}

impl std::fmt::Display for ErrorObj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_walks_superclass_chain() {
        let root = Rc::new(RefCell::new(ClassObj::new("Object", None)));
        let greet = Method::native("greet", |_, _, _, _| Ok(Value::Null), &root);
        root.borrow_mut()
            .methods
            .insert("greet".to_string(), Value::Method(greet));
        let child = Rc::new(RefCell::new(ClassObj::new("Child", Some(root.clone()))));

        let (method, owner) = resolve_method(&child, "greet").expect("method should resolve");
        assert_eq!(method.name, "greet");
        assert!(Rc::ptr_eq(&owner, &root));
        assert!(Rc::ptr_eq(&method.owning_class, &root));
        assert!(resolve_method(&child, "missing").is_none());
    }

    #[test]
    fn test_resolve_prefers_subclass_definition() {
        let root = Rc::new(RefCell::new(ClassObj::new("Object", None)));
        let greet = Method::native("greet", |_, _, _, _| Ok(Value::Null), &root);
        root.borrow_mut()
            .methods
            .insert("greet".to_string(), Value::Method(greet));
        let child = Rc::new(RefCell::new(ClassObj::new("Child", Some(root.clone()))));
        let override_greet =
            Method::native("greet", |_, _, _, _| Ok(Value::Boolean(true)), &child);
        child
            .borrow_mut()
            .methods
            .insert("greet".to_string(), Value::Method(override_greet));

        let (method, owner) = resolve_method(&child, "greet").expect("method should resolve");
        assert!(Rc::ptr_eq(&owner, &child));
        assert!(Rc::ptr_eq(&method.owning_class, &child));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ErrorObj::no_method("Null", "foo").to_string(),
            "NoMethodError: undefined method 'foo' for Null"
        );
        assert_eq!(
            ErrorObj::argument_error(2, 1).to_string(),
            "ArgumentError: wrong number of arguments (given 1, expected 2)"
        );
        assert_eq!(ErrorObj::zero_division().to_string(), "ZeroDivisionError: divided by 0");
    }
}
