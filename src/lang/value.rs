use crate::lang::object::{Block, ClassObj, ErrorObj, Instance, Method};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// An indirection cell holding one value.
///
/// Every operand-stack slot, local slot, constant slot, and instance
/// variable holds a `Pointer`, so rebinding replaces the cell handle while
/// aliased holders keep observing the old target.
pub type Pointer = Rc<RefCell<Value>>;

pub fn pointer(value: Value) -> Pointer {
    Rc::new(RefCell::new(value))
}

/// Runtime value in the Spinel language.
///
/// Values are the only data that can exist on the operand stack. Arrays
/// and hashes are shared cells: two pointers may target the same contents,
/// and mutation through one is observable through the other.
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit signed integer.
    Integer(i64),

    /// UTF-8 string value.
    Str(String),

    /// Boolean value.
    Boolean(bool),

    /// The null singleton.
    Null,

    /// Ordered sequence of values.
    Array(Rc<RefCell<Vec<Pointer>>>),

    /// String-keyed mapping. Iteration order is unspecified.
    Hash(Rc<RefCell<HashMap<String, Pointer>>>),

    Class(Rc<RefCell<ClassObj>>),

    Instance(Rc<RefCell<Instance>>),

    /// A method table entry: an instruction set or native body.
    Method(Method),

    /// An anonymous callable bound to its definition-site frame.
    Block(Block),

    /// A language-level error. Lives on the operand stack; never aborts
    /// the VM.
    Error(ErrorObj),
}

impl Value {
    pub fn array(items: Vec<Pointer>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn hash(entries: HashMap<String, Pointer>) -> Value {
        Value::Hash(Rc::new(RefCell::new(entries)))
    }

    /// Null and false are falsy; everything else, including 0 and empty
    /// collections, is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Boolean(false))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Format a value in its inspect form: like the display form, except
    /// strings are quoted and escaped, including nested inside arrays and
    /// hashes. `puts` prints this form.
    pub fn inspect(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", escape_str(s)),
            Value::Array(items) => {
                let items = items.borrow();
                let rendered: Vec<String> = items.iter().map(|p| p.borrow().inspect()).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Hash(entries) => {
                let entries = entries.borrow();
                let mut keys: Vec<&String> = entries.keys().collect();
                keys.sort();
                let rendered: Vec<String> = keys
                    .iter()
                    .map(|k| format!("{}: {}", k, entries[*k].borrow().inspect()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            other => format!("{}", other),
        }
    }

    /// The receiver's class name, used in diagnostics.
    pub fn class_name(&self) -> String {
        match self {
            Value::Integer(_) => "Integer".to_string(),
            Value::Str(_) => "String".to_string(),
            Value::Boolean(_) => "Boolean".to_string(),
            Value::Null => "Null".to_string(),
            Value::Array(_) => "Array".to_string(),
            Value::Hash(_) => "Hash".to_string(),
            Value::Class(_) => "Class".to_string(),
            Value::Instance(instance) => instance.borrow().class.borrow().name.clone(),
            Value::Method(_) => "Method".to_string(),
            Value::Block(_) => "Block".to_string(),
            Value::Error(_) => "Error".to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| *x.borrow() == *y.borrow())
            }
            (Value::Hash(a), Value::Hash(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len()
                    && a.iter().all(|(k, v)| match b.get(k) {
                        Some(w) => *v.borrow() == *w.borrow(),
                        None => false,
                    })
            }
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

fn escape_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

impl std::fmt::Display for Value {
    /// Format a value in its display form: strings print bare. `--trace`
    /// and `--result` use this.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.borrow())?;
                }
                write!(f, "]")
            }
            Value::Hash(entries) => {
                let entries = entries.borrow();
                let mut keys: Vec<&String> = entries.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, entries[*key].borrow())?;
                }
                write!(f, "}}")
            }
            Value::Class(class) => write!(f, "{}", class.borrow().name),
            Value::Instance(instance) => {
                write!(f, "#<{}>", instance.borrow().class.borrow().name)
            }
            Value::Method(method) => write!(
                f,
                "#<Method {}#{}>",
                method.owning_class.borrow().name,
                method.name
            ),
            Value::Block(block) => write!(f, "#<{}>", block.is.label),
            Value::Error(e) => write!(f, "{}", e),
        }
    }
}
