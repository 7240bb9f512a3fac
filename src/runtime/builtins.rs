use crate::lang::object::{Block, ClassObj, ErrorKind, ErrorObj, Method, NativeFn};
use crate::lang::value::{pointer, Pointer, Value};
use crate::runtime::runtime_error::VmFault;
use crate::runtime::vm::Vm;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Handles to the built-in classes, constructed once at VM startup and
/// bound into the constants map under their names.
pub struct Builtins {
    pub object: Rc<RefCell<ClassObj>>,
    pub integer: Rc<RefCell<ClassObj>>,
    pub string: Rc<RefCell<ClassObj>>,
    pub boolean: Rc<RefCell<ClassObj>>,
    pub null: Rc<RefCell<ClassObj>>,
    pub array: Rc<RefCell<ClassObj>>,
    pub hash: Rc<RefCell<ClassObj>>,
    pub class: Rc<RefCell<ClassObj>>,
}

impl Builtins {
    pub fn constants(&self) -> Vec<(String, Pointer)> {
        [
            &self.integer,
            &self.string,
            &self.boolean,
            &self.null,
            &self.array,
            &self.hash,
            &self.class,
            &self.object,
        ]
        .into_iter()
        .map(|class| {
            let name = class.borrow().name.clone();
            (name, pointer(Value::Class(Rc::clone(class))))
        })
        .collect()
    }
}

pub fn init() -> Builtins {
    let object = builtin_class(
        "Object",
        None,
        &[
            ("==", object_eq as NativeFn),
            ("!=", object_ne),
            ("class", object_class),
            ("puts", object_puts),
        ],
    );

    let integer = builtin_class(
        "Integer",
        Some(&object),
        &[
            ("+", int_add as NativeFn),
            ("-", int_sub),
            ("*", int_mul),
            ("/", int_div),
            ("%", int_mod),
            ("==", int_eq),
            ("!=", int_ne),
            ("<", int_lt),
            ("<=", int_le),
            (">", int_gt),
            (">=", int_ge),
            ("-@", int_neg),
            ("++", int_incr),
            ("--", int_decr),
            ("to_s", int_to_s),
        ],
    );

    let string = builtin_class(
        "String",
        Some(&object),
        &[
            ("+", str_concat as NativeFn),
            ("==", str_eq),
            ("!=", str_ne),
            ("len", str_len),
            ("to_i", str_to_i),
        ],
    );

    let boolean = builtin_class(
        "Boolean",
        Some(&object),
        &[
            ("!", bool_not as NativeFn),
            ("==", bool_eq),
            ("!=", bool_ne),
            ("&&", bool_and),
            ("||", bool_or),
        ],
    );

    // Null has no superclass link: only these three methods resolve,
    // everything else is a NoMethodError.
    let null = builtin_class(
        "Null",
        None,
        &[
            ("==", null_eq as NativeFn),
            ("!=", null_ne),
            ("to_s", null_to_s),
        ],
    );

    let array = builtin_class(
        "Array",
        Some(&object),
        &[
            ("[]", array_index as NativeFn),
            ("[]=", array_index_set),
            ("push", array_push),
            ("pop", array_pop),
            ("len", array_len),
            ("each", array_each),
        ],
    );

    let hash = builtin_class(
        "Hash",
        Some(&object),
        &[
            ("[]", hash_index as NativeFn),
            ("[]=", hash_index_set),
            ("len", hash_len),
            ("keys", hash_keys),
            ("each", hash_each),
        ],
    );

    let class = builtin_class("Class", Some(&object), &[]);

    Builtins {
        object,
        integer,
        string,
        boolean,
        null,
        array,
        hash,
        class,
    }
}

fn builtin_class(
    name: &str,
    superclass: Option<&Rc<RefCell<ClassObj>>>,
    methods: &[(&str, NativeFn)],
) -> Rc<RefCell<ClassObj>> {
    let class = Rc::new(RefCell::new(ClassObj::new(name, superclass.map(Rc::clone))));
    for (method_name, body) in methods {
        let method = Method::native(*method_name, *body, &class);
        class
            .borrow_mut()
            .methods
            .insert((*method_name).to_string(), Value::Method(method));
    }
    install_class_methods(&class);
    class
}

/// Class methods every class answers to. Also applied to user classes as
/// `def_class` materializes them.
pub fn install_class_methods(class: &Rc<RefCell<ClassObj>>) {
    let method = Method::native("name", class_name_method, class);
    class
        .borrow_mut()
        .class_methods
        .insert("name".to_string(), Value::Method(method));
}

// ── shared helpers ──────────────────────────────────────────────────

fn check_args(args: &[Pointer], expected: usize) -> Option<Value> {
    if args.len() == expected {
        None
    } else {
        Some(ErrorObj::argument_error(expected, args.len()).into_value())
    }
}

fn type_mismatch(method: &str, expected: &str, got: &Value) -> Value {
    ErrorObj::type_error(format!(
        "{} expects {}, got {}",
        method,
        expected,
        got.class_name()
    ))
    .into_value()
}

fn int_of(p: &Pointer) -> Option<i64> {
    match &*p.borrow() {
        Value::Integer(n) => Some(*n),
        _ => None,
    }
}

fn str_of(p: &Pointer) -> Option<String> {
    match &*p.borrow() {
        Value::Str(s) => Some(s.clone()),
        _ => None,
    }
}

fn int_binary(
    method: &str,
    recv: &Pointer,
    args: &[Pointer],
    apply: impl Fn(i64, i64) -> Result<Value, ErrorObj>,
) -> Value {
    if let Some(e) = check_args(args, 1) {
        return e;
    }
    let a = match int_of(recv) {
        Some(n) => n,
        None => return type_mismatch(method, "Integer", &recv.borrow()),
    };
    let b = match int_of(&args[0]) {
        Some(n) => n,
        None => return type_mismatch(method, "Integer", &args[0].borrow()),
    };
    match apply(a, b) {
        Ok(value) => value,
        Err(e) => e.into_value(),
    }
}

fn int_unary(method: &str, recv: &Pointer, args: &[Pointer], apply: impl Fn(i64) -> Value) -> Value {
    if let Some(e) = check_args(args, 0) {
        return e;
    }
    match int_of(recv) {
        Some(n) => apply(n),
        None => type_mismatch(method, "Integer", &recv.borrow()),
    }
}

// ── Integer ─────────────────────────────────────────────────────────

fn int_add(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    Ok(int_binary("+", &recv, &args, |a, b| Ok(Value::Integer(a.wrapping_add(b)))))
}

fn int_sub(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    Ok(int_binary("-", &recv, &args, |a, b| Ok(Value::Integer(a.wrapping_sub(b)))))
}

fn int_mul(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    Ok(int_binary("*", &recv, &args, |a, b| Ok(Value::Integer(a.wrapping_mul(b)))))
}

fn int_div(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    Ok(int_binary("/", &recv, &args, |a, b| {
        if b == 0 {
            Err(ErrorObj::zero_division())
        } else {
            Ok(Value::Integer(a.wrapping_div(b)))
        }
    }))
}

fn int_mod(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    Ok(int_binary("%", &recv, &args, |a, b| {
        if b == 0 {
            Err(ErrorObj::zero_division())
        } else {
            Ok(Value::Integer(a.wrapping_rem(b)))
        }
    }))
}

fn int_eq(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    Ok(Value::Boolean(int_of(&recv) == int_of(&args[0]) && int_of(&args[0]).is_some()))
}

fn int_ne(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    Ok(Value::Boolean(int_of(&recv) != int_of(&args[0]) || int_of(&args[0]).is_none()))
}

fn int_lt(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    Ok(int_binary("<", &recv, &args, |a, b| Ok(Value::Boolean(a < b))))
}

fn int_le(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    Ok(int_binary("<=", &recv, &args, |a, b| Ok(Value::Boolean(a <= b))))
}

fn int_gt(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    Ok(int_binary(">", &recv, &args, |a, b| Ok(Value::Boolean(a > b))))
}

fn int_ge(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    Ok(int_binary(">=", &recv, &args, |a, b| Ok(Value::Boolean(a >= b))))
}

fn int_neg(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    Ok(int_unary("-@", &recv, &args, |n| Value::Integer(n.wrapping_neg())))
}

fn int_incr(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    Ok(int_unary("++", &recv, &args, |n| Value::Integer(n.wrapping_add(1))))
}

fn int_decr(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    Ok(int_unary("--", &recv, &args, |n| Value::Integer(n.wrapping_sub(1))))
}

fn int_to_s(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    Ok(int_unary("to_s", &recv, &args, |n| Value::Str(n.to_string())))
}

// ── String ──────────────────────────────────────────────────────────

fn str_concat(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    let a = match str_of(&recv) {
        Some(s) => s,
        None => return Ok(type_mismatch("+", "String", &recv.borrow())),
    };
    match str_of(&args[0]) {
        Some(b) => Ok(Value::Str(format!("{}{}", a, b))),
        None => Ok(type_mismatch("+", "String", &args[0].borrow())),
    }
}

fn str_eq(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    Ok(Value::Boolean(str_of(&recv) == str_of(&args[0]) && str_of(&args[0]).is_some()))
}

fn str_ne(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    Ok(Value::Boolean(str_of(&recv) != str_of(&args[0]) || str_of(&args[0]).is_none()))
}

fn str_len(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 0) {
        return Ok(e);
    }
    match str_of(&recv) {
        Some(s) => Ok(Value::Integer(s.chars().count() as i64)),
        None => Ok(type_mismatch("len", "String", &recv.borrow())),
    }
}

fn str_to_i(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 0) {
        return Ok(e);
    }
    match str_of(&recv) {
        Some(s) => Ok(Value::Integer(s.trim().parse::<i64>().unwrap_or(0))),
        None => Ok(type_mismatch("to_i", "String", &recv.borrow())),
    }
}

// ── Boolean ─────────────────────────────────────────────────────────

fn bool_of(p: &Pointer) -> Option<bool> {
    match &*p.borrow() {
        Value::Boolean(b) => Some(*b),
        _ => None,
    }
}

fn bool_not(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 0) {
        return Ok(e);
    }
    match bool_of(&recv) {
        Some(b) => Ok(Value::Boolean(!b)),
        None => Ok(type_mismatch("!", "Boolean", &recv.borrow())),
    }
}

fn bool_eq(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    Ok(Value::Boolean(bool_of(&recv) == bool_of(&args[0]) && bool_of(&args[0]).is_some()))
}

fn bool_ne(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    Ok(Value::Boolean(bool_of(&recv) != bool_of(&args[0]) || bool_of(&args[0]).is_none()))
}

/// Non-short-circuit form. Short-circuit evaluation is encoded upstream
/// with branch opcodes; this is the method the operator resolves to when
/// both operands are already on the stack.
fn bool_and(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    match bool_of(&recv) {
        Some(b) => Ok(Value::Boolean(b && args[0].borrow().is_truthy())),
        None => Ok(type_mismatch("&&", "Boolean", &recv.borrow())),
    }
}

fn bool_or(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    match bool_of(&recv) {
        Some(b) => Ok(Value::Boolean(b || args[0].borrow().is_truthy())),
        None => Ok(type_mismatch("||", "Boolean", &recv.borrow())),
    }
}

// ── Null ────────────────────────────────────────────────────────────

fn null_eq(_vm: &mut Vm, _recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    Ok(Value::Boolean(matches!(&*args[0].borrow(), Value::Null)))
}

fn null_ne(_vm: &mut Vm, _recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    Ok(Value::Boolean(!matches!(&*args[0].borrow(), Value::Null)))
}

fn null_to_s(_vm: &mut Vm, _recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 0) {
        return Ok(e);
    }
    Ok(Value::Str(String::new()))
}

// ── Array ───────────────────────────────────────────────────────────

fn array_of(p: &Pointer) -> Option<Rc<RefCell<Vec<Pointer>>>> {
    match &*p.borrow() {
        Value::Array(items) => Some(Rc::clone(items)),
        _ => None,
    }
}

fn array_index(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    let items = match array_of(&recv) {
        Some(items) => items,
        None => return Ok(type_mismatch("[]", "Array", &recv.borrow())),
    };
    let idx = match int_of(&args[0]) {
        Some(n) => n,
        None => return Ok(type_mismatch("[]", "Integer index", &args[0].borrow())),
    };
    let items = items.borrow();
    let idx = if idx < 0 { idx + items.len() as i64 } else { idx };
    if idx < 0 || idx as usize >= items.len() {
        return Ok(Value::Null);
    }
    let value = items[idx as usize].borrow().clone();
    Ok(value)
}

fn array_index_set(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 2) {
        return Ok(e);
    }
    let items = match array_of(&recv) {
        Some(items) => items,
        None => return Ok(type_mismatch("[]=", "Array", &recv.borrow())),
    };
    let idx = match int_of(&args[0]) {
        Some(n) => n,
        None => return Ok(type_mismatch("[]=", "Integer index", &args[0].borrow())),
    };
    if idx < 0 {
        return Ok(ErrorObj::new(
            ErrorKind::ArgumentError,
            format!("negative array index {}", idx),
        )
        .into_value());
    }
    let mut items = items.borrow_mut();
    let idx = idx as usize;
    while items.len() <= idx {
        items.push(pointer(Value::Null));
    }
    items[idx] = args[1].clone();
    let value = args[1].borrow().clone();
    Ok(value)
}

fn array_push(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    let items = match array_of(&recv) {
        Some(items) => items,
        None => return Ok(type_mismatch("push", "Array", &recv.borrow())),
    };
    items.borrow_mut().push(args[0].clone());
    let receiver = recv.borrow().clone();
    Ok(receiver)
}

fn array_pop(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 0) {
        return Ok(e);
    }
    let items = match array_of(&recv) {
        Some(items) => items,
        None => return Ok(type_mismatch("pop", "Array", &recv.borrow())),
    };
    let popped = items.borrow_mut().pop();
    match popped {
        Some(p) => {
            let value = p.borrow().clone();
            Ok(value)
        }
        None => Ok(Value::Null),
    }
}

fn array_len(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 0) {
        return Ok(e);
    }
    match array_of(&recv) {
        Some(items) => Ok(Value::Integer(items.borrow().len() as i64)),
        None => Ok(type_mismatch("len", "Array", &recv.borrow())),
    }
}

/// Yields each element; with a two-parameter block, the element and its
/// index. Returns the receiver.
fn array_each(vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 0) {
        return Ok(e);
    }
    let block = match block {
        Some(b) => b,
        None => return Ok(ErrorObj::no_block_given().into_value()),
    };
    let items = match array_of(&recv) {
        Some(items) => items,
        None => return Ok(type_mismatch("each", "Array", &recv.borrow())),
    };

    let snapshot: Vec<Pointer> = items.borrow().clone();
    let wants_index = block.is.params.len() == 2;
    for (i, item) in snapshot.into_iter().enumerate() {
        let mut call_args = vec![item];
        if wants_index {
            call_args.push(pointer(Value::Integer(i as i64)));
        }
        let result = vm.call_block(&block, call_args)?;
        let failed = result.borrow().is_error();
        if failed {
            let value = result.borrow().clone();
            return Ok(value);
        }
    }
    let receiver = recv.borrow().clone();
    Ok(receiver)
}

// ── Hash ────────────────────────────────────────────────────────────

fn hash_of(p: &Pointer) -> Option<Rc<RefCell<HashMap<String, Pointer>>>> {
    match &*p.borrow() {
        Value::Hash(entries) => Some(Rc::clone(entries)),
        _ => None,
    }
}

fn hash_index(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    let entries = match hash_of(&recv) {
        Some(entries) => entries,
        None => return Ok(type_mismatch("[]", "Hash", &recv.borrow())),
    };
    let key = match str_of(&args[0]) {
        Some(k) => k,
        None => return Ok(type_mismatch("[]", "String key", &args[0].borrow())),
    };
    let value = entries.borrow().get(&key).map(|p| p.borrow().clone());
    Ok(value.unwrap_or(Value::Null))
}

fn hash_index_set(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 2) {
        return Ok(e);
    }
    let entries = match hash_of(&recv) {
        Some(entries) => entries,
        None => return Ok(type_mismatch("[]=", "Hash", &recv.borrow())),
    };
    let key = match str_of(&args[0]) {
        Some(k) => k,
        None => return Ok(type_mismatch("[]=", "String key", &args[0].borrow())),
    };
    entries.borrow_mut().insert(key, args[1].clone());
    let value = args[1].borrow().clone();
    Ok(value)
}

fn hash_len(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 0) {
        return Ok(e);
    }
    match hash_of(&recv) {
        Some(entries) => Ok(Value::Integer(entries.borrow().len() as i64)),
        None => Ok(type_mismatch("len", "Hash", &recv.borrow())),
    }
}

fn sorted_keys(entries: &Rc<RefCell<HashMap<String, Pointer>>>) -> Vec<String> {
    let mut keys: Vec<String> = entries.borrow().keys().cloned().collect();
    keys.sort();
    keys
}

fn hash_keys(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 0) {
        return Ok(e);
    }
    match hash_of(&recv) {
        Some(entries) => {
            let keys = sorted_keys(&entries)
                .into_iter()
                .map(|k| pointer(Value::Str(k)))
                .collect();
            Ok(Value::array(keys))
        }
        None => Ok(type_mismatch("keys", "Hash", &recv.borrow())),
    }
}

/// Yields each key and value; with a one-parameter block, just the key.
/// Returns the receiver.
fn hash_each(vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 0) {
        return Ok(e);
    }
    let block = match block {
        Some(b) => b,
        None => return Ok(ErrorObj::no_block_given().into_value()),
    };
    let entries = match hash_of(&recv) {
        Some(entries) => entries,
        None => return Ok(type_mismatch("each", "Hash", &recv.borrow())),
    };

    let wants_value = block.is.params.len() == 2;
    for key in sorted_keys(&entries) {
        let value = entries.borrow().get(&key).cloned();
        let value = match value {
            Some(p) => p,
            None => continue,
        };
        let mut call_args = vec![pointer(Value::Str(key))];
        if wants_value {
            call_args.push(value);
        }
        let result = vm.call_block(&block, call_args)?;
        let failed = result.borrow().is_error();
        if failed {
            let value = result.borrow().clone();
            return Ok(value);
        }
    }
    let receiver = recv.borrow().clone();
    Ok(receiver)
}

// ── Class ───────────────────────────────────────────────────────────

fn class_name_method(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 0) {
        return Ok(e);
    }
    match &*recv.borrow() {
        Value::Class(class) => Ok(Value::Str(class.borrow().name.clone())),
        other => Ok(type_mismatch("name", "Class", other)),
    }
}

// ── Object ──────────────────────────────────────────────────────────

fn object_eq(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    Ok(Value::Boolean(*recv.borrow() == *args[0].borrow()))
}

fn object_ne(_vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 1) {
        return Ok(e);
    }
    Ok(Value::Boolean(*recv.borrow() != *args[0].borrow()))
}

fn object_class(vm: &mut Vm, recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if let Some(e) = check_args(&args, 0) {
        return Ok(e);
    }
    let class = vm.class_of(&recv.borrow());
    Ok(Value::Class(class))
}

/// Print each argument's inspect form followed by a newline. With no
/// arguments, print a blank line.
fn object_puts(vm: &mut Vm, _recv: Pointer, args: Vec<Pointer>, _block: Option<Block>) -> Result<Value, VmFault> {
    if args.is_empty() {
        vm.write_line(String::new());
    }
    for arg in &args {
        let line = arg.borrow().inspect();
        vm.write_line(line);
    }
    Ok(Value::Null)
}
