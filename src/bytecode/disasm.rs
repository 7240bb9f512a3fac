use crate::bytecode::ir::Program;
use crate::bytecode::op::Op;

/// Render a program bundle back to the textual bytecode format.
///
/// The output parses back through `bytecode::parse` to an equal program.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();

    for (i, set) in program.sets.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("<{}>\n", set.label));
        if !set.params.is_empty() {
            out.push_str(&format!("params: {}\n", set.params.join(" ")));
        }
        for op in &set.instructions {
            out.push_str(&format_op(op));
            out.push('\n');
        }
    }

    out
}

/// One instruction as a line of textual bytecode.
pub fn format_op(op: &Op) -> String {
    match op {
        Op::PushInt(n) => format!("push_int {}", n),
        Op::PushString(s) => format!("push_string \"{}\"", escape(s)),
        Op::PushTrue => "push_true".to_string(),
        Op::PushFalse => "push_false".to_string(),
        Op::PushNull => "push_null".to_string(),
        Op::PushSelf => "push_self".to_string(),
        Op::GetLocal { depth, name } => format!("get_local {} {}", depth, name),
        Op::SetLocal { depth, name } => format!("set_local {} {}", depth, name),
        Op::GetConstant(name) => format!("get_constant {}", name),
        Op::SetConstant(name) => format!("set_constant {}", name),
        Op::GetInstanceVariable(name) => format!("get_instance_variable {}", name),
        Op::SetInstanceVariable(name) => format!("set_instance_variable {}", name),
        Op::Pop => "pop".to_string(),
        Op::Dup => "dup".to_string(),
        Op::BranchIfFalse(target) => format!("branch_if_false {}", target),
        Op::Jump(target) => format!("jump {}", target),
        Op::Send {
            method,
            argc,
            block,
        } => match block {
            Some(id) => format!("send {} {} &{}", method, argc, id),
            None => format!("send {} {}", method, argc),
        },
        Op::InvokeBlock(argc) => format!("invoke_block {}", argc),
        Op::DefMethod(name) => format!("def_method {}", name),
        Op::DefClass { name, has_super } => {
            if *has_super {
                format!("def_class {} super", name)
            } else {
                format!("def_class {}", name)
            }
        }
        Op::Leave => "leave".to_string(),
    }
}

fn escape(s: &str) -> String {
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
