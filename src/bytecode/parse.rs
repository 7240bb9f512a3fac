use crate::bytecode::ir::{InstructionSet, Label, LabelKind, Program};
use crate::bytecode::load_error::LoadError;
use crate::bytecode::op::Op;

/// Parse a textual bytecode bundle (`.spb`) into a program.
///
/// The format is line oriented. A `<Label>` header opens an instruction
/// set; an optional `params:` line names its parameters; every other
/// non-empty line is one instruction. `#` starts a full-line comment.
pub fn parse_program(source: &str) -> Result<Program, LoadError> {
    let mut program = Program::new();
    let mut current: Option<InstructionSet> = None;

    for (idx, raw) in source.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('<') {
            if let Some(set) = current.take() {
                program.sets.push(set);
            }
            current = Some(InstructionSet::new(parse_label(line, lineno)?));
            continue;
        }

        let set = match current.as_mut() {
            Some(set) => set,
            None => {
                return Err(LoadError::new(
                    lineno,
                    "instruction outside of a labeled section",
                ));
            }
        };

        if let Some(rest) = line.strip_prefix("params:") {
            if !set.instructions.is_empty() {
                return Err(LoadError::new(
                    lineno,
                    "params must come before the first instruction",
                ));
            }
            if !set.params.is_empty() {
                return Err(LoadError::new(lineno, "duplicate params line"));
            }
            match set.label.kind {
                LabelKind::Def | LabelKind::Block => {}
                _ => {
                    return Err(LoadError::new(
                        lineno,
                        "only methods and blocks declare parameters",
                    ));
                }
            }
            set.params = rest.split_whitespace().map(str::to_string).collect();
            continue;
        }

        let op = parse_instruction(line, lineno)?;
        set.instructions.push(op);
    }

    if let Some(set) = current.take() {
        program.sets.push(set);
    }

    Ok(program)
}

fn parse_label(line: &str, lineno: usize) -> Result<Label, LoadError> {
    let inner = line
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .ok_or_else(|| LoadError::new(lineno, format!("malformed label: {}", line)))?;

    if inner == "ProgramStart" {
        return Ok(Label::program_start());
    }

    let (kind_str, name) = inner
        .split_once(':')
        .ok_or_else(|| LoadError::new(lineno, format!("label has no kind: <{}>", inner)))?;

    // Names with ':' would be ambiguous at every later split.
    if name.is_empty() || name.contains(':') {
        return Err(LoadError::new(
            lineno,
            format!("invalid label name: {:?}", name),
        ));
    }

    let kind = match kind_str {
        "Def" => LabelKind::Def,
        "DefClass" => LabelKind::DefClass,
        "Block" => {
            if name.parse::<usize>().is_err() {
                return Err(LoadError::new(
                    lineno,
                    format!("block id must be an integer, got {:?}", name),
                ));
            }
            LabelKind::Block
        }
        other => {
            return Err(LoadError::new(
                lineno,
                format!("unknown label kind: {:?}", other),
            ));
        }
    };

    Ok(Label::new(kind, name))
}

fn parse_instruction(line: &str, lineno: usize) -> Result<Op, LoadError> {
    let (opname, rest) = match line.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (line, ""),
    };

    let op = match opname {
        "push_int" => Op::PushInt(parse_int(rest, lineno)?),
        "push_string" => Op::PushString(parse_string_literal(rest, lineno)?),
        "push_true" => no_operands(Op::PushTrue, rest, lineno)?,
        "push_false" => no_operands(Op::PushFalse, rest, lineno)?,
        "push_null" => no_operands(Op::PushNull, rest, lineno)?,
        "push_self" => no_operands(Op::PushSelf, rest, lineno)?,
        "get_local" => {
            let (depth, name) = parse_depth_name(rest, lineno)?;
            Op::GetLocal { depth, name }
        }
        "set_local" => {
            let (depth, name) = parse_depth_name(rest, lineno)?;
            Op::SetLocal { depth, name }
        }
        "get_constant" => Op::GetConstant(parse_name(rest, lineno)?),
        "set_constant" => Op::SetConstant(parse_name(rest, lineno)?),
        "get_instance_variable" => Op::GetInstanceVariable(parse_name(rest, lineno)?),
        "set_instance_variable" => Op::SetInstanceVariable(parse_name(rest, lineno)?),
        "pop" => no_operands(Op::Pop, rest, lineno)?,
        "dup" => no_operands(Op::Dup, rest, lineno)?,
        "branch_if_false" => Op::BranchIfFalse(parse_target(rest, lineno)?),
        "jump" => Op::Jump(parse_target(rest, lineno)?),
        "send" => parse_send(rest, lineno)?,
        "invoke_block" => Op::InvokeBlock(parse_target(rest, lineno)?),
        "def_method" => Op::DefMethod(parse_name(rest, lineno)?),
        "def_class" => parse_def_class(rest, lineno)?,
        "leave" => no_operands(Op::Leave, rest, lineno)?,
        other => {
            return Err(LoadError::new(
                lineno,
                format!("unknown opcode: {:?}", other),
            ));
        }
    };

    Ok(op)
}

fn no_operands(op: Op, rest: &str, lineno: usize) -> Result<Op, LoadError> {
    if rest.is_empty() {
        Ok(op)
    } else {
        Err(LoadError::new(
            lineno,
            format!("unexpected operand: {:?}", rest),
        ))
    }
}

fn parse_int(rest: &str, lineno: usize) -> Result<i64, LoadError> {
    rest.parse::<i64>()
        .map_err(|_| LoadError::new(lineno, format!("expected integer, got {:?}", rest)))
}

fn parse_target(rest: &str, lineno: usize) -> Result<usize, LoadError> {
    rest.parse::<usize>()
        .map_err(|_| LoadError::new(lineno, format!("expected index, got {:?}", rest)))
}

fn parse_name(rest: &str, lineno: usize) -> Result<String, LoadError> {
    if rest.is_empty() || rest.split_whitespace().count() != 1 {
        return Err(LoadError::new(
            lineno,
            format!("expected a single name, got {:?}", rest),
        ));
    }
    Ok(rest.to_string())
}

fn parse_depth_name(rest: &str, lineno: usize) -> Result<(usize, String), LoadError> {
    let mut parts = rest.split_whitespace();
    let depth = parts
        .next()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| LoadError::new(lineno, "expected a depth"))?;
    let name = parts
        .next()
        .ok_or_else(|| LoadError::new(lineno, "expected a local name"))?;
    if parts.next().is_some() {
        return Err(LoadError::new(lineno, "too many operands"));
    }
    Ok((depth, name.to_string()))
}

fn parse_send(rest: &str, lineno: usize) -> Result<Op, LoadError> {
    let mut parts = rest.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| LoadError::new(lineno, "send needs a method name"))?
        .to_string();
    let argc = parts
        .next()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| LoadError::new(lineno, "send needs an argument count"))?;

    let block = match parts.next() {
        None => None,
        Some(token) => match token.strip_prefix('&') {
            Some(id) if !id.is_empty() => Some(id.to_string()),
            _ => {
                return Err(LoadError::new(
                    lineno,
                    format!("expected a block reference like &0, got {:?}", token),
                ));
            }
        },
    };
    if parts.next().is_some() {
        return Err(LoadError::new(lineno, "too many operands"));
    }

    Ok(Op::Send {
        method,
        argc,
        block,
    })
}

fn parse_def_class(rest: &str, lineno: usize) -> Result<Op, LoadError> {
    let mut parts = rest.split_whitespace();
    let name = parts
        .next()
        .ok_or_else(|| LoadError::new(lineno, "def_class needs a class name"))?
        .to_string();
    let has_super = match parts.next() {
        None => false,
        Some("super") => true,
        Some(other) => {
            return Err(LoadError::new(
                lineno,
                format!("expected \"super\", got {:?}", other),
            ));
        }
    };
    if parts.next().is_some() {
        return Err(LoadError::new(lineno, "too many operands"));
    }
    Ok(Op::DefClass { name, has_super })
}

fn parse_string_literal(rest: &str, lineno: usize) -> Result<String, LoadError> {
    let inner = rest
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| LoadError::new(lineno, format!("expected a quoted string, got {:?}", rest)))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            if c == '"' {
                return Err(LoadError::new(lineno, "unescaped quote inside string"));
            }
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            other => {
                return Err(LoadError::new(
                    lineno,
                    format!("invalid escape: \\{}", other.map(String::from).unwrap_or_default()),
                ));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Program {
        parse_program(src).expect("program should parse")
    }

    fn parse_err(src: &str) -> LoadError {
        parse_program(src).expect_err("parse should fail")
    }

    #[test]
    fn test_parse_program_start() {
        let p = parse_ok("<ProgramStart>\npush_int 1\nleave\n");
        assert_eq!(p.sets.len(), 1);
        assert_eq!(p.sets[0].label, Label::program_start());
        assert_eq!(p.sets[0].instructions, vec![Op::PushInt(1), Op::Leave]);
    }

    #[test]
    fn test_parse_method_with_params() {
        let src = "<Def:add>\nparams: a b\nget_local 0 a\nget_local 0 b\nsend + 1\nleave\n";
        let p = parse_ok(src);
        assert_eq!(p.sets[0].label, Label::new(LabelKind::Def, "add"));
        assert_eq!(p.sets[0].params, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            p.sets[0].instructions[0],
            Op::GetLocal {
                depth: 0,
                name: "a".to_string()
            }
        );
    }

    #[test]
    fn test_parse_send_with_block() {
        let p = parse_ok("<ProgramStart>\nsend each 0 &3\nleave\n");
        assert_eq!(
            p.sets[0].instructions[0],
            Op::Send {
                method: "each".to_string(),
                argc: 0,
                block: Some("3".to_string())
            }
        );
    }

    #[test]
    fn test_parse_operator_method_names() {
        let p = parse_ok("<ProgramStart>\nsend []= 2\nsend -@ 0\nleave\n");
        assert_eq!(
            p.sets[0].instructions[0],
            Op::Send {
                method: "[]=".to_string(),
                argc: 2,
                block: None
            }
        );
        assert_eq!(
            p.sets[0].instructions[1],
            Op::Send {
                method: "-@".to_string(),
                argc: 0,
                block: None
            }
        );
    }

    #[test]
    fn test_parse_string_escapes() {
        let p = parse_ok("<ProgramStart>\npush_string \"a\\\"b\\n\\\\\"\nleave\n");
        assert_eq!(
            p.sets[0].instructions[0],
            Op::PushString("a\"b\n\\".to_string())
        );
    }

    #[test]
    fn test_parse_comments_and_blanks() {
        let src = "# header\n\n<ProgramStart>\n# inline section\npush_true\nleave\n";
        let p = parse_ok(src);
        assert_eq!(p.sets[0].instructions, vec![Op::PushTrue, Op::Leave]);
    }

    #[test]
    fn test_parse_def_class_super() {
        let p = parse_ok("<ProgramStart>\ndef_class B super\nleave\n");
        assert_eq!(
            p.sets[0].instructions[0],
            Op::DefClass {
                name: "B".to_string(),
                has_super: true
            }
        );
    }

    #[test]
    fn test_multiple_sets() {
        let src = "<Def:f>\nleave\n<Def:f>\nleave\n<ProgramStart>\nleave\n";
        let p = parse_ok(src);
        assert_eq!(p.sets.len(), 3);
        assert_eq!(p.sets[1].label, Label::new(LabelKind::Def, "f"));
    }

    #[test]
    fn test_instruction_outside_section() {
        let e = parse_err("push_int 1\n");
        assert_eq!(e.line, 1);
        assert!(e.message.contains("outside"));
    }

    #[test]
    fn test_label_with_colon_in_name() {
        let e = parse_err("<Def:a:b>\nleave\n");
        assert!(e.message.contains("invalid label name"));
    }

    #[test]
    fn test_block_label_must_be_numeric() {
        let e = parse_err("<Block:main>\nleave\n");
        assert!(e.message.contains("block id"));
    }

    #[test]
    fn test_unknown_opcode() {
        let e = parse_err("<ProgramStart>\nfrobnicate 1\n");
        assert!(e.message.contains("unknown opcode"));
    }

    #[test]
    fn test_params_on_class_body_rejected() {
        let e = parse_err("<DefClass:Foo>\nparams: x\nleave\n");
        assert!(e.message.contains("parameters"));
    }

    #[test]
    fn test_params_after_instruction_rejected() {
        let e = parse_err("<Def:f>\npush_int 1\nparams: x\nleave\n");
        assert!(e.message.contains("before the first instruction"));
    }

    #[test]
    fn test_trailing_operand_rejected() {
        let e = parse_err("<ProgramStart>\npop now\n");
        assert!(e.message.contains("unexpected operand"));
    }
}
