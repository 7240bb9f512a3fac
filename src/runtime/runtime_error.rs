/// A fatal VM fault: stack underflow, malformed bytecode, a missing label,
/// or an exceeded execution limit. Faults halt the evaluator; language-level
/// errors never produce one.
#[derive(Debug, Clone, PartialEq)]
pub struct VmFault {
    pub message: String,
    pub frame: Option<String>,
    pub pc: Option<usize>,
}

impl VmFault {
    pub fn new(message: impl Into<String>) -> Self {
        VmFault {
            message: message.into(),
            frame: None,
            pc: None,
        }
    }

    /// Attach the frame label and PC where the fault surfaced. Keeps the
    /// innermost location once set.
    pub fn at(mut self, frame: &str, pc: usize) -> Self {
        if self.frame.is_none() {
            self.frame = Some(frame.to_string());
            self.pc = Some(pc);
        }
        self
    }
}

impl std::fmt::Display for VmFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vm fault: {}", self.message)?;
        if let (Some(frame), Some(pc)) = (&self.frame, self.pc) {
            write!(f, "\n  in <{}> at pc {}", frame, pc)?;
        }
        Ok(())
    }
}

impl std::error::Error for VmFault {}

pub fn stack_underflow() -> VmFault {
    VmFault::new("operand stack underflow")
}

pub fn missing_label(kind: &str, name: &str) -> VmFault {
    if name.is_empty() {
        VmFault::new(format!("missing instruction set <{}>", kind))
    } else {
        VmFault::new(format!("missing instruction set <{}:{}>", kind, name))
    }
}

pub fn jump_out_of_bounds(target: usize, len: usize) -> VmFault {
    VmFault::new(format!(
        "jump target {} out of bounds (set has {} instructions)",
        target, len
    ))
}

pub fn malformed(message: impl Into<String>) -> VmFault {
    VmFault::new(format!("malformed bytecode: {}", message.into()))
}

pub fn step_limit(max: usize) -> VmFault {
    VmFault::new(format!("execution step limit exceeded ({})", max))
}

pub fn stack_limit(max: usize) -> VmFault {
    VmFault::new(format!("operand stack size limit exceeded ({})", max))
}

pub fn depth_limit(max: usize) -> VmFault {
    VmFault::new(format!("call depth limit exceeded ({})", max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_location() {
        let fault = stack_underflow().at("Def:f", 3);
        assert_eq!(
            fault.to_string(),
            "vm fault: operand stack underflow\n  in <Def:f> at pc 3"
        );
    }

    #[test]
    fn test_at_keeps_innermost_location() {
        let fault = malformed("oops").at("Block:0", 1).at("ProgramStart", 9);
        assert_eq!(fault.frame.as_deref(), Some("Block:0"));
        assert_eq!(fault.pc, Some(1));
    }
}
