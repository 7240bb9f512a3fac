/// Error produced while parsing textual bytecode.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadError {
    pub line: usize,
    pub message: String,
}

impl LoadError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        LoadError {
            line,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "load error: line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for LoadError {}
