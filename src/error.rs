use thiserror::Error;

/// Broad stage an assembly error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Lex,
    Syntax,
    Scope,
    Allocation,
    Resolution,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    #[error("unknown token")]
    UnknownToken,
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("duplicate function '{0}'")]
    DuplicateFunction(String),
    #[error("duplicate goto label '{0}'")]
    DuplicateLabel(String),
    #[error("function '{0}' is never terminated with END")]
    UnterminatedFunction(String),
    #[error("duplicate variable '{0}'")]
    DuplicateVariable(String),
    #[error("undeclared variable '{0}'")]
    UndeclaredVariable(String),
    #[error("goto label '{0}' does not exist")]
    GotoLabelNotFound(String),
    #[error("function '{0}' does not exist")]
    FunctionNotFound(String),
    #[error("invalid literal '{0}'")]
    InvalidLiteral(String),
}

/// A fatal assembly error, always tied to the source line that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}: {text}")]
pub struct CompileError {
    pub line: usize,
    pub text: String,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(line: usize, text: impl Into<String>, kind: CompileErrorKind) -> Self {
        Self { line, text: text.into(), kind }
    }

    pub fn category(&self) -> ErrorCategory {
        use CompileErrorKind::*;
        match self.kind {
            UnknownToken => ErrorCategory::Lex,
            Syntax(_) => ErrorCategory::Syntax,
            DuplicateFunction(_) | DuplicateLabel(_) | UnterminatedFunction(_) => ErrorCategory::Scope,
            DuplicateVariable(_) | UndeclaredVariable(_) => ErrorCategory::Allocation,
            GotoLabelNotFound(_) | FunctionNotFound(_) | InvalidLiteral(_) => ErrorCategory::Resolution,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpcodeError {
    #[error("unknown opcode '{0}'")]
    UnknownOpcode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("unknown instruction 0x{opcode:02x} at address {address}")]
    UnknownInstruction { opcode: u8, address: u32 },
    #[error("program did not halt after {cycles} cycles")]
    CycleTimeout { cycles: u64 },
    #[error("memory access at {address} is out of bounds (pc {pc})")]
    MemoryOutOfBounds { address: i64, pc: u32 },
    #[error("return without a matching call at address {pc}")]
    CallStackUnderflow { pc: u32 },
    #[error("program counter {pc} is outside the program")]
    ProgramCounterOutOfRange { pc: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let err = CompileError::new(3, "FOO 1", CompileErrorKind::UnknownToken);
        assert_eq!(err.category(), ErrorCategory::Lex);
        let err = CompileError::new(1, "VAR a", CompileErrorKind::DuplicateVariable("a".into()));
        assert_eq!(err.category(), ErrorCategory::Allocation);
        let err = CompileError::new(1, "FN f", CompileErrorKind::UnterminatedFunction("f".into()));
        assert_eq!(err.category(), ErrorCategory::Scope);
        let err = CompileError::new(9, "GOTO x", CompileErrorKind::GotoLabelNotFound("x".into()));
        assert_eq!(err.category(), ErrorCategory::Resolution);
    }

    #[test]
    fn test_display_carries_line_and_text() {
        let err = CompileError::new(7, "BLAH 3", CompileErrorKind::UnknownToken);
        assert_eq!(err.to_string(), "line 7: unknown token: BLAH 3");
    }
}
