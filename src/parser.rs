use std::collections::HashMap;

use crate::config;
use crate::error::{CompileError, CompileErrorKind};
use crate::lexer::{Control, Token, TokenKind, is_identifier};

/// Label name -> instruction offset inside its scope.
pub type GotoTable = HashMap<String, u32>;

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub name: String,
    pub header: Option<Token>,
    pub params: Vec<String>,
    pub tokens: Vec<Token>,
    pub gotos: GotoTable,
    pub terminator: Option<Token>,
}

impl Scope {
    fn new(name: &str, header: Option<Token>, params: Vec<String>) -> Self {
        Scope {
            name: name.to_string(),
            header,
            params,
            tokens: Vec::new(),
            gotos: GotoTable::new(),
            terminator: None,
        }
    }

    /// Number of words this scope emits.
    pub fn size(&self) -> u32 {
        self.tokens.len() as u32
    }

    /// Hoists the declarations to the top, so the frame is sized before any
    /// other word runs, then places labels and expands call arguments
    /// against the final frame size.
    fn finalize(&mut self) {
        let (declarations, body): (Vec<Token>, Vec<Token>) =
            std::mem::take(&mut self.tokens).into_iter().partition(|t| t.mnemonic == "VAR");
        let frame_size = declarations.len();
        self.tokens = declarations;

        for token in body {
            match token.kind {
                TokenKind::Label => {
                    self.gotos.insert(token.mnemonic, self.tokens.len() as u32);
                }
                _ if token.mnemonic == "CALL" && token.args.len() > 1 => self.lower_call(token, frame_size),
                _ => self.tokens.push(token),
            }
        }
    }

    // CALL f a b -> load a, store into the callee's first parameter slot, ... , CALL f a b
    fn lower_call(&mut self, call: Token, frame_size: usize) {
        for (index, argument) in call.args[1..].iter().enumerate() {
            let load = if is_identifier(argument) { "MOVFW" } else { "MOVLW" };
            self.tokens.push(synthesize(&call, load, argument.clone()));
            self.tokens.push(synthesize(&call, "MOVWF", (frame_size + index + 1).to_string()));
        }
        self.tokens.push(call);
    }
}

/// The main scope followed by every function in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub scopes: Vec<Scope>,
}

impl Program {
    pub fn main(&self) -> &Scope {
        &self.scopes[0]
    }

    pub fn functions(&self) -> &[Scope] {
        &self.scopes[1..]
    }

    pub fn scope(&self, name: &str) -> Option<&Scope> {
        self.scopes.iter().find(|s| s.name == name)
    }
}

pub struct Parser {
    scopes: Vec<Scope>,
    current: usize,
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            scopes: vec![Scope::new(config::MAIN_SCOPE, None, Vec::new())],
            current: 0,
        }
    }

    pub fn parse(mut self, tokens: Vec<Token>) -> Result<Program, CompileError> {
        for token in tokens {
            self.parse_token(token)?;
        }

        if self.current != 0 {
            let scope = &self.scopes[self.current];
            return Err(unterminated(scope));
        }
        self.scopes[0].finalize();

        tracing::debug!(functions = self.scopes.len() - 1, "resolved scopes");
        Ok(Program { scopes: self.scopes })
    }

    fn parse_token(&mut self, token: Token) -> Result<(), CompileError> {
        match (token.kind, token.control()) {
            (TokenKind::Control, Some(Control::Function)) => self.open_function(token),
            (TokenKind::Control, Some(Control::End)) => self.close_function(token),
            (TokenKind::Control, Some(Control::Label)) => {
                let [name] = token.args.as_slice() else {
                    return Err(token.error(CompileErrorKind::Syntax("LABEL takes exactly one name".into())));
                };
                if !is_identifier(name) {
                    return Err(token.error(CompileErrorKind::Syntax(format!("invalid label name '{}'", name))));
                }
                let name = name.clone();
                self.add_label(&name, token)
            }
            (TokenKind::Label, _) => {
                let name = token.mnemonic.clone();
                self.add_label(&name, token)
            }
            (TokenKind::Instruction, _) => {
                self.scopes[self.current].tokens.push(token);
                Ok(())
            }
            _ => Err(token.error(CompileErrorKind::Syntax("unexpected token".into()))),
        }
    }

    fn open_function(&mut self, header: Token) -> Result<(), CompileError> {
        if self.current != 0 {
            return Err(unterminated(&self.scopes[self.current]));
        }
        let Some((name, params)) = header.args.split_first() else {
            return Err(header.error(CompileErrorKind::Syntax("FN needs a function name".into())));
        };
        if let Some(bad) = std::iter::once(name).chain(params).find(|n| !is_identifier(n)) {
            return Err(header.error(CompileErrorKind::Syntax(format!("invalid identifier '{}'", bad))));
        }
        if self.scopes.iter().any(|s| &s.name == name) {
            return Err(header.error(CompileErrorKind::DuplicateFunction(name.clone())));
        }

        let mut scope = Scope::new(name, Some(header.clone()), params.to_vec());
        // parameters occupy the first variable slots of the new frame
        for param in params {
            scope.tokens.push(synthesize(&header, "VAR", param.clone()));
        }
        self.scopes.push(scope);
        self.current = self.scopes.len() - 1;
        Ok(())
    }

    fn close_function(&mut self, terminator: Token) -> Result<(), CompileError> {
        if self.current == 0 {
            return Err(terminator.error(CompileErrorKind::Syntax("END outside of a function".into())));
        }
        if !terminator.args.is_empty() {
            return Err(terminator.error(CompileErrorKind::Syntax("END takes no arguments".into())));
        }

        let scope = &mut self.scopes[self.current];
        scope.finalize();
        let returns = scope
            .tokens
            .last()
            .is_some_and(|t| matches!(t.mnemonic.as_str(), "RET" | "RETLW" | "RETFW" | "GOTO"));
        if !returns {
            tracing::warn!(function = %scope.name, line = terminator.line, "function body does not end with a return");
        }
        scope.terminator = Some(terminator);
        self.current = 0;
        Ok(())
    }

    // offsets are assigned when the scope is finalized
    fn add_label(&mut self, name: &str, token: Token) -> Result<(), CompileError> {
        let scope = &mut self.scopes[self.current];
        if scope.gotos.contains_key(name) {
            return Err(token.error(CompileErrorKind::DuplicateLabel(name.to_string())));
        }
        scope.gotos.insert(name.to_string(), 0);
        scope.tokens.push(Token {
            kind: TokenKind::Label,
            mnemonic: name.to_string(),
            args: Vec::new(),
            ..token
        });
        Ok(())
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

fn synthesize(origin: &Token, mnemonic: &str, argument: String) -> Token {
    Token {
        kind: TokenKind::Instruction,
        mnemonic: mnemonic.to_string(),
        args: vec![argument],
        line: origin.line,
        text: origin.text.clone(),
    }
}

fn unterminated(scope: &Scope) -> CompileError {
    let (line, text) = scope
        .header
        .as_ref()
        .map(|h| (h.line, h.text.clone()))
        .unwrap_or_default();
    CompileError::new(line, text, CompileErrorKind::UnterminatedFunction(scope.name.clone()))
}
