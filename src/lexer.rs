use crate::config;
use crate::error::{CompileError, CompileErrorKind};
use crate::opcodes::OpcodeTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Directive,
    Instruction,
    Control,
    Label,
}

/// Scope and label keywords understood by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Function,
    End,
    Label,
}

impl Control {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "FN" => Some(Control::Function),
            "END" => Some(Control::End),
            "LABEL" => Some(Control::Label),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub mnemonic: String,
    pub args: Vec<String>,
    pub line: usize,
    // source line without its comment, kept for error reports and debug info
    pub text: String,
}

impl Token {
    pub fn control(&self) -> Option<Control> {
        match self.kind {
            TokenKind::Control => Control::from_keyword(&self.mnemonic),
            _ => None,
        }
    }

    pub fn error(&self, kind: CompileErrorKind) -> CompileError {
        CompileError::new(self.line, self.text.clone(), kind)
    }
}

pub fn tokenize(source: &str, opcodes: &OpcodeTable) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();

    for (index, raw_line) in source.lines().enumerate() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split_whitespace();
        let Some(mnemonic) = fields.next() else { continue };
        let args: Vec<String> = fields.map(str::to_string).collect();

        let kind = classify(mnemonic, args.is_empty(), opcodes)
            .ok_or_else(|| CompileError::new(index + 1, line, CompileErrorKind::UnknownToken))?;

        tokens.push(Token {
            kind,
            mnemonic: mnemonic.to_string(),
            args,
            line: index + 1,
            text: line.to_string(),
        });
    }

    tracing::debug!(tokens = tokens.len(), "lexed source");
    Ok(tokens)
}

fn strip_comment(line: &str) -> &str {
    let cut = config::COMMENT_MARKERS
        .iter()
        .filter_map(|marker| line.find(marker))
        .min()
        .unwrap_or(line.len());
    &line[..cut]
}

fn classify(mnemonic: &str, lone: bool, opcodes: &OpcodeTable) -> Option<TokenKind> {
    if mnemonic.starts_with(config::DIRECTIVE_MARKER) {
        return Some(TokenKind::Directive);
    }
    if opcodes.contains(mnemonic) {
        return Some(TokenKind::Instruction);
    }
    if Control::from_keyword(mnemonic).is_some() {
        return Some(TokenKind::Control);
    }
    // a bare identifier on its own line is a goto label
    if lone && is_identifier(mnemonic) {
        return Some(TokenKind::Label);
    }
    None
}

pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Result<Vec<Token>, CompileError> {
        tokenize(source, &OpcodeTable::new())
    }

    #[test]
    fn test_tokenize() {
        let tokens = lex("MOVLW 5\nADD,F counter\nRET").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].kind, TokenKind::Instruction);
        assert_eq!(tokens[0].mnemonic, "MOVLW");
        assert_eq!(tokens[0].args, vec!["5".to_string()]);
        assert_eq!(tokens[1].mnemonic, "ADD,F");
        assert_eq!(tokens[1].args, vec!["counter".to_string()]);
        assert_eq!(tokens[2].args.len(), 0);
        assert_eq!(tokens[2].line, 3);
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let source = "// full line comment\n\n   MOVLW 1 // trailing\n; other marker\nNOP ; trailing";
        let tokens = lex(source).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].line, 3);
        assert_eq!(tokens[0].text, "MOVLW 1");
        assert_eq!(tokens[1].line, 5);
        assert_eq!(tokens[1].mnemonic, "NOP");
    }

    #[test]
    fn test_classification() {
        let tokens = lex("#define SIZE 4\nFN square x\nloop\nLABEL again\nEND").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Directive);
        assert_eq!(tokens[1].kind, TokenKind::Control);
        assert_eq!(tokens[1].control(), Some(Control::Function));
        assert_eq!(tokens[2].kind, TokenKind::Label);
        assert_eq!(tokens[2].mnemonic, "loop");
        assert_eq!(tokens[3].control(), Some(Control::Label));
        assert_eq!(tokens[4].control(), Some(Control::End));
    }

    #[test]
    fn test_unknown_token_reports_line() {
        let err = lex("MOVLW 1\nNOP\nFROB 12\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.text, "FROB 12");
        assert_eq!(err.kind, CompileErrorKind::UnknownToken);
    }

    #[test]
    fn test_lone_non_identifier_is_not_a_label() {
        let err = lex("12abc").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnknownToken);
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("loop_1"));
        assert!(is_identifier("_x"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }
}
