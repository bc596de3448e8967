use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::config;
use crate::error::{CompileError, CompileErrorKind};
use crate::lexer::{Token, is_identifier};
use crate::opcodes::{Family, OpcodeTable};
use crate::parser::{Program, Scope};
use crate::symbols::{SymbolTable, VariableTable};

/// One instruction: opcode in the high 8 bits, literal in the low 24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinaryWord(u32);

impl BinaryWord {
    pub const HALT: BinaryWord = BinaryWord(0);

    pub fn new(opcode: u8, literal: u32) -> Self {
        BinaryWord((u32::from(opcode) << config::LITERAL_BITS) | (literal & config::LITERAL_MASK))
    }

    pub fn from_bits(bits: u32) -> Self {
        BinaryWord(bits)
    }

    pub fn opcode(self) -> u8 {
        (self.0 >> config::LITERAL_BITS) as u8
    }

    pub fn literal(self) -> u32 {
        self.0 & config::LITERAL_MASK
    }
}

impl fmt::Display for BinaryWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032b}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseWordError {
    #[error("line {line}: expected 32 binary digits, found '{text}'")]
    Malformed { line: usize, text: String },
}

impl FromStr for BinaryWord {
    type Err = ParseWordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 32 || !s.bytes().all(|b| b == b'0' || b == b'1') {
            return Err(ParseWordError::Malformed { line: 1, text: s.to_string() });
        }
        u32::from_str_radix(s, 2)
            .map(BinaryWord::from_bits)
            .map_err(|_| ParseWordError::Malformed { line: 1, text: s.to_string() })
    }
}

/// Reads a listing with one 32-character word per line, skipping blank lines.
pub fn parse_binary(text: &str) -> Result<Vec<BinaryWord>, ParseWordError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            line.parse().map_err(|_| ParseWordError::Malformed { line: index + 1, text: line.trim().to_string() })
        })
        .collect()
}

/// Renders words one per line, the format handed to external tooling.
pub fn format_binary(words: &[BinaryWord]) -> String {
    words.iter().map(|w| w.to_string()).collect::<Vec<_>>().join("\n")
}

/// Address -> source mapping plus the symbol tables, for the stepper.
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    pub address_to_source: HashMap<u32, SourceMapping>,
    pub symbols: SymbolTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMapping {
    pub raw_text: String,
    pub line: usize,
    pub scope: String,
}

/// Literal field before relocation. A pending literal is the CALL token
/// naming its callee; it is patched once every scope has an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Literal<'a> {
    Resolved(u32),
    Pending(&'a Token),
}

pub struct Assembler {
    pub words: Vec<BinaryWord>,
    pub debug_info: DebugInfo,
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            debug_info: DebugInfo::default(),
        }
    }

    pub fn assemble(&mut self, program: &Program, symbols: &SymbolTable, opcodes: &OpcodeTable) -> Result<(), CompileError> {
        let mut pending: Vec<(u8, Literal)> = Vec::new();

        for (index, scope) in program.scopes.iter().enumerate() {
            for token in &scope.tokens {
                let address = pending.len() as u32 + 1;
                self.debug_info.address_to_source.insert(address, SourceMapping {
                    raw_text: token.text.clone(),
                    line: token.line,
                    scope: scope.name.clone(),
                });
                let (code, literal) = encode_token(token, scope, symbols, opcodes)?;
                pending.push((code, literal));
            }
            if index == 0 {
                // halt separator between main and the functions
                pending.push((BinaryWord::HALT.opcode(), Literal::Resolved(0)));
            }
        }

        self.words = relocate(pending, program, symbols)?;
        debug_assert_eq!(self.words.len() as u32, symbols.program_size());
        self.debug_info.symbols = symbols.clone();

        tracing::debug!(words = self.words.len(), "generated code");
        Ok(())
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_token<'a>(
    token: &'a Token,
    scope: &Scope,
    symbols: &SymbolTable,
    opcodes: &OpcodeTable,
) -> Result<(u8, Literal<'a>), CompileError> {
    let opcode = opcodes
        .get(&token.mnemonic)
        .map_err(|_| token.error(CompileErrorKind::UnknownToken))?;

    if !opcode.family.takes_operand() {
        if !token.args.is_empty() {
            return Err(token.error(CompileErrorKind::Syntax(format!("{} takes no operand", token.mnemonic))));
        }
        return Ok((opcode.code, Literal::Resolved(0)));
    }

    if opcode.family == Family::Call {
        if token.args.is_empty() {
            return Err(token.error(CompileErrorKind::Syntax("CALL needs a function name".into())));
        }
        return Ok((opcode.code, Literal::Pending(token)));
    }

    let [operand] = token.args.as_slice() else {
        return Err(token.error(CompileErrorKind::Syntax(format!("{} takes exactly one operand", token.mnemonic))));
    };

    let empty = VariableTable::default();
    let variables = symbols.variables(&scope.name).unwrap_or(&empty);
    let base = symbols.scope_base(&scope.name).unwrap_or(1);
    let literal = resolve_operand(operand, opcode.family, scope, variables, base).map_err(|kind| token.error(kind))?;
    Ok((opcode.code, Literal::Resolved(literal)))
}

fn resolve_operand(operand: &str, family: Family, scope: &Scope, variables: &VariableTable, base: u32) -> Result<u32, CompileErrorKind> {
    // labels resolve to absolute addresses: branches are global
    if family == Family::Goto {
        return scope
            .gotos
            .get(operand)
            .map(|offset| base + offset)
            .ok_or_else(|| CompileErrorKind::GotoLabelNotFound(operand.to_string()));
    }
    if let Some(literal) = parse_literal(operand) {
        return literal.ok_or_else(|| CompileErrorKind::InvalidLiteral(operand.to_string()));
    }
    if let Some(address) = variables.get(operand) {
        return Ok(address);
    }
    if let Some(offset) = scope.gotos.get(operand) {
        return Ok(base + offset);
    }

    if is_identifier(operand) {
        Err(CompileErrorKind::UndeclaredVariable(operand.to_string()))
    } else {
        Err(CompileErrorKind::InvalidLiteral(operand.to_string()))
    }
}

/// `None` when `text` is not shaped like a number at all, `Some(None)` when it
/// is but does not fit in the literal field.
fn parse_literal(text: &str) -> Option<Option<u32>> {
    let (digits, radix) = if let Some(rest) = text.strip_prefix("0b") {
        (rest, 2)
    } else if let Some(rest) = text.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = text.strip_prefix("0d") {
        (rest, 10)
    } else if text.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
        (text, 10)
    } else {
        return None;
    };

    Some(
        i64::from_str_radix(digits, radix)
            .ok()
            .and_then(|value| u32::try_from(value).ok())
            .filter(|value| *value <= config::LITERAL_MASK),
    )
}

fn relocate(pending: Vec<(u8, Literal)>, program: &Program, symbols: &SymbolTable) -> Result<Vec<BinaryWord>, CompileError> {
    pending
        .into_iter()
        .map(|(code, literal)| match literal {
            Literal::Resolved(value) => Ok(BinaryWord::new(code, value)),
            Literal::Pending(call) => {
                let (target, arguments) = (&call.args[0], &call.args[1..]);
                let address = symbols
                    .function_address(target)
                    .ok_or_else(|| call.error(CompileErrorKind::FunctionNotFound(target.clone())))?;
                let params = program.scope(target).map_or(0, |f| f.params.len());
                if params != arguments.len() {
                    return Err(call.error(CompileErrorKind::Syntax(format!(
                        "'{}' takes {} argument(s), {} given",
                        target,
                        params,
                        arguments.len()
                    ))));
                }
                Ok(BinaryWord::new(code, address))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::Parser;

    fn assemble(source: &str) -> Result<(Program, SymbolTable, Vec<BinaryWord>), CompileError> {
        let opcodes = OpcodeTable::new();
        let tokens = tokenize(source, &opcodes)?;
        let program = Parser::new().parse(tokens)?;
        let mut symbols = SymbolTable::new();
        symbols.build(&program)?;
        let mut assembler = Assembler::new();
        assembler.assemble(&program, &symbols, &opcodes)?;
        Ok((program, symbols, assembler.words))
    }

    #[test]
    fn test_assemble_simple_program() {
        let (_, _, words) = assemble("MOVLW 0x2A\nMOVWF 0b11\nRET").unwrap();
        let opcodes = OpcodeTable::new();
        assert_eq!(words.len(), 4);
        assert_eq!(words[0], BinaryWord::new(opcodes.code("MOVLW").unwrap(), 42));
        assert_eq!(words[1].literal(), 3);
        assert_eq!(words[2].literal(), 0);
        assert_eq!(words[3], BinaryWord::HALT);
        assert_eq!(words[0].to_string(), "00000100000000000000000000101010");
    }

    #[test]
    fn test_word_count_matches_layout() {
        let source = "
            VAR x
            CALL f x
            CALL g
            FN f a
                RETFW a
            END
            FN g
                NOP
                RET
            END
        ";
        let (program, symbols, words) = assemble(source).unwrap();
        let expected = program.main().size() + 1 + program.functions().iter().map(|f| f.size()).sum::<u32>();
        assert_eq!(words.len() as u32, expected);
        assert_eq!(words.len() as u32, symbols.program_size());
    }

    #[test]
    fn test_call_relocation() {
        let source = "CALL later\nFN first\nRET\nEND\nFN later\nCALL first\nRET\nEND";
        let (_, symbols, words) = assemble(source).unwrap();
        let call = OpcodeTable::new().code("CALL").unwrap();
        let later = symbols.function_address("later").unwrap();
        let first = symbols.function_address("first").unwrap();
        assert_eq!(words[0], BinaryWord::new(call, later));
        assert_eq!(words[(later - 1) as usize], BinaryWord::new(call, first));
    }

    #[test]
    fn test_goto_is_absolute() {
        let source = "NOP\nGOTO done\ndone\nNOP\nFN f\nNOP\ntop\nGOTO top\nEND";
        let (_, symbols, words) = assemble(source).unwrap();
        assert_eq!(words[1].literal(), 3);
        let f = symbols.function_address("f").unwrap();
        // GOTO top is the second word of f and targets itself
        assert_eq!(words[f as usize].literal(), f + 1);
    }

    #[test]
    fn test_goto_ignores_variable_of_same_name() {
        let (_, _, words) = assemble("VAR done\nNOP\nNOP\nGOTO done\ndone\nNOP").unwrap();
        assert_eq!(words[3].literal(), 5);
        let err = assemble("VAR done\nGOTO done").err().unwrap();
        assert_eq!(err.kind, CompileErrorKind::GotoLabelNotFound("done".into()));
    }

    #[test]
    fn test_compare_skip_lives_in_opcode() {
        let (_, _, words) = assemble("EQ,2 7").unwrap();
        assert_eq!(words[0].opcode(), 0b1110_0010);
        assert_eq!(words[0].literal(), 7);
    }

    #[test]
    fn test_variables_resolve_per_scope() {
        let (_, _, words) = assemble("VAR a\nVAR b\nMOVFW b\nFN f\nVAR b\nMOVFW b\nRET\nEND").unwrap();
        assert_eq!(words[2].literal(), 2);
        assert_eq!(words[5].literal(), 1);
    }

    #[test]
    fn test_resolution_errors() {
        let err = assemble("GOTO nowhere").err().unwrap();
        assert_eq!(err.kind, CompileErrorKind::GotoLabelNotFound("nowhere".into()));
        let err = assemble("NOP\nCALL missing").err().unwrap();
        assert_eq!(err.kind, CompileErrorKind::FunctionNotFound("missing".into()));
        assert_eq!(err.line, 2);
        let err = assemble("MOVFW ghost").err().unwrap();
        assert_eq!(err.kind, CompileErrorKind::UndeclaredVariable("ghost".into()));
        let err = assemble("MOVLW 0x1000000").err().unwrap();
        assert_eq!(err.kind, CompileErrorKind::InvalidLiteral("0x1000000".into()));
        let err = assemble("MOVLW -1").err().unwrap();
        assert_eq!(err.kind, CompileErrorKind::InvalidLiteral("-1".into()));
        let err = assemble("MOVLW 0bx2").err().unwrap();
        assert!(matches!(err.kind, CompileErrorKind::InvalidLiteral(_)));
    }

    #[test]
    fn test_arity_errors() {
        assert!(matches!(assemble("RET 5").err().unwrap().kind, CompileErrorKind::Syntax(_)));
        assert!(matches!(assemble("MOVLW").err().unwrap().kind, CompileErrorKind::Syntax(_)));
        assert!(matches!(assemble("CALL f 1 2\nFN f a\nRET\nEND").err().unwrap().kind, CompileErrorKind::Syntax(_)));
    }

    #[test]
    fn test_binary_listing_round_trip() {
        let (_, _, words) = assemble("MOVLW 5\nWOUTW,1").unwrap();
        let listing = format_binary(&words);
        assert!(listing.lines().all(|l| l.len() == 32));
        assert_eq!(parse_binary(&listing).unwrap(), words);
        assert!(parse_binary("0101\n").is_err());
    }

    #[test]
    fn test_debug_info_maps_addresses() {
        let opcodes = OpcodeTable::new();
        let program = Parser::new().parse(tokenize("NOP\nMOVLW 1", &opcodes).unwrap()).unwrap();
        let mut symbols = SymbolTable::new();
        symbols.build(&program).unwrap();
        let mut assembler = Assembler::new();
        assembler.assemble(&program, &symbols, &opcodes).unwrap();
        let mapping = &assembler.debug_info.address_to_source[&2];
        assert_eq!(mapping.line, 2);
        assert_eq!(mapping.raw_text, "MOVLW 1");
        assert_eq!(mapping.scope, config::MAIN_SCOPE);
    }
}
