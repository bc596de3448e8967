//! Assembler and simulator for a small accumulator microcontroller.
//!
//! Source goes through `lexer` -> `preprocessor` -> `parser` (scopes) ->
//! `symbols` (addresses) -> `assembler` (words); `processor` executes the
//! resulting words.

pub mod assembler;
pub mod config;
pub mod display;
pub mod error;
pub mod expr;
pub mod lexer;
pub mod opcodes;
pub mod parser;
pub mod preprocessor;
pub mod processor;
pub mod symbols;

pub use assembler::{BinaryWord, DebugInfo, format_binary, parse_binary};
pub use error::{CompileError, CompileErrorKind, RuntimeError};
pub use processor::{ConstantInput, InputSource, MicrocontrollerState, Processor};

use assembler::Assembler;
use opcodes::OpcodeTable;
use parser::Parser;
use symbols::SymbolTable;

/// Assembled words together with the information needed to map them back
/// to source.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub words: Vec<BinaryWord>,
    pub debug_info: DebugInfo,
}

pub fn compile(source: &str) -> Result<Vec<BinaryWord>, CompileError> {
    compile_with_debug(source).map(|assembly| assembly.words)
}

pub fn compile_with_debug(source: &str) -> Result<Assembly, CompileError> {
    let opcodes = OpcodeTable::new();

    let tokens = lexer::tokenize(source, &opcodes)?;
    let tokens = preprocessor::preprocess(tokens)?;
    let program = Parser::new().parse(tokens)?;

    let mut symbols = SymbolTable::new();
    symbols.build(&program)?;

    let mut assembler = Assembler::new();
    assembler.assemble(&program, &symbols, &opcodes)?;

    Ok(Assembly {
        words: assembler.words,
        debug_info: assembler.debug_info,
    })
}

/// Runs `words` from address 1 until HALT with the default cycle ceiling.
pub fn simulate(words: Vec<BinaryWord>, input: &mut dyn InputSource) -> Result<MicrocontrollerState, RuntimeError> {
    let mut processor = Processor::new(words);
    processor.run(input)?;
    Ok(processor.into_state())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_mnemonic_reports_line_and_text() {
        let err = compile("MOVLW 1\n\nFROB 3  ; bad\nHALT").unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.text, "FROB 3");
        assert_eq!(err.kind, CompileErrorKind::UnknownToken);
    }

    #[test]
    fn test_compile_and_simulate() {
        let source = "
            #define BASE 0x10
            VAR total
            MOVLW BASE
            ADD EVAL(2*3)
            MOVWF total
            WOUTF,1 total
            RINW,2
            WOUTW,2
        ";
        let words = compile(source).unwrap();
        let state = simulate(words, &mut ConstantInput([0, 9])).unwrap();
        assert_eq!(state.outputs, [22, 9]);
        assert!(state.halted);
    }

    #[test]
    fn test_loop_with_labels() {
        let source = "
            VAR i
            MOVLW 0
            MOVWF i
            LABEL loop
            INCR,F i
            MOVFW i
            LESS,0 5
            GOTO loop
            WOUTF,1 i
        ";
        let state = simulate(compile(source).unwrap(), &mut ConstantInput::default()).unwrap();
        assert_eq!(state.outputs[0], 5);
    }

    #[test]
    fn test_call_after_later_declaration_in_loop() {
        let source = "
            VAR i
            MOVLW 0
            MOVWF i
            top
            CALL f 7
            VAR r
            MOVWF r
            WOUTF,1 r
            INCR,F i
            MOVFW i
            LESS,0 2
            GOTO top
            FN f a
                RETFW a
            END
        ";
        let state = simulate(compile(source).unwrap(), &mut ConstantInput::default()).unwrap();
        assert_eq!(state.outputs[0], 7);
        assert_eq!(state.memory[1], 2);
    }

    #[test]
    fn test_call_after_skipped_declaration() {
        let source = "
            GOTO go
            VAR unused
            go
            CALL f 9
            WOUTW,1
            FN f a
                RETFW a
            END
        ";
        let state = simulate(compile(source).unwrap(), &mut ConstantInput::default()).unwrap();
        assert_eq!(state.outputs[0], 9);
        assert_eq!(state.memory[1], 0);
    }

    #[test]
    fn test_non_halting_program_times_out() {
        let words = compile("spin\nGOTO spin").unwrap();
        let err = simulate(words, &mut ConstantInput::default()).unwrap_err();
        assert_eq!(err, RuntimeError::CycleTimeout { cycles: config::CYCLE_TIMEOUT });
    }

    #[test]
    fn test_debug_info_tracks_functions() {
        let assembly = compile_with_debug("CALL f\nFN f\nVAR x\nRET\nEND").unwrap();
        let symbols = &assembly.debug_info.symbols;
        let f = symbols.function_address("f").unwrap();
        assert_eq!(f, 3);
        assert_eq!(assembly.debug_info.address_to_source[&f].scope, "f");
        assert_eq!(symbols.variables("f").unwrap().get("x"), Some(1));
    }
}
