use std::collections::HashMap;

use crate::error::OpcodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Incr,
    Decr,
    Rol,
    Ror,
    Nand,
    Nor,
    Xor,
}

/// Operand and destination of an ALU instruction.
///
/// `Immediate`: `W = W op literal`. `ToW`: `W = W op F[literal]`.
/// `ToF`: `F[literal] = W op F[literal]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluMode {
    Immediate,
    ToW,
    ToF,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Literal,
    W,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Greater,
    Less,
    Equal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayOp {
    Clear,
    Render,
    DrawPixel,
    DrawHorizontal,
    DrawVertical,
    DrawRect,
    SetFlag,
    Save,
    Load,
}

/// Execution family of an opcode, fixed when the table is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Halt,
    Nop,
    Pulse,
    Var,
    MovLW,
    MovWF,
    MovFW,
    MovLF,
    Call,
    Ret,
    RetLW,
    RetFW,
    Goto,
    Alu { op: AluOp, mode: AluMode },
    Compare { condition: Condition, source: Source, skip: u8 },
    Write { port: usize, source: Source },
    Read { port: usize, to_memory: bool },
    Display { op: DisplayOp, source: Source },
}

impl Family {
    /// Whether the instruction expects an operand in its literal field.
    pub fn takes_operand(&self) -> bool {
        match self {
            Family::Halt | Family::Nop | Family::Pulse | Family::Ret => false,
            Family::Write { source, .. } => *source != Source::W,
            Family::Read { to_memory, .. } => *to_memory,
            Family::Display { op, .. } => !matches!(op, DisplayOp::Clear | DisplayOp::Render),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeWidth {
    Byte,
    Nibble,
}

struct BaseOpcode {
    mnemonic: &'static str,
    code: u8,
    width: CodeWidth,
    family: Family,
}

const fn byte(mnemonic: &'static str, code: u8, family: Family) -> BaseOpcode {
    BaseOpcode { mnemonic, code, width: CodeWidth::Byte, family }
}

const fn nibble(mnemonic: &'static str, code: u8, condition: Condition, source: Source) -> BaseOpcode {
    BaseOpcode {
        mnemonic,
        code,
        width: CodeWidth::Nibble,
        family: Family::Compare { condition, source, skip: 0 },
    }
}

const fn alu(mnemonic: &'static str, code: u8, op: AluOp, mode: AluMode) -> BaseOpcode {
    byte(mnemonic, code, Family::Alu { op, mode })
}

const fn draw(mnemonic: &'static str, code: u8, op: DisplayOp, source: Source) -> BaseOpcode {
    byte(mnemonic, code, Family::Display { op, source })
}

use AluMode::{Immediate, ToF, ToW};
use AluOp::*;

const BASE_OPCODES: &[BaseOpcode] = &[
    byte("HALT", 0x00, Family::Halt),
    byte("NOP", 0x01, Family::Nop),
    byte("PULSE", 0x02, Family::Pulse),
    byte("VAR", 0x03, Family::Var),
    byte("MOVLW", 0x04, Family::MovLW),
    byte("MOVWF", 0x05, Family::MovWF),
    byte("MOVFW", 0x06, Family::MovFW),
    byte("MOVLF", 0x07, Family::MovLF),
    byte("CALL", 0x08, Family::Call),
    byte("RET", 0x09, Family::Ret),
    byte("RETLW", 0x0A, Family::RetLW),
    byte("RETFW", 0x0B, Family::RetFW),
    byte("GOTO", 0x0C, Family::Goto),
    alu("ADD", 0x10, Add, Immediate),
    alu("ADD,W", 0x11, Add, ToW),
    alu("ADD,F", 0x12, Add, ToF),
    alu("SUB", 0x13, Sub, Immediate),
    alu("SUB,W", 0x14, Sub, ToW),
    alu("SUB,F", 0x15, Sub, ToF),
    alu("MUL", 0x16, Mul, Immediate),
    alu("MUL,W", 0x17, Mul, ToW),
    alu("MUL,F", 0x18, Mul, ToF),
    alu("DIV", 0x19, Div, Immediate),
    alu("DIV,W", 0x1A, Div, ToW),
    alu("DIV,F", 0x1B, Div, ToF),
    alu("MOD", 0x1C, Mod, Immediate),
    alu("MOD,W", 0x1D, Mod, ToW),
    alu("MOD,F", 0x1E, Mod, ToF),
    alu("INCR", 0x1F, Incr, Immediate),
    alu("INCR,W", 0x20, Incr, ToW),
    alu("INCR,F", 0x21, Incr, ToF),
    alu("DECR", 0x22, Decr, Immediate),
    alu("DECR,W", 0x23, Decr, ToW),
    alu("DECR,F", 0x24, Decr, ToF),
    alu("ROL", 0x25, Rol, Immediate),
    alu("ROL,W", 0x26, Rol, ToW),
    alu("ROL,F", 0x27, Rol, ToF),
    alu("ROR", 0x28, Ror, Immediate),
    alu("ROR,W", 0x29, Ror, ToW),
    alu("ROR,F", 0x2A, Ror, ToF),
    alu("NAND", 0x2B, Nand, Immediate),
    alu("NAND,W", 0x2C, Nand, ToW),
    alu("NAND,F", 0x2D, Nand, ToF),
    alu("NOR", 0x2E, Nor, Immediate),
    alu("NOR,W", 0x2F, Nor, ToW),
    alu("NOR,F", 0x30, Nor, ToF),
    alu("XOR", 0x31, Xor, Immediate),
    alu("XOR,W", 0x32, Xor, ToW),
    alu("XOR,F", 0x33, Xor, ToF),
    byte("WOUTL,1", 0x40, Family::Write { port: 0, source: Source::Literal }),
    byte("WOUTW,1", 0x41, Family::Write { port: 0, source: Source::W }),
    byte("WOUTF,1", 0x42, Family::Write { port: 0, source: Source::Memory }),
    byte("WOUTL,2", 0x43, Family::Write { port: 1, source: Source::Literal }),
    byte("WOUTW,2", 0x44, Family::Write { port: 1, source: Source::W }),
    byte("WOUTF,2", 0x45, Family::Write { port: 1, source: Source::Memory }),
    byte("RINW,1", 0x46, Family::Read { port: 0, to_memory: false }),
    byte("RINF,1", 0x47, Family::Read { port: 0, to_memory: true }),
    byte("RINW,2", 0x48, Family::Read { port: 1, to_memory: false }),
    byte("RINF,2", 0x49, Family::Read { port: 1, to_memory: true }),
    draw("IGCLEAR", 0x50, DisplayOp::Clear, Source::Literal),
    draw("IGRENDER", 0x51, DisplayOp::Render, Source::Literal),
    draw("IGDRAWPL", 0x52, DisplayOp::DrawPixel, Source::Literal),
    draw("IGDRAWPF", 0x53, DisplayOp::DrawPixel, Source::Memory),
    draw("IGDRAWHL", 0x54, DisplayOp::DrawHorizontal, Source::Literal),
    draw("IGDRAWHF", 0x55, DisplayOp::DrawHorizontal, Source::Memory),
    draw("IGDRAWVL", 0x56, DisplayOp::DrawVertical, Source::Literal),
    draw("IGDRAWVF", 0x57, DisplayOp::DrawVertical, Source::Memory),
    draw("IGDRAWRL", 0x58, DisplayOp::DrawRect, Source::Literal),
    draw("IGDRAWRF", 0x59, DisplayOp::DrawRect, Source::Memory),
    draw("IGSETFL", 0x5A, DisplayOp::SetFlag, Source::Literal),
    draw("IGSETFF", 0x5B, DisplayOp::SetFlag, Source::Memory),
    draw("IGSAVE", 0x5C, DisplayOp::Save, Source::Memory),
    draw("IGLOAD", 0x5D, DisplayOp::Load, Source::Memory),
    nibble("GRT", 0b1010, Condition::Greater, Source::Literal),
    nibble("GRTF", 0b1011, Condition::Greater, Source::Memory),
    nibble("LESS", 0b1100, Condition::Less, Source::Literal),
    nibble("LESSF", 0b1101, Condition::Less, Source::Memory),
    nibble("EQ", 0b1110, Condition::Equal, Source::Literal),
    nibble("EQF", 0b1111, Condition::Equal, Source::Memory),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opcode {
    pub mnemonic: String,
    pub code: u8,
    pub family: Family,
}

/// Mnemonic <-> 8-bit code mapping with the comparison opcodes expanded
/// into their `NAME,N` skip-count variants.
pub struct OpcodeTable {
    opcodes: Vec<Opcode>,
    by_mnemonic: HashMap<String, usize>,
    by_code: HashMap<u8, usize>,
}

impl OpcodeTable {
    pub fn new() -> Self {
        let mut table = Self {
            opcodes: Vec::new(),
            by_mnemonic: HashMap::new(),
            by_code: HashMap::new(),
        };

        for base in BASE_OPCODES {
            match base.width {
                CodeWidth::Byte => table.insert(base.mnemonic.to_string(), base.code, base.family),
                CodeWidth::Nibble => {
                    for skip in 0..16u8 {
                        let family = match base.family {
                            Family::Compare { condition, source, .. } => Family::Compare { condition, source, skip },
                            other => other,
                        };
                        table.insert(format!("{},{}", base.mnemonic, skip), (base.code << 4) | skip, family);
                    }
                }
            }
        }
        table
    }

    fn insert(&mut self, mnemonic: String, code: u8, family: Family) {
        let index = self.opcodes.len();
        self.by_mnemonic.insert(mnemonic.clone(), index);
        self.by_code.insert(code, index);
        self.opcodes.push(Opcode { mnemonic, code, family });
    }

    pub fn contains(&self, mnemonic: &str) -> bool {
        self.by_mnemonic.contains_key(mnemonic)
    }

    pub fn get(&self, mnemonic: &str) -> Result<&Opcode, OpcodeError> {
        self.by_mnemonic
            .get(mnemonic)
            .map(|&i| &self.opcodes[i])
            .ok_or_else(|| OpcodeError::UnknownOpcode(mnemonic.to_string()))
    }

    pub fn code(&self, mnemonic: &str) -> Result<u8, OpcodeError> {
        self.get(mnemonic).map(|op| op.code)
    }

    pub fn decode(&self, code: u8) -> Option<&Opcode> {
        self.by_code.get(&code).map(|&i| &self.opcodes[i])
    }

    pub fn mnemonic(&self, code: u8) -> Option<&str> {
        self.decode(code).map(|op| op.mnemonic.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Opcode> {
        self.opcodes.iter()
    }

    pub fn len(&self) -> usize {
        self.opcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_every_mnemonic() {
        let table = OpcodeTable::new();
        for op in table.iter() {
            let code = table.code(&op.mnemonic).unwrap();
            assert_eq!(table.mnemonic(code), Some(op.mnemonic.as_str()));
        }
    }

    #[test]
    fn test_codes_are_unique() {
        let table = OpcodeTable::new();
        let mut seen = std::collections::HashSet::new();
        for op in table.iter() {
            assert!(seen.insert(op.code), "code 0x{:02x} used twice", op.code);
        }
    }

    #[test]
    fn test_comparison_expansion() {
        let table = OpcodeTable::new();
        assert!(!table.contains("EQ"));
        let eq3 = table.get("EQ,3").unwrap();
        assert_eq!(eq3.code, 0b1110_0011);
        assert_eq!(
            eq3.family,
            Family::Compare { condition: Condition::Equal, source: Source::Literal, skip: 3 }
        );
        assert_eq!(table.code("LESSF,15").unwrap(), 0b1101_1111);
        assert!(table.get("GRT,16").is_err());
    }

    #[test]
    fn test_halt_is_zero() {
        let table = OpcodeTable::new();
        assert_eq!(table.decode(0).map(|op| op.family), Some(Family::Halt));
    }

    #[test]
    fn test_unknown_opcode() {
        let table = OpcodeTable::new();
        assert_eq!(table.code("FOO"), Err(OpcodeError::UnknownOpcode("FOO".to_string())));
        assert!(table.decode(0xFF).is_some());
        assert!(table.decode(0x9F).is_none());
    }

    #[test]
    fn test_operand_arity() {
        let table = OpcodeTable::new();
        assert!(!table.get("RET").unwrap().family.takes_operand());
        assert!(!table.get("WOUTW,1").unwrap().family.takes_operand());
        assert!(table.get("WOUTF,2").unwrap().family.takes_operand());
        assert!(!table.get("IGRENDER").unwrap().family.takes_operand());
        assert!(table.get("ADD,F").unwrap().family.takes_operand());
    }
}
