//! Integer-only arithmetic evaluator used by `EVAL` expressions.
//!
//! Accepts decimal numbers, parentheses, unary `-`/`~` and the binary
//! operators `* / % + - << >> & ^ |` with C precedence. Nothing else can be
//! named or called.

use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("letters are not allowed in an expression")]
    Letter,
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("division by zero")]
    DivisionByZero,
    #[error("value out of range")]
    Overflow,
}

pub fn evaluate(expression: &str) -> Result<i64, EvalError> {
    if expression.chars().any(|c| c.is_alphabetic()) {
        return Err(EvalError::Letter);
    }
    let mut parser = ExprParser { chars: expression.chars().peekable() };
    let value = parser.parse_or()?;
    parser.skip_whitespace();
    match parser.chars.next() {
        None => Ok(value),
        Some(c) => Err(EvalError::UnexpectedChar(c)),
    }
}

struct ExprParser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl ExprParser<'_> {
    fn skip_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.peek().copied()
    }

    // Consumes `op` if it comes next; multi-character operators match fully or not at all.
    fn eat(&mut self, op: &str) -> bool {
        self.skip_whitespace();
        let mut lookahead = self.chars.clone();
        for expected in op.chars() {
            if lookahead.next() != Some(expected) {
                return false;
            }
        }
        self.chars = lookahead;
        true
    }

    fn parse_or(&mut self) -> Result<i64, EvalError> {
        let mut value = self.parse_xor()?;
        while self.eat("|") {
            value |= self.parse_xor()?;
        }
        Ok(value)
    }

    fn parse_xor(&mut self) -> Result<i64, EvalError> {
        let mut value = self.parse_and()?;
        while self.eat("^") {
            value ^= self.parse_and()?;
        }
        Ok(value)
    }

    fn parse_and(&mut self) -> Result<i64, EvalError> {
        let mut value = self.parse_shift()?;
        while self.eat("&") {
            value &= self.parse_shift()?;
        }
        Ok(value)
    }

    fn parse_shift(&mut self) -> Result<i64, EvalError> {
        let mut value = self.parse_additive()?;
        loop {
            if self.eat("<<") {
                let rhs = self.parse_additive()?;
                value = u32::try_from(rhs)
                    .ok()
                    .and_then(|amount| value.checked_shl(amount))
                    .ok_or(EvalError::Overflow)?;
            } else if self.eat(">>") {
                let rhs = self.parse_additive()?;
                value = u32::try_from(rhs)
                    .ok()
                    .and_then(|amount| value.checked_shr(amount))
                    .ok_or(EvalError::Overflow)?;
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_additive(&mut self) -> Result<i64, EvalError> {
        let mut value = self.parse_term()?;
        loop {
            if self.eat("+") {
                value = value.checked_add(self.parse_term()?).ok_or(EvalError::Overflow)?;
            } else if self.eat("-") {
                value = value.checked_sub(self.parse_term()?).ok_or(EvalError::Overflow)?;
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_term(&mut self) -> Result<i64, EvalError> {
        let mut value = self.parse_unary()?;
        loop {
            if self.eat("*") {
                value = value.checked_mul(self.parse_unary()?).ok_or(EvalError::Overflow)?;
            } else if self.eat("/") {
                let rhs = self.parse_unary()?;
                if rhs == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                value = value.checked_div(rhs).ok_or(EvalError::Overflow)?;
            } else if self.eat("%") {
                let rhs = self.parse_unary()?;
                if rhs == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                value = value.checked_rem(rhs).ok_or(EvalError::Overflow)?;
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<i64, EvalError> {
        if self.eat("-") {
            return self.parse_unary()?.checked_neg().ok_or(EvalError::Overflow);
        }
        if self.eat("~") {
            return Ok(!self.parse_unary()?);
        }
        if self.eat("+") {
            return self.parse_unary();
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<i64, EvalError> {
        match self.peek() {
            Some('(') => {
                self.chars.next();
                let value = self.parse_or()?;
                if self.eat(")") {
                    Ok(value)
                } else {
                    match self.peek() {
                        Some(c) => Err(EvalError::UnexpectedChar(c)),
                        None => Err(EvalError::UnexpectedEnd),
                    }
                }
            }
            Some(c) if c.is_ascii_digit() => {
                let mut value: i64 = 0;
                while let Some(digit) = self.chars.peek().and_then(|c| c.to_digit(10)) {
                    self.chars.next();
                    value = value
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(i64::from(digit)))
                        .ok_or(EvalError::Overflow)?;
                }
                Ok(value)
            }
            Some(c) => Err(EvalError::UnexpectedChar(c)),
            None => Err(EvalError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        assert_eq!(evaluate("2+3*4"), Ok(14));
        assert_eq!(evaluate("(2+3)*4"), Ok(20));
        assert_eq!(evaluate("1<<4|1"), Ok(17));
        assert_eq!(evaluate("7 - 2 - 1"), Ok(4));
    }

    #[test]
    fn test_division_truncates() {
        assert_eq!(evaluate("7/2"), Ok(3));
        assert_eq!(evaluate("-7/2"), Ok(-3));
        assert_eq!(evaluate("7%3"), Ok(1));
        assert_eq!(evaluate("1/0"), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_rejects_letters_and_junk() {
        assert_eq!(evaluate("__import__"), Err(EvalError::Letter));
        assert_eq!(evaluate("0x10"), Err(EvalError::Letter));
        assert_eq!(evaluate("2+"), Err(EvalError::UnexpectedEnd));
        assert_eq!(evaluate("(1+2"), Err(EvalError::UnexpectedEnd));
        assert_eq!(evaluate("1 2"), Err(EvalError::UnexpectedChar('2')));
        assert_eq!(evaluate("3 < 4"), Err(EvalError::UnexpectedChar('<')));
    }

    #[test]
    fn test_unary() {
        assert_eq!(evaluate("-(3)"), Ok(-3));
        assert_eq!(evaluate("~0"), Ok(-1));
    }
}
