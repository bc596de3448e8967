use crate::config;
use crate::error::{CompileError, CompileErrorKind};
use crate::expr;
use crate::lexer::{Token, TokenKind, is_identifier};

/// Constants defined so far, in definition order.
#[derive(Debug, Default)]
pub struct ConstantTable {
    entries: Vec<(String, String)>,
}

impl ConstantTable {
    pub fn define(&mut self, name: &str, value: String) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }

    /// Replaces a whole-argument match, or else every bounded occurrence of
    /// each constant inside a compound argument.
    pub fn substitute(&self, argument: &str) -> String {
        if let Some(value) = self.get(argument) {
            return value.to_string();
        }
        self.entries
            .iter()
            .fold(argument.to_string(), |text, (name, value)| replace_word(&text, name, value))
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn replace_word(text: &str, word: &str, replacement: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last = 0;
    for (start, _) in text.match_indices(word) {
        if start < last {
            continue;
        }
        let end = start + word.len();
        let bounded_left = text[..start].chars().next_back().is_none_or(|c| !is_word_char(c));
        let bounded_right = text[end..].chars().next().is_none_or(|c| !is_word_char(c));
        if bounded_left && bounded_right {
            result.push_str(&text[last..start]);
            result.push_str(replacement);
            last = end;
        }
    }
    result.push_str(&text[last..]);
    result
}

/// Applies `#define` directives left to right and removes them from the stream.
pub fn preprocess(tokens: Vec<Token>) -> Result<Vec<Token>, CompileError> {
    let mut constants = ConstantTable::default();
    let mut output = Vec::with_capacity(tokens.len());

    for mut token in tokens {
        if token.kind == TokenKind::Directive {
            apply_directive(&token, &mut constants)?;
            continue;
        }

        for argument in token.args.iter_mut() {
            *argument = constants.substitute(argument);
            if argument.starts_with(config::EVAL_MARKER) {
                *argument = eval_literal(argument)
                    .map_err(|kind| CompileError::new(token.line, token.text.clone(), kind))?;
            }
        }
        output.push(token);
    }

    tracing::debug!(tokens = output.len(), constants = constants.entries.len(), "preprocessed source");
    Ok(output)
}

fn apply_directive(token: &Token, constants: &mut ConstantTable) -> Result<(), CompileError> {
    if token.mnemonic != "#define" {
        return Err(token.error(CompileErrorKind::Syntax(format!("unknown directive '{}'", token.mnemonic))));
    }
    let [name, values @ ..] = token.args.as_slice() else {
        return Err(token.error(CompileErrorKind::Syntax("#define needs a name and a value".into())));
    };
    if !is_identifier(name) || values.is_empty() {
        return Err(token.error(CompileErrorKind::Syntax("#define needs a name and a value".into())));
    }

    let values: Vec<String> = values.iter().map(|v| constants.substitute(v)).collect();
    let value = if values[0].starts_with(config::EVAL_MARKER) {
        eval_literal(&values.concat()).map_err(|kind| token.error(kind))?
    } else if values.len() == 1 {
        values[0].clone()
    } else {
        return Err(token.error(CompileErrorKind::Syntax("#define takes a single value".into())));
    };

    tracing::trace!(name = %name, value = %value, "defined constant");
    constants.define(name, value);
    Ok(())
}

fn eval_literal(argument: &str) -> Result<String, CompileErrorKind> {
    let expression = argument.strip_prefix(config::EVAL_MARKER).unwrap_or(argument);
    expr::evaluate(expression)
        .map(|value| value.to_string())
        .map_err(|_| CompileErrorKind::InvalidLiteral(argument.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::opcodes::OpcodeTable;

    fn run(source: &str) -> Result<Vec<Token>, CompileError> {
        preprocess(tokenize(source, &OpcodeTable::new()).unwrap())
    }

    #[test]
    fn test_plain_constant() {
        let tokens = run("#define LIMIT 10\nMOVLW LIMIT").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].args, vec!["10".to_string()]);
    }

    #[test]
    fn test_no_retroactive_substitution() {
        let tokens = run("MOVLW LIMIT\n#define LIMIT 10\nMOVLW LIMIT").unwrap();
        assert_eq!(tokens[0].args, vec!["LIMIT".to_string()]);
        assert_eq!(tokens[1].args, vec!["10".to_string()]);
    }

    #[test]
    fn test_eval_directive_and_chaining() {
        let tokens = run("#define W 4\n#define AREA EVAL (W * W) + 1\nMOVLW AREA").unwrap();
        assert_eq!(tokens[0].args, vec!["17".to_string()]);
    }

    #[test]
    fn test_inline_eval_with_bounded_substitution() {
        let tokens = run("#define X 3\n#define XY 5\nMOVLW EVAL(X*XY)").unwrap();
        assert_eq!(tokens[0].args, vec!["15".to_string()]);
    }

    #[test]
    fn test_eval_rejects_letters() {
        let err = run("#define BAD EVAL 2+abc").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(matches!(err.kind, CompileErrorKind::InvalidLiteral(_)));

        let err = run("NOP\nMOVLW EVAL(undefined+1)").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(matches!(err.kind, CompileErrorKind::InvalidLiteral(_)));
    }

    #[test]
    fn test_malformed_directives() {
        assert!(matches!(run("#define ONLYNAME").unwrap_err().kind, CompileErrorKind::Syntax(_)));
        assert!(matches!(run("#define A 1 2").unwrap_err().kind, CompileErrorKind::Syntax(_)));
        assert!(matches!(run("#include foo").unwrap_err().kind, CompileErrorKind::Syntax(_)));
    }

    #[test]
    fn test_replace_word_boundaries() {
        assert_eq!(replace_word("N+N1+N", "N", "7"), "7+N1+7");
        assert_eq!(replace_word("AN", "N", "7"), "AN");
    }

    #[test]
    fn test_redefinition_overrides() {
        let tokens = run("#define A 1\nMOVLW A\n#define A 2\nMOVLW A").unwrap();
        assert_eq!(tokens[0].args[0], "1");
        assert_eq!(tokens[1].args[0], "2");
    }
}
