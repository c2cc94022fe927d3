use thiserror::Error;

// -------------- Quantity Arithmetic --------------
//
// Quantity shorthand like "25.5+12.6" is evaluated by a small recursive
// descent parser. Only `+ - * /`, unary minus, parentheses and decimal
// literals are accepted; identifiers and function calls are rejected.

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("expression ends unexpectedly")]
    UnexpectedEnd,
    #[error("trailing input after expression")]
    TrailingInput,
    #[error("malformed number '{0}'")]
    MalformedNumber(String),
    #[error("division by zero")]
    DivisionByZero,
}

/// Evaluates a restricted arithmetic expression over decimal literals.
/// Input must already be decimal-normalized (periods, not commas).
pub fn evaluate(input: &str) -> Result<f64, ExprError> {
    let mut parser = Parser {
        src: input.as_bytes(),
        pos: 0,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos < parser.src.len() {
        return Err(ExprError::TrailingInput);
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut value = self.term()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(b'-') => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, ExprError> {
        let mut value = self.factor()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                Some(b'/') => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<f64, ExprError> {
        self.skip_ws();
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(b'(') => {
                self.pos += 1;
                let value = self.expr()?;
                self.skip_ws();
                match self.peek() {
                    Some(b')') => {
                        self.pos += 1;
                        Ok(value)
                    }
                    Some(c) => Err(ExprError::UnexpectedChar(c as char)),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) => Err(ExprError::UnexpectedChar(c as char)),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn number(&mut self) -> Result<f64, ExprError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        text.parse()
            .map_err(|_| ExprError::MalformedNumber(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sums_and_differences() {
        assert!(close(evaluate("25.5+12.6").unwrap(), 38.1));
        assert!(close(evaluate("10-2.5-2.5").unwrap(), 5.0));
        assert!(close(evaluate(" 1 + 2 ").unwrap(), 3.0));
    }

    #[test]
    fn test_precedence_and_parens() {
        assert!(close(evaluate("2+3*4").unwrap(), 14.0));
        assert!(close(evaluate("(2+3)*4").unwrap(), 20.0));
        assert!(close(evaluate("10/4").unwrap(), 2.5));
        assert!(close(evaluate("-(1+2)*2").unwrap(), -6.0));
    }

    #[test]
    fn test_unary_minus() {
        assert!(close(evaluate("-5").unwrap(), -5.0));
        assert!(close(evaluate("--5").unwrap(), 5.0));
        assert!(close(evaluate("3*-2").unwrap(), -6.0));
    }

    #[test]
    fn test_rejects_identifiers() {
        assert_eq!(evaluate("abc+1"), Err(ExprError::UnexpectedChar('a')));
        // No name or function lookups, ever.
        assert_eq!(evaluate("max(1,2)"), Err(ExprError::UnexpectedChar('m')));
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(evaluate("1+"), Err(ExprError::UnexpectedEnd));
        assert_eq!(evaluate("(1+2"), Err(ExprError::UnexpectedEnd));
        assert_eq!(evaluate("1 2"), Err(ExprError::TrailingInput));
        assert_eq!(
            evaluate("1.2.3"),
            Err(ExprError::MalformedNumber("1.2.3".into()))
        );
        assert_eq!(evaluate("1/0"), Err(ExprError::DivisionByZero));
        assert_eq!(evaluate(""), Err(ExprError::UnexpectedEnd));
    }
}
