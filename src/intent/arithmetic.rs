//! Two-operand arithmetic extraction from free text

use std::sync::LazyLock;

use regex::Regex;

/// Unsigned integers or decimals, ASCII digits only
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").expect("number pattern is valid"));

const MATH_KEYWORDS: &[&str] = &[
    "plus", "add", "minus", "subtract", "multiply", "times", "divide", "equals", "what is",
];

const MATH_SYMBOLS: &[char] = &['+', '-', '*', '/', '='];

pub const GUIDANCE_REPLY: &str =
    "I can help with basic math! Please provide two numbers and an operation (like 5 + 3 or 10 times 2).";

pub const DIVIDE_BY_ZERO_REPLY: &str = "I can't divide by zero! That would break the universe! 😅";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MathOperator {
    /// Resolve the operator from keyword or symbol cues, in precedence order
    fn detect(lower: &str) -> Option<Self> {
        let has = |cues: &[&str]| cues.iter().any(|cue| lower.contains(cue));

        if has(&["plus", "add", "+"]) {
            Some(Self::Add)
        } else if has(&["minus", "subtract", "-"]) {
            Some(Self::Subtract)
        } else if has(&["times", "multiply", "*", "x"]) {
            Some(Self::Multiply)
        } else if has(&["divide", "/"]) {
            Some(Self::Divide)
        } else {
            None
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Self::Add => "plus",
            Self::Subtract => "minus",
            Self::Multiply => "times",
            Self::Divide => "divided by",
        }
    }
}

/// The first two numbers of a message and the operation it asks for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MathOperands {
    pub first: f64,
    pub second: f64,
    pub operator: Option<MathOperator>,
}

/// Whether the text looks like an arithmetic question: at least one digit
/// plus an operator symbol or a math keyword
pub fn is_math_question(text: &str) -> bool {
    let lower = text.to_lowercase();
    let has_digit = lower.chars().any(|c| c.is_ascii_digit());
    let has_symbol = lower.contains(MATH_SYMBOLS);
    let has_keyword = MATH_KEYWORDS.iter().any(|k| lower.contains(k));

    has_digit && (has_symbol || has_keyword)
}

/// Pull the operands out of the text. Returns `None` when fewer than two
/// numbers are present.
pub fn extract_operands(text: &str) -> Option<MathOperands> {
    let mut numbers = NUMBER
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<f64>().ok());

    let first = numbers.next()?;
    let second = numbers.next()?;

    Some(MathOperands {
        first,
        second,
        operator: MathOperator::detect(&text.to_lowercase()),
    })
}

/// Answer an arithmetic question. Never fails; malformed input yields a
/// guidance reply instead.
pub fn evaluate(text: &str) -> String {
    let Some(MathOperands {
        first,
        second,
        operator,
    }) = extract_operands(text)
    else {
        return GUIDANCE_REPLY.to_string();
    };

    let Some(operator) = operator else {
        return format!(
            "I see the numbers {first} and {second}. Could you specify the operation? For example: add, subtract, multiply, or divide."
        );
    };

    let result = match operator {
        MathOperator::Add => first + second,
        MathOperator::Subtract => first - second,
        MathOperator::Multiply => first * second,
        MathOperator::Divide => {
            if second == 0.0 {
                return DIVIDE_BY_ZERO_REPLY.to_string();
            }
            first / second
        }
    };

    format!("{first} {} {second} equals {result}.", operator.verb())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_requires_digit_and_cue() {
        assert!(is_math_question("what is 4 times 5"));
        assert!(is_math_question("3+4"));
        assert!(is_math_question("7 = ?"));
        assert!(is_math_question("Add 2 and 9"));
        assert!(!is_math_question("what is love"));
        assert!(!is_math_question("plus minus times"));
        assert!(!is_math_question("room 101"));
    }

    #[test]
    fn test_no_digit_never_triggers() {
        for text in ["a + b", "what is the time", "x / y = z", "", "   "] {
            assert!(!is_math_question(text), "{text:?} should not trigger");
        }
    }

    #[test]
    fn test_basic_operations() {
        assert_eq!(evaluate("5 plus 3"), "5 plus 3 equals 8.");
        assert_eq!(evaluate("10 - 4"), "10 minus 4 equals 6.");
        assert_eq!(evaluate("6 times 7"), "6 times 7 equals 42.");
        assert_eq!(evaluate("2.5 * 4"), "2.5 times 4 equals 10.");
        assert_eq!(evaluate("9 divided by 2"), "9 divided by 2 equals 4.5.");
    }

    #[test]
    fn test_divide_by_zero_is_refused() {
        assert_eq!(evaluate("10 divided by 0"), DIVIDE_BY_ZERO_REPLY);
        assert_eq!(evaluate("10 / 0.0"), DIVIDE_BY_ZERO_REPLY);
    }

    #[test]
    fn test_single_number_gets_guidance() {
        assert_eq!(evaluate("7"), GUIDANCE_REPLY);
        assert_eq!(evaluate("what is 7 plus"), GUIDANCE_REPLY);
    }

    #[test]
    fn test_missing_operator_echoes_numbers() {
        let reply = evaluate("what is 3 and 4");
        assert!(reply.starts_with("I see the numbers 3 and 4."));
    }

    #[test]
    fn test_operator_precedence() {
        // addition cues outrank subtraction cues when both are present
        let ops = extract_operands("add 1 - 2").unwrap();
        assert_eq!(ops.operator, Some(MathOperator::Add));

        // a bare "x" counts as multiplication
        let ops = extract_operands("3 x 4").unwrap();
        assert_eq!(ops.operator, Some(MathOperator::Multiply));
        assert_eq!((ops.first, ops.second), (3.0, 4.0));
    }

    #[test]
    fn test_only_first_two_numbers_are_used() {
        assert_eq!(evaluate("1 + 2 + 3"), "1 plus 2 equals 3.");
    }
}
