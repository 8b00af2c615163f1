//! Challenge puzzles

use rand::Rng;
use crate::models::PuzzleStyle;
use crate::utils::helpers::{generate_random_string, normalize_answer};

const OPERAND_MAX: i64 = 5;
const TOKEN_LENGTH: usize = 6;

/// A puzzle with its expected answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Puzzle {
    /// Text shown to the member, already HTML-safe
    pub prompt: String,
    pub answer: String,
    /// Numeric value for arithmetic puzzles, compared after parsing
    pub value: Option<i64>,
}

impl Puzzle {
    pub fn generate(style: PuzzleStyle) -> Self {
        match style {
            PuzzleStyle::Arithmetic => Self::arithmetic(&mut rand::thread_rng()),
            PuzzleStyle::Token => Self::token(),
        }
    }

    /// Two operands from 0..=5 joined by + or -, redrawn until the result is nonzero
    pub fn arithmetic<R: Rng + ?Sized>(rng: &mut R) -> Self {
        loop {
            let a = rng.gen_range(0..=OPERAND_MAX);
            let b = rng.gen_range(0..=OPERAND_MAX);
            let (op, result) = if rng.gen_bool(0.5) { ('+', a + b) } else { ('-', a - b) };
            if result != 0 {
                return Self {
                    prompt: format!("{} {} {}", a, op, b),
                    answer: result.to_string(),
                    value: Some(result),
                };
            }
        }
    }

    pub fn token() -> Self {
        let token = generate_random_string(TOKEN_LENGTH);
        Self {
            prompt: token.clone(),
            answer: token,
            value: None,
        }
    }

    pub fn accepts(&self, text: &str) -> bool {
        let submitted = normalize_answer(text);
        match self.value {
            Some(value) => submitted.parse::<i64>().map(|n| n == value).unwrap_or(false),
            None => submitted == self.answer,
        }
    }
}
