//! Arithmetic step that needs no model
//!
//! Evaluates problems like "What is 3^3?" or "12 divided by (1 + 3)" and
//! writes analysis, solution and verification in one go.

use async_trait::async_trait;
use thiserror::Error;

use crate::artifacts::{Confidence, ProblemAnalysis, Solution, Verification};
use crate::error::StepError;
use crate::port::ModelPort;
use crate::state::{keys, StepResult, WorkflowState};
use crate::step::{Provenance, Step};

pub const CALCULATOR: &str = "calculator";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalcError {
    #[error("not an arithmetic expression")]
    NotArithmetic,
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("result is not a finite number")]
    NonFinite,
    #[error("expression is nested too deeply")]
    TooDeep,
}

/// Bound on nested parentheses and unary signs
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    Open,
    Close,
}

/// Rewrite a natural-language problem into a bare expression
pub fn normalize(problem: &str) -> String {
    let mut expr = problem.trim().to_lowercase();
    for prefix in ["what is", "what's", "calculate", "compute", "evaluate"] {
        if let Some(rest) = expr.strip_prefix(prefix) {
            expr = rest.to_string();
            break;
        }
    }
    let expr = expr.trim().trim_end_matches(['?', '.', '!', '=']).trim();

    [
        ("to the power of", "^"),
        ("divided by", "/"),
        ("multiplied by", "*"),
        ("plus", "+"),
        ("minus", "-"),
        ("times", "*"),
    ]
    .iter()
    .fold(expr.to_string(), |acc, (word, op)| acc.replace(word, op))
}

fn tokenize(expr: &str) -> Result<Vec<Token>, CalcError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && is_number_char(&chars, i) {
                    i += 1;
                }
                // thousands separators
                let text: String = chars[start..i].iter().filter(|c| **c != ',').collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| CalcError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Num(value));
            }
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            'x' | '×' => {
                tokens.push(Token::Op('*'));
                i += 1;
            }
            '÷' => {
                tokens.push(Token::Op('/'));
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            other => return Err(CalcError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

fn is_number_char(chars: &[char], i: usize) -> bool {
    match chars[i] {
        c if c.is_ascii_digit() || c == '.' => true,
        ',' => chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// Recursive-descent evaluator
///
/// expr  := term (('+' | '-') term)*
/// term  := unary (('*' | '/') unary)*
/// unary := ('-' | '+') unary | power
/// power := atom ('^' unary)?
/// atom  := number | '(' expr ')'
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = if op == '*' {
                value * rhs
            } else if rhs == 0.0 {
                return Err(CalcError::DivisionByZero);
            } else {
                value / rhs
            };
        }
        Ok(value)
    }

    fn descend(&mut self) -> Result<(), CalcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        Ok(())
    }

    fn unary(&mut self) -> Result<f64, CalcError> {
        self.descend()?;
        let value = match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                self.unary().map(|v| -v)
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        };
        self.depth -= 1;
        value
    }

    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.atom()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, CalcError> {
        match self.next() {
            Some(Token::Num(value)) => Ok(value),
            Some(Token::Open) => {
                self.descend()?;
                let value = self.expr()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    Some(other) => Err(CalcError::UnexpectedToken(format!("{:?}", other))),
                    None => Err(CalcError::UnexpectedEnd),
                }
            }
            Some(other) => Err(CalcError::UnexpectedToken(format!("{:?}", other))),
            None => Err(CalcError::UnexpectedEnd),
        }
    }
}

/// Evaluate a bare arithmetic expression
///
/// At least one operator is required; a lone number is not arithmetic.
pub fn evaluate(expr: &str) -> Result<f64, CalcError> {
    let tokens = tokenize(expr)?;
    if !tokens.iter().any(|t| matches!(t, Token::Op(_))) {
        return Err(CalcError::NotArithmetic);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(CalcError::UnexpectedToken(format!("{:?}", token)));
    }
    if !value.is_finite() {
        return Err(CalcError::NonFinite);
    }
    Ok(value)
}

/// Integral values print without a fractional part
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{:.10}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Calculator node: pure computation over the `problem` field
#[derive(Debug, Clone, Default)]
pub struct CalculatorStep;

impl CalculatorStep {
    pub fn new() -> Self {
        Self
    }

    /// Analysis, solution and verification for `problem`
    pub fn solve(problem: &str) -> (ProblemAnalysis, Solution, Verification) {
        let expr = normalize(problem);
        match evaluate(&expr) {
            Ok(value) => {
                let answer = format_number(value);
                tracing::info!(expr = %expr, answer = %answer, "Calculated");
                (
                    ProblemAnalysis {
                        problem_type: "arithmetic".to_string(),
                        key_constraints: vec!["basic math only".to_string()],
                        approach: "Direct computation".to_string(),
                    },
                    Solution {
                        answer: answer.clone(),
                        reasoning_steps: vec![
                            format!("Evaluated: {}", expr),
                            format!("Result: {}", answer),
                        ],
                        confidence: Confidence::High,
                    },
                    Verification {
                        is_correct: true,
                        issues_found: Vec::new(),
                        final_answer: answer,
                    },
                )
            }
            Err(e) => {
                tracing::info!(expr = %expr, "Not a simple arithmetic problem: {}", e);
                (
                    ProblemAnalysis {
                        problem_type: "non-arithmetic".to_string(),
                        key_constraints: vec!["basic math only".to_string()],
                        approach: "Direct computation not applicable".to_string(),
                    },
                    Solution {
                        answer: format!("Unable to compute: {}", e),
                        reasoning_steps: vec![format!("Attempted to evaluate: {}", expr)],
                        confidence: Confidence::Low,
                    },
                    Verification {
                        is_correct: false,
                        issues_found: vec![format!("Calculator only handles basic arithmetic ({})", e)],
                        final_answer: String::new(),
                    },
                )
            }
        }
    }
}

#[async_trait]
impl Step for CalculatorStep {
    fn name(&self) -> &str {
        CALCULATOR
    }

    async fn execute(
        &self,
        _port: &ModelPort,
        state: &WorkflowState,
    ) -> Result<StepResult, StepError> {
        let (analysis, solution, verification) = Self::solve(&state.str(keys::PROBLEM, ""));
        Ok(StepResult::new()
            .with_artifact(&analysis)
            .with_artifact(&solution)
            .with_artifact(&verification)
            .with(keys::source_key(CALCULATOR), Provenance::Computed.as_str()))
    }
}
