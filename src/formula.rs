// 🧮 Formula Evaluator - One parse path for validate / preview / evaluate
// Formulas are "=" followed by a pure arithmetic expression over numeric
// literals, + - * /, parentheses, and uppercase column letters A..Z bound
// positionally to the owning category's columns. No functions, no ranges,
// no cross-category references: evaluation is deterministic and re-entrant,
// so totals can be recomputed on every read without caching.

use crate::document::{column_letter, Category, Item};
use std::fmt;

// ============================================================================
// ERRORS
// ============================================================================

/// Edit-time formula rejection
///
/// These surface while a formula is being authored; a formula that
/// passed validation never raises at read time (`evaluate_item`
/// degrades to 0 instead).
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaError {
    /// Formula does not start with '='
    MissingEquals,
    /// Nothing after the '='
    Empty,
    /// Character the tokenizer does not understand
    UnexpectedChar(char),
    /// Column letter beyond the category's column count
    ColumnOutOfRange { letter: char, column_count: usize },
    /// Closing parenthesis without a matching open (or vice versa)
    UnbalancedParenthesis,
    /// Operator or operand in the wrong place
    UnexpectedToken(String),
    /// Expression ended while an operand was still expected
    UnexpectedEnd,
    /// Evaluation with placeholder inputs produced a non-finite result
    NonFiniteResult,
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaError::MissingEquals => write!(f, "Formula must start with '='"),
            FormulaError::Empty => write!(f, "Formula is empty"),
            FormulaError::UnexpectedChar(c) => write!(f, "Unexpected character '{}'", c),
            FormulaError::ColumnOutOfRange {
                letter,
                column_count,
            } => write!(
                f,
                "Column {} does not exist (this category has {} column{})",
                letter,
                column_count,
                if *column_count == 1 { "" } else { "s" }
            ),
            FormulaError::UnbalancedParenthesis => write!(f, "Unbalanced parenthesis"),
            FormulaError::UnexpectedToken(t) => write!(f, "Unexpected '{}'", t),
            FormulaError::UnexpectedEnd => write!(f, "Formula ends unexpectedly"),
            FormulaError::NonFiniteResult => {
                write!(f, "Formula divides by zero or overflows")
            }
        }
    }
}

impl std::error::Error for FormulaError {}

// ============================================================================
// TOKENIZER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Column(usize),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("{}", n),
            Token::Column(i) => column_letter(*i).to_string(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

fn tokenize(body: &str, column_count: usize) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = body.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            'A'..='Z' => {
                chars.next();
                let index = (c as u8 - b'A') as usize;
                if index >= column_count {
                    return Err(FormulaError::ColumnOutOfRange {
                        letter: c,
                        column_count,
                    });
                }
                tokens.push(Token::Column(index));
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = literal
                    .parse()
                    .map_err(|_| FormulaError::UnexpectedToken(literal.clone()))?;
                tokens.push(Token::Number(value));
            }
            other => return Err(FormulaError::UnexpectedChar(other)),
        }
    }

    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }
    Ok(tokens)
}

// ============================================================================
// AST & PARSER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Column(usize),
    Negate(Box<Expr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // expr := term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.parse_term()?;
        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.next();
            let rhs = self.parse_term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // term := factor (('*' | '/') factor)*
    fn parse_term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.parse_factor()?;
        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            self.next();
            let rhs = self.parse_factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // factor := '-' factor | number | column | '(' expr ')'
    fn parse_factor(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some(Token::Minus) => Ok(Expr::Negate(Box::new(self.parse_factor()?))),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Column(i)) => Ok(Expr::Column(i)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(FormulaError::UnbalancedParenthesis),
                }
            }
            Some(Token::RParen) => Err(FormulaError::UnbalancedParenthesis),
            Some(token) => Err(FormulaError::UnexpectedToken(token.describe())),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }
}

fn eval_expr(expr: &Expr, values: &[f64]) -> f64 {
    match expr {
        Expr::Number(n) => *n,
        Expr::Column(i) => values.get(*i).copied().unwrap_or(0.0),
        Expr::Negate(inner) => -eval_expr(inner, values),
        Expr::Binary { op, lhs, rhs } => {
            let l = eval_expr(lhs, values);
            let r = eval_expr(rhs, values);
            match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => l / r,
            }
        }
    }
}

// ============================================================================
// COMPILED FORMULA
// ============================================================================

/// A parsed formula, ready to evaluate against rows of column values
///
/// Every column reference was range-checked against the column count at
/// compile time, so `eval` cannot fail; it can only produce a non-finite
/// number (division by zero), which callers clamp as they see fit.
#[derive(Debug, Clone)]
pub struct CompiledFormula {
    root: Expr,
}

impl CompiledFormula {
    pub fn eval(&self, values: &[f64]) -> f64 {
        eval_expr(&self.root, values)
    }
}

/// Parse a formula string against a column count
pub fn compile(formula: &str, column_count: usize) -> Result<CompiledFormula, FormulaError> {
    let body = match formula.strip_prefix('=') {
        Some(rest) => rest,
        None => return Err(FormulaError::MissingEquals),
    };

    let tokens = tokenize(body, column_count)?;
    let mut parser = Parser { tokens, pos: 0 };
    let root = parser.parse_expr()?;

    // Anything left over means two operands collided, e.g. "=A B"
    if let Some(extra) = parser.peek() {
        if *extra == Token::RParen {
            return Err(FormulaError::UnbalancedParenthesis);
        }
        return Err(FormulaError::UnexpectedToken(extra.describe()));
    }

    Ok(CompiledFormula { root })
}

// ============================================================================
// VALIDATE / PREVIEW / EVALUATE
// ============================================================================

/// Outcome of edit-time validation
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub valid: bool,
    pub error: Option<String>,
}

/// Validate a formula against a column count, without touching item data
///
/// Every column letter is substituted with 1 and the expression is
/// evaluated once; a non-finite result (e.g. a literal division by
/// zero) is rejected alongside parse errors.
pub fn validate_formula(formula: &str, column_count: usize) -> Validation {
    let compiled = match compile(formula, column_count) {
        Ok(c) => c,
        Err(e) => {
            return Validation {
                valid: false,
                error: Some(e.to_string()),
            }
        }
    };

    let ones = vec![1.0; column_count];
    if !compiled.eval(&ones).is_finite() {
        return Validation {
            valid: false,
            error: Some(FormulaError::NonFiniteResult.to_string()),
        };
    }

    Validation {
        valid: true,
        error: None,
    }
}

/// Outcome of an authoring-time preview
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub success: bool,
    pub result: Option<f64>,
}

/// Evaluate a formula against the fixed illustrative vector
///
/// Column position `i` previews with `10 * (i + 1)`: A=10, B=20, C=30,
/// and so on. The sequence is stable so an editor sees consistent
/// representative results while authoring, independent of real items.
pub fn preview_formula(formula: &str, column_count: usize) -> Preview {
    let compiled = match compile(formula, column_count) {
        Ok(c) => c,
        Err(_) => {
            return Preview {
                success: false,
                result: None,
            }
        }
    };

    let vector: Vec<f64> = (0..column_count).map(|i| 10.0 * (i as f64 + 1.0)).collect();
    let result = compiled.eval(&vector);
    if !result.is_finite() {
        return Preview {
            success: false,
            result: None,
        };
    }

    Preview {
        success: true,
        result: Some(result),
    }
}

/// Line total for one item: the category formula over the item's row
///
/// Never fails and never returns NaN/infinity. A malformed formula that
/// survived editing, or a division producing a non-finite value, yields
/// 0 for this item without disturbing sibling items - correctness is
/// enforced at edit time by `validate_formula`, not here.
pub fn evaluate_item(item: &Item, category: &Category) -> f64 {
    let compiled = match compile(&category.formula, category.columns.len()) {
        Ok(c) => c,
        Err(_) => return 0.0,
    };

    let result = compiled.eval(&category.row_values(item));
    if result.is_finite() {
        result
    } else {
        0.0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Column;
    use std::collections::BTreeMap;

    fn category_with(columns: &[&str], formula: &str) -> Category {
        let cols = columns
            .iter()
            .map(|id| Column::custom(id, id))
            .collect::<Vec<_>>();
        Category::new("Test", "folder", "slate").with_schema(cols, formula)
    }

    fn item_with(pairs: &[(&str, f64)]) -> Item {
        let mut values = BTreeMap::new();
        for (k, v) in pairs {
            values.insert(k.to_string(), *v);
        }
        Item {
            id: 1,
            name: "test".to_string(),
            values,
        }
    }

    #[test]
    fn test_validate_in_range_and_out_of_range() {
        assert!(validate_formula("=A*B", 2).valid);

        let v = validate_formula("=A*C", 2);
        assert!(!v.valid);
        assert!(v.error.unwrap().contains("Column C"));
    }

    #[test]
    fn test_validate_rejects_malformed() {
        assert!(!validate_formula("A*B", 2).valid); // no '='
        assert!(!validate_formula("=", 2).valid); // empty
        assert!(!validate_formula("=A+", 2).valid); // dangling operator
        assert!(!validate_formula("=(A+B", 2).valid); // open paren
        assert!(!validate_formula("=A+B)", 2).valid); // stray close
        assert!(!validate_formula("=A B", 2).valid); // adjacent operands
        assert!(!validate_formula("=A$B", 2).valid); // junk character
        assert!(!validate_formula("=A/0", 2).valid); // literal division by zero
    }

    #[test]
    fn test_precedence_and_parentheses() {
        let c = compile("=A+B*2", 2).unwrap();
        assert_eq!(c.eval(&[1.0, 3.0]), 7.0);

        let c = compile("=(A+B)*2", 2).unwrap();
        assert_eq!(c.eval(&[1.0, 3.0]), 8.0);

        let c = compile("=-A+10", 1).unwrap();
        assert_eq!(c.eval(&[4.0]), 6.0);
    }

    #[test]
    fn test_preview_uses_stable_vector() {
        // A=10, B=20
        let p = preview_formula("=A*B", 2);
        assert!(p.success);
        assert_eq!(p.result, Some(200.0));

        let p = preview_formula("=A*", 2);
        assert!(!p.success);
        assert_eq!(p.result, None);
    }

    #[test]
    fn test_evaluate_spec_example() {
        // columns [fee, qty, perfPct], "=A*B*(C/100)"
        let cat = category_with(&["fee", "qty", "perfPct"], "=A*B*(C/100)");
        let item = item_with(&[("fee", 5.5), ("qty", 2.0), ("perfPct", 100.0)]);
        assert_eq!(evaluate_item(&item, &cat), 11.0);
    }

    #[test]
    fn test_evaluate_missing_values_default_to_zero() {
        let cat = category_with(&["fee", "qty"], "=A*B");
        let item = item_with(&[("fee", 5.5)]);
        assert_eq!(evaluate_item(&item, &cat), 0.0);
    }

    #[test]
    fn test_evaluate_degrades_to_zero_on_bad_formula() {
        let cat = category_with(&["fee"], "=A*"); // survived editing somehow
        let item = item_with(&[("fee", 5.5)]);
        assert_eq!(evaluate_item(&item, &cat), 0.0);
    }

    #[test]
    fn test_evaluate_clamps_non_finite() {
        let cat = category_with(&["fee", "qty"], "=A/B");
        let item = item_with(&[("fee", 5.0), ("qty", 0.0)]);
        assert_eq!(evaluate_item(&item, &cat), 0.0);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let cat = category_with(&["fee", "qty"], "=A*B");
        let item = item_with(&[("fee", 3.0), ("qty", 4.0)]);
        assert_eq!(evaluate_item(&item, &cat), evaluate_item(&item, &cat));
    }

    #[test]
    fn test_decimal_literals() {
        let c = compile("=A*1.5", 1).unwrap();
        assert_eq!(c.eval(&[2.0]), 3.0);
    }
}
