//! Seed-time formulas.
//!
//! A formula computes the required seed time of a rule from its `min_time`,
//! the torrent size and the configured buffer, e.g.
//!
//! ```text
//! ({min!r}+(timedelta(hours=2)*{size!r})) * {buffer}
//! ```
//!
//! Formulas come from user configuration, so they are never handed to a
//! general purpose evaluator. The grammar is closed:
//!
//! ```text
//! expr    := term ('+' term)*
//! term    := factor ('*' factor)*
//! factor  := NUMBER | '{' VAR ['!r'] '}' | call | '(' expr ')'
//! call    := ['datetime' '.'] 'timedelta' '(' [arg (',' arg)*] ')'
//! arg     := [UNIT '='] expr
//! ```
//!
//! Every formula is type checked when parsed: it must produce a duration,
//! and durations can only be added to durations or scaled by numbers.

use crate::core::error::RuleError;
use std::fmt;
use std::time::Duration;

const MAX_DEPTH: usize = 32;
/// Bounds the expression tree, whose checks recurse once per operator.
const MAX_TOKENS: usize = 256;

/// Values bound into a formula at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormulaInputs {
    pub min_time: Duration,
    pub size_gib: f64,
    pub buffer: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    /// The rule's `min_time` (a duration)
    Min,
    /// Torrent wanted size in GiB (a number)
    Size,
    /// Seed buffer multiplier (a number)
    Buffer,
}

impl Variable {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "min" => Some(Variable::Min),
            "size" => Some(Variable::Size),
            "buffer" => Some(Variable::Buffer),
            _ => None,
        }
    }

    fn kind(&self) -> Kind {
        match self {
            Variable::Min => Kind::Duration,
            Variable::Size | Variable::Buffer => Kind::Number,
        }
    }
}

/// `timedelta` units, in Python's positional argument order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Days,
    Seconds,
    Microseconds,
    Milliseconds,
    Minutes,
    Hours,
    Weeks,
}

const POSITIONAL_UNITS: [Unit; 7] = [
    Unit::Days,
    Unit::Seconds,
    Unit::Microseconds,
    Unit::Milliseconds,
    Unit::Minutes,
    Unit::Hours,
    Unit::Weeks,
];

impl Unit {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "days" => Some(Unit::Days),
            "seconds" => Some(Unit::Seconds),
            "microseconds" => Some(Unit::Microseconds),
            "milliseconds" => Some(Unit::Milliseconds),
            "minutes" => Some(Unit::Minutes),
            "hours" => Some(Unit::Hours),
            "weeks" => Some(Unit::Weeks),
            _ => None,
        }
    }

    fn seconds(&self) -> f64 {
        match self {
            Unit::Days => 86_400.0,
            Unit::Seconds => 1.0,
            Unit::Microseconds => 1e-6,
            Unit::Milliseconds => 1e-3,
            Unit::Minutes => 60.0,
            Unit::Hours => 3_600.0,
            Unit::Weeks => 604_800.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(Variable),
    Timedelta(Vec<(Unit, Expr)>),
    Add(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Number,
    Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Number(f64),
    /// Duration in seconds
    Duration(f64),
}

/// A parsed and type checked formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, RuleError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            position: 0,
            depth: 0,
        };
        let expr = parser.parse_expr()?;
        if let Some(token) = parser.peek() {
            return Err(invalid(format!("unexpected {token}")));
        }

        match infer(&expr)? {
            Kind::Duration => Ok(Self {
                source: source.to_string(),
                expr,
            }),
            Kind::Number => Err(RuleError::InvalidFormulaResult(format!(
                "'{source}' produces a number"
            ))),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, inputs: &FormulaInputs) -> Result<Duration, RuleError> {
        match eval(&self.expr, inputs)? {
            Value::Duration(seconds) => Duration::try_from_secs_f64(seconds).map_err(|err| {
                RuleError::InvalidFormulaResult(format!("'{}' gave {seconds}s: {err}", self.source))
            }),
            Value::Number(_) => Err(RuleError::InvalidFormulaResult(format!(
                "'{}' produces a number",
                self.source
            ))),
        }
    }
}

fn invalid(message: impl Into<String>) -> RuleError {
    RuleError::InvalidFormula(message.into())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Placeholder(Variable),
    Plus,
    Star,
    LParen,
    RParen,
    Comma,
    Equals,
    Dot,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {n}"),
            Token::Ident(name) => write!(f, "name '{name}'"),
            Token::Placeholder(var) => write!(f, "placeholder {var:?}"),
            Token::Plus => f.write_str("'+'"),
            Token::Star => f.write_str("'*'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
            Token::Equals => f.write_str("'='"),
            Token::Dot => f.write_str("'.'"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, RuleError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Equals);
                i += 1;
            }
            '.' if !chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '{' => {
                let end = chars[i..]
                    .iter()
                    .position(|&c| c == '}')
                    .map(|offset| i + offset)
                    .ok_or_else(|| invalid("unterminated placeholder"))?;
                let inner: String = chars[i + 1..end].iter().collect();
                let name = inner.strip_suffix("!r").unwrap_or(&inner);
                let var = Variable::from_name(name)
                    .ok_or_else(|| invalid(format!("unknown placeholder '{{{inner}}}'")))?;
                tokens.push(Token::Placeholder(var));
                i = end + 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("bad number '{text}'")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(invalid(format!("unexpected character '{other}'"))),
        }
        if tokens.len() > MAX_TOKENS {
            return Err(invalid(format!("formula is longer than {MAX_TOKENS} tokens")));
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.position + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), RuleError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(invalid(format!("expected {expected}, found {token}"))),
            None => Err(invalid(format!("expected {expected}, found end of formula"))),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, RuleError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(invalid("formula is nested too deeply"));
        }

        let mut left = self.parse_term()?;
        while self.peek() == Some(&Token::Plus) {
            self.position += 1;
            let right = self.parse_term()?;
            left = Expr::Add(Box::new(left), Box::new(right));
        }

        self.depth -= 1;
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, RuleError> {
        let mut left = self.parse_factor()?;
        while self.peek() == Some(&Token::Star) {
            self.position += 1;
            let right = self.parse_factor()?;
            left = Expr::Mul(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, RuleError> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Placeholder(var)) => Ok(Expr::Variable(var)),
            Some(Token::LParen) => {
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(Token::Ident(name)) => self.parse_call(&name),
            Some(token) => Err(invalid(format!("unexpected {token}"))),
            None => Err(invalid("unexpected end of formula")),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Expr, RuleError> {
        match name {
            "timedelta" => {}
            "datetime" => {
                self.expect(Token::Dot)?;
                match self.next() {
                    Some(Token::Ident(attr)) if attr == "timedelta" => {}
                    Some(token) => {
                        return Err(invalid(format!("attribute {token} is not allowed")))
                    }
                    None => return Err(invalid("unexpected end of formula")),
                }
            }
            other => return Err(invalid(format!("name '{other}' is not allowed"))),
        }

        self.expect(Token::LParen)?;
        let mut args: Vec<(Unit, Expr)> = Vec::new();
        let mut positional = 0;
        let mut seen_keyword = false;

        if self.peek() == Some(&Token::RParen) {
            self.position += 1;
            return Ok(Expr::Timedelta(args));
        }

        loop {
            let unit = match (self.peek(), self.peek_at(1)) {
                (Some(Token::Ident(unit_name)), Some(Token::Equals)) => {
                    let unit = Unit::from_name(unit_name).ok_or_else(|| {
                        invalid(format!("unknown timedelta argument '{unit_name}'"))
                    })?;
                    self.position += 2;
                    seen_keyword = true;
                    unit
                }
                _ => {
                    if seen_keyword {
                        return Err(invalid("positional argument follows keyword argument"));
                    }
                    let unit = *POSITIONAL_UNITS
                        .get(positional)
                        .ok_or_else(|| invalid("too many timedelta arguments"))?;
                    positional += 1;
                    unit
                }
            };

            if args.iter().any(|(existing, _)| *existing == unit) {
                return Err(invalid(format!("duplicate timedelta argument {unit:?}")));
            }
            let value = self.parse_expr()?;
            args.push((unit, value));

            match self.next() {
                Some(Token::Comma) if self.peek() == Some(&Token::RParen) => {
                    self.position += 1;
                    break;
                }
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                Some(token) => return Err(invalid(format!("unexpected {token}"))),
                None => return Err(invalid("unterminated timedelta call")),
            }
        }

        Ok(Expr::Timedelta(args))
    }
}

fn infer(expr: &Expr) -> Result<Kind, RuleError> {
    match expr {
        Expr::Number(_) => Ok(Kind::Number),
        Expr::Variable(var) => Ok(var.kind()),
        Expr::Timedelta(args) => {
            for (unit, arg) in args {
                if infer(arg)? != Kind::Number {
                    return Err(invalid(format!("timedelta {unit:?} must be a number")));
                }
            }
            Ok(Kind::Duration)
        }
        Expr::Add(left, right) => match (infer(left)?, infer(right)?) {
            (Kind::Number, Kind::Number) => Ok(Kind::Number),
            (Kind::Duration, Kind::Duration) => Ok(Kind::Duration),
            _ => Err(invalid("cannot add a number and a duration")),
        },
        Expr::Mul(left, right) => match (infer(left)?, infer(right)?) {
            (Kind::Number, Kind::Number) => Ok(Kind::Number),
            (Kind::Duration, Kind::Number) | (Kind::Number, Kind::Duration) => Ok(Kind::Duration),
            (Kind::Duration, Kind::Duration) => Err(invalid("cannot multiply two durations")),
        },
    }
}

fn eval(expr: &Expr, inputs: &FormulaInputs) -> Result<Value, RuleError> {
    let value = match expr {
        Expr::Number(n) => Value::Number(*n),
        Expr::Variable(Variable::Min) => Value::Duration(inputs.min_time.as_secs_f64()),
        Expr::Variable(Variable::Size) => Value::Number(inputs.size_gib),
        Expr::Variable(Variable::Buffer) => Value::Number(inputs.buffer),
        Expr::Timedelta(args) => {
            let mut seconds = 0.0;
            for (unit, arg) in args {
                match eval(arg, inputs)? {
                    Value::Number(n) => seconds += n * unit.seconds(),
                    Value::Duration(_) => {
                        return Err(invalid(format!("timedelta {unit:?} must be a number")))
                    }
                }
            }
            Value::Duration(seconds)
        }
        Expr::Add(left, right) => match (eval(left, inputs)?, eval(right, inputs)?) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::Duration(a), Value::Duration(b)) => Value::Duration(a + b),
            _ => return Err(invalid("cannot add a number and a duration")),
        },
        Expr::Mul(left, right) => match (eval(left, inputs)?, eval(right, inputs)?) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a * b),
            (Value::Duration(d), Value::Number(n)) | (Value::Number(n), Value::Duration(d)) => {
                Value::Duration(d * n)
            }
            (Value::Duration(_), Value::Duration(_)) => {
                return Err(invalid("cannot multiply two durations"))
            }
        },
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: u64 = 3_600;
    const DAY: u64 = 86_400;

    fn inputs(min_secs: u64, size_gib: f64, buffer: f64) -> FormulaInputs {
        FormulaInputs {
            min_time: Duration::from_secs(min_secs),
            size_gib,
            buffer,
        }
    }

    #[test]
    fn test_default_tracker_formula() {
        let formula = Formula::parse("({min!r}+(timedelta(hours=2)*{size!r})) * {buffer}").unwrap();
        // (3 days + 2h * 4) * 1.5 = 4.5 days + 12h
        let result = formula.evaluate(&inputs(3 * DAY, 4.0, 1.5)).unwrap();
        assert_eq!(result, Duration::from_secs(4 * DAY + 12 * HOUR + 12 * HOUR));
    }

    #[test]
    fn test_datetime_attribute_and_positional_args() {
        let formula = Formula::parse("datetime.timedelta(1, 30) + {min}").unwrap();
        let result = formula.evaluate(&inputs(60, 0.0, 1.0)).unwrap();
        assert_eq!(result, Duration::from_secs(DAY + 30 + 60));
    }

    #[test]
    fn test_number_times_duration_commutes() {
        let a = Formula::parse("2 * timedelta(minutes=30)").unwrap();
        let b = Formula::parse("timedelta(minutes=30) * 2").unwrap();
        let values = inputs(0, 0.0, 1.0);
        assert_eq!(a.evaluate(&values).unwrap(), Duration::from_secs(HOUR));
        assert_eq!(b.evaluate(&values).unwrap(), Duration::from_secs(HOUR));
    }

    #[test]
    fn test_precedence_multiplication_binds_tighter() {
        let formula = Formula::parse("{min} + timedelta(hours=1) * 2").unwrap();
        let result = formula.evaluate(&inputs(HOUR, 0.0, 1.0)).unwrap();
        assert_eq!(result, Duration::from_secs(3 * HOUR));
    }

    #[test]
    fn test_rejects_disallowed_grammar() {
        let rejected = [
            "__import__('os').system('rm -rf /')",
            "{min} - timedelta(hours=1)",
            "{min} / 2",
            "open('/etc/passwd')",
            "datetime.now()",
            "timedelta(hours=1)[0]",
            "{min} ** 2",
            "{secret}",
            "timedelta(fortnights=1)",
            "timedelta(hours=1, hours=2)",
            "timedelta(hours=1, 2)",
            "timedelta(1, 2, 3, 4, 5, 6, 7, 8)",
            "({min}",
            "{min} +",
            "",
        ];
        for source in rejected {
            assert!(
                matches!(Formula::parse(source), Err(RuleError::InvalidFormula(_))),
                "accepted {source:?}"
            );
        }
    }

    #[test]
    fn test_rejects_type_errors() {
        for source in [
            "{min} + 1",
            "{min} * {min}",
            "timedelta(hours={min})",
        ] {
            assert!(
                matches!(Formula::parse(source), Err(RuleError::InvalidFormula(_))),
                "accepted {source:?}"
            );
        }
    }

    #[test]
    fn test_number_result_is_rejected() {
        assert!(matches!(
            Formula::parse("{size} * {buffer}"),
            Err(RuleError::InvalidFormulaResult(_))
        ));
        assert!(matches!(
            Formula::parse("42"),
            Err(RuleError::InvalidFormulaResult(_))
        ));
    }

    #[test]
    fn test_overflowing_result_is_rejected() {
        let formula = Formula::parse("timedelta(weeks=1) * {size}").unwrap();
        let result = formula.evaluate(&inputs(0, f64::MAX, 1.0));
        assert!(matches!(result, Err(RuleError::InvalidFormulaResult(_))));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("{}{{min}}{}", "(".repeat(100), ")".repeat(100));
        assert!(matches!(
            Formula::parse(&source),
            Err(RuleError::InvalidFormula(_))
        ));
    }

    #[test]
    fn test_long_operator_chain_is_rejected() {
        let source = format!("timedelta(hours=1){}", "*1".repeat(50_000));
        assert!(matches!(
            Formula::parse(&source),
            Err(RuleError::InvalidFormula(_))
        ));

        let source = format!("{{min}}{}", "+{min}".repeat(50_000));
        assert!(matches!(
            Formula::parse(&source),
            Err(RuleError::InvalidFormula(_))
        ));
    }

    #[test]
    fn test_chain_within_token_limit_evaluates() {
        // 6 tokens for the call, 2 per factor
        let source = format!("timedelta(hours=1){}", "*1".repeat(100));
        let formula = Formula::parse(&source).unwrap();
        let result = formula.evaluate(&inputs(0, 0.0, 1.0)).unwrap();
        assert_eq!(result, Duration::from_secs(HOUR));
    }

    #[test]
    fn test_source_is_kept() {
        let formula = Formula::parse("{min} * {buffer}").unwrap();
        assert_eq!(formula.source(), "{min} * {buffer}");
        assert!(matches!(formula.expr, Expr::Mul(_, _)));
    }
}
