use crate::error::{ExpressionError, TaylorError};
use crate::series::TaylorSeries;
use crate::traits::{Scalar, SeriesSystem};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of Taylor series; every instruction maps to
/// one validated series operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant series.
    LoadConst(f64),
    /// Pushes a state series (by index).
    /// Indices correspond to the order variables were defined (e.g., 0=u, 1=v).
    LoadVar(usize),
    /// Pushes a parameter series (by index).
    LoadParam(usize),
    /// Pushes the current time as a constant series.
    LoadTime,
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b) through truncated multiplication.
    Mul,
    /// Pops top value (a), pushes (a * c).
    Scale(f64),
    /// Pops top value (a), pushes (a / c).
    DivConst(f64),
    /// Pops top value (a), pushes a^n.
    PowInt(u32),
    /// Pops top value (a), pushes -a.
    Neg,
}

/// Represents a compiled sequence of operations.
///
/// Only [`Compiler`] produces bytecode, which keeps the stack balanced.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn ops(&self) -> &[OpCode] {
        &self.ops
    }
}

/// Stack-based Virtual Machine for evaluating equations on Taylor models.
pub struct VM;

impl VM {
    /// Executes the bytecode.
    ///
    /// `x` holds the state series followed by the parameter series;
    /// `variables` is the number of state series at its front.
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        t: T,
        x: &[TaylorSeries<T>],
        variables: usize,
        stack: &mut Vec<TaylorSeries<T>>,
    ) -> Result<TaylorSeries<T>, TaylorError> {
        let index = x
            .first()
            .map(|s| Rc::clone(s.index()))
            .ok_or(TaylorError::LengthMismatch { left: 0, right: 1 })?;
        let constant = |value: T| TaylorSeries::constant(Rc::clone(&index), value);
        let from_f64 = |value: f64| T::from_f64(value).unwrap_or_else(T::nan);
        let load = |slot: usize| {
            x.get(slot).cloned().ok_or(TaylorError::LengthMismatch {
                left: x.len(),
                right: slot + 1,
            })
        };

        stack.clear();
        for op in &bytecode.ops {
            let next = match *op {
                OpCode::LoadConst(value) => constant(from_f64(value)),
                OpCode::LoadVar(idx) => load(idx)?,
                OpCode::LoadParam(idx) => load(variables + idx)?,
                OpCode::LoadTime => constant(t),
                OpCode::Add => {
                    let (a, b) = pop_pair(stack);
                    a.checked_add(&b)?
                }
                OpCode::Sub => {
                    let (a, b) = pop_pair(stack);
                    a.checked_sub(&b)?
                }
                OpCode::Mul => {
                    let (a, b) = pop_pair(stack);
                    a.checked_mul(&b)?
                }
                OpCode::Scale(c) => pop(stack).scale(from_f64(c)),
                OpCode::DivConst(c) => pop(stack).checked_div(from_f64(c))?,
                OpCode::PowInt(n) => pop(stack).powi(n)?,
                OpCode::Neg => pop(stack).negate(),
            };
            stack.push(next);
        }

        Ok(stack.pop().unwrap_or_else(|| constant(T::zero())))
    }
}

fn pop<T: Scalar>(stack: &mut Vec<TaylorSeries<T>>) -> TaylorSeries<T> {
    stack.pop().expect("compiled bytecode keeps the stack balanced")
}

fn pop_pair<T: Scalar>(stack: &mut Vec<TaylorSeries<T>>) -> (TaylorSeries<T>, TaylorSeries<T>) {
    let b = pop(stack);
    let a = pop(stack);
    (a, b)
}

// --- AST & Parser ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Unary(char, Box<Expr>),             // -
    Call(String, Box<Expr>),            // parsed so it can be rejected by name
}

impl Expr {
    /// Value of the expression if it involves no variables.
    fn constant_value(&self) -> Option<f64> {
        match self {
            Expr::Number(n) => Some(*n),
            Expr::Unary('-', inner) => inner.constant_value().map(|v| -v),
            Expr::Binary(left, op, right) => {
                let (a, b) = (left.constant_value()?, right.constant_value()?);
                match op {
                    '+' => Some(a + b),
                    '-' => Some(a - b),
                    '*' => Some(a * b),
                    '/' => Some(a / b),
                    '^' => Some(a.powf(b)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Compiles an AST (`Expr`) into `Bytecode`.
/// Resolves variable and parameter names to indices; the bare name `t`
/// refers to time unless it is declared as a variable or parameter.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
    pub param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String], param_names: &[String]) -> Self {
        let var_map = var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let param_map = param_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { var_map, param_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, ExpressionError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), ExpressionError> {
        if let Some(value) = expr.constant_value() {
            ops.push(OpCode::LoadConst(value));
            return Ok(());
        }

        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some(&idx) = self.param_map.get(name) {
                    ops.push(OpCode::LoadParam(idx));
                } else if name == "t" {
                    ops.push(OpCode::LoadTime);
                } else {
                    return Err(ExpressionError::UnknownIdentifier(name.clone()));
                }
            }
            Expr::Binary(left, op, right) => match op {
                '*' => {
                    if let Some(c) = left.constant_value() {
                        self.compile_recursive(right, ops)?;
                        ops.push(OpCode::Scale(c));
                    } else if let Some(c) = right.constant_value() {
                        self.compile_recursive(left, ops)?;
                        ops.push(OpCode::Scale(c));
                    } else {
                        self.compile_recursive(left, ops)?;
                        self.compile_recursive(right, ops)?;
                        ops.push(OpCode::Mul);
                    }
                }
                '/' => {
                    let c = right
                        .constant_value()
                        .ok_or(ExpressionError::NonConstantDivisor)?;
                    self.compile_recursive(left, ops)?;
                    ops.push(OpCode::DivConst(c));
                }
                '^' => {
                    let n = right
                        .constant_value()
                        .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64)
                        .ok_or_else(|| ExpressionError::InvalidExponent(format!("{:?}", right)))?;
                    self.compile_recursive(left, ops)?;
                    ops.push(OpCode::PowInt(n as u32));
                }
                '+' | '-' => {
                    self.compile_recursive(left, ops)?;
                    self.compile_recursive(right, ops)?;
                    ops.push(if *op == '+' { OpCode::Add } else { OpCode::Sub });
                }
                _ => return Err(ExpressionError::Syntax(format!("unknown binary operator {op}"))),
            },
            Expr::Unary(op, operand) => {
                if *op != '-' {
                    return Err(ExpressionError::Syntax(format!("unknown unary operator {op}")));
                }
                self.compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(func, _) => return Err(ExpressionError::UnsupportedFunction(func.clone())),
        }
        Ok(())
    }
}

// --- Simple Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ExpressionError::Syntax(format!(
            "unexpected trailing token {:?}",
            token
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                let exponent_sign = (d == '+' || d == '-') && num_str.ends_with(['e', 'E']);
                if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| ExpressionError::InvalidNumber(num_str.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => return Err(ExpressionError::UnexpectedCharacter(other)),
            };
            tokens.push(token);
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_rparen(&mut self) -> Result<(), ExpressionError> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            _ => Err(ExpressionError::Syntax("expected ')'".to_string())),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_product()?;

        loop {
            let op = match self.peek() {
                Some(Token::Plus) => '+',
                Some(Token::Minus) => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_product()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek() {
                Some(Token::Star) => '*',
                Some(Token::Slash) => '/',
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    // Unary minus binds looser than '^', so -u^2 is -(u^2).
    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary('-', Box::new(expr)));
        }
        self.parse_power()
    }

    // Right-associative: a^b^c is a^(b^c).
    fn parse_power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume(); // eat '('
                    let arg = self.parse_expression()?;
                    self.expect_rparen()?;
                    Ok(Expr::Call(name, Box::new(arg)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some(token) => Err(ExpressionError::Syntax(format!(
                "unexpected token {:?}",
                token
            ))),
            None => Err(ExpressionError::Syntax(
                "unexpected end of expression".to_string(),
            )),
        }
    }
}

// --- EquationSystem ---

/// A concrete implementation of `SeriesSystem` that uses the VM.
/// Contains one compiled bytecode expression per state variable.
pub struct EquationSystem<T: Scalar> {
    pub equations: Vec<Bytecode>,
    pub var_names: Vec<String>,
    pub param_names: Vec<String>,
    // Interior mutability for VM stack to avoid allocation in apply.
    stack: RefCell<Vec<TaylorSeries<T>>>,
}

impl<T: Scalar> EquationSystem<T> {
    pub fn new(equations: Vec<Bytecode>, var_names: Vec<String>, param_names: Vec<String>) -> Self {
        Self {
            equations,
            var_names,
            param_names,
            stack: RefCell::new(Vec::with_capacity(16)),
        }
    }

    /// Parses and compiles one right-hand side per variable.
    pub fn from_sources(
        sources: &[String],
        var_names: &[String],
        param_names: &[String],
    ) -> Result<Self, ExpressionError> {
        if sources.len() != var_names.len() {
            return Err(ExpressionError::Syntax(format!(
                "expected {} equations, got {}",
                var_names.len(),
                sources.len()
            )));
        }
        let compiler = Compiler::new(var_names, param_names);
        let equations = sources
            .iter()
            .map(|src| parse(src).and_then(|expr| compiler.compile(&expr)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(equations, var_names.to_vec(), param_names.to_vec()))
    }
}

impl<T: Scalar> SeriesSystem<T> for EquationSystem<T> {
    fn dimension(&self) -> usize {
        self.equations.len()
    }

    fn apply(
        &self,
        t: T,
        x: &[TaylorSeries<T>],
        out: &mut [TaylorSeries<T>],
    ) -> Result<(), TaylorError> {
        let expected = self.var_names.len() + self.param_names.len();
        if x.len() != expected {
            return Err(TaylorError::LengthMismatch {
                left: x.len(),
                right: expected,
            });
        }
        if out.len() != self.equations.len() {
            return Err(TaylorError::LengthMismatch {
                left: out.len(),
                right: self.equations.len(),
            });
        }
        let mut stack = self.stack.borrow_mut();
        for (i, eq) in self.equations.iter().enumerate() {
            out[i] = VM::execute(eq, t, x, self.var_names.len(), &mut stack)?;
        }
        Ok(())
    }
}
