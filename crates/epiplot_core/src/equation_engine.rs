use crate::error::ExpressionError;
use crate::traits::{constant, Scalar};
use std::cell::RefCell;
use std::collections::HashMap;

/// The closed set of functions an expression may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Exp,
    Sqrt,
    Log,
}

impl Function {
    /// Resolves a call name. `np.` is accepted as a spelling prefix only.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.strip_prefix("np.").unwrap_or(name) {
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "exp" => Some(Function::Exp),
            "sqrt" => Some(Function::Sqrt),
            "log" => Some(Function::Log),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Exp => "exp",
            Function::Sqrt => "sqrt",
            Function::Log => "log",
        }
    }
}

/// OpCodes for the Stack-based Virtual Machine.
/// There is no opcode that looks a name up at run time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of a variable (by index) onto the stack.
    LoadVar(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes -a.
    Neg,
    /// Pops top value (a), pushes f(a).
    Call(Function),
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// A function applied outside its domain during evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainFault {
    pub function: Function,
    pub argument: f64,
}

/// Stack-based Virtual Machine for evaluating equations.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `vars`: Variable values (read-only).
/// - `stack`: A mutable buffer for intermediate computations.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        stack: &mut Vec<T>,
    ) -> Result<T, DomainFault> {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => stack.push(constant(*val)),
                OpCode::LoadVar(idx) => stack.push(vars[*idx]),
                OpCode::Add => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a + b);
                }
                OpCode::Sub => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a - b);
                }
                OpCode::Mul => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a * b);
                }
                OpCode::Div => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a / b);
                }
                OpCode::Pow => {
                    let (a, b) = pop_pair(stack);
                    stack.push(a.powf(b));
                }
                OpCode::Neg => {
                    let a = pop(stack);
                    stack.push(-a);
                }
                OpCode::Call(function) => {
                    let a = pop(stack);
                    let fault = || DomainFault {
                        function: *function,
                        argument: a.to_f64().unwrap_or(f64::NAN),
                    };
                    let value = match function {
                        Function::Sin => a.sin(),
                        Function::Cos => a.cos(),
                        Function::Exp => a.exp(),
                        Function::Sqrt if a < T::zero() => return Err(fault()),
                        Function::Sqrt => a.sqrt(),
                        Function::Log if a <= T::zero() => return Err(fault()),
                        Function::Log => a.ln(),
                    };
                    stack.push(value);
                }
            }
        }

        // Compiled bytecode always leaves exactly one value.
        Ok(pop(stack))
    }
}

fn pop<T: Scalar>(stack: &mut Vec<T>) -> T {
    stack.pop().unwrap_or_else(T::nan)
}

fn pop_pair<T: Scalar>(stack: &mut Vec<T>) -> (T, T) {
    let b = pop(stack);
    let a = pop(stack);
    (a, b)
}

// --- AST & Parser ---

/// Parentheses, calls, signs and exponents may nest at most this deep.
pub const MAX_NESTING: usize = 64;
/// Longest accepted expression, in tokens. Bounds flat operator chains.
pub const MAX_TOKENS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn opcode(self) -> OpCode {
        match self {
            BinaryOp::Add => OpCode::Add,
            BinaryOp::Sub => OpCode::Sub,
            BinaryOp::Mul => OpCode::Mul,
            BinaryOp::Div => OpCode::Div,
            BinaryOp::Pow => OpCode::Pow,
        }
    }
}

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Neg(Box<Expr>),
    Call(Function, Box<Expr>),
}

/// Compiles an AST (`Expr`) into `Bytecode`.
/// Resolves variable names to indices; unknown names are rejected here.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[&str]) -> Self {
        let var_map = var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i))
            .collect();
        Self { var_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, ExpressionError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), ExpressionError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => match self.var_map.get(name) {
                Some(&idx) => ops.push(OpCode::LoadVar(idx)),
                None => return Err(ExpressionError::UnknownIdentifier(name.clone())),
            },
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(op.opcode());
            }
            Expr::Neg(operand) => {
                self.compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(function, arg) => {
                self.compile_recursive(arg, ops)?;
                ops.push(OpCode::Call(*function));
            }
        }
        Ok(())
    }
}

/// Parses and compiles in one go.
pub fn compile_expression(input: &str, var_names: &[&str]) -> Result<Bytecode, ExpressionError> {
    let parsed = parse(input)?;
    Compiler::new(var_names).compile(&parsed)
}

// --- Simple Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExpressionError::Parse {
            position: 0,
            message: "empty expression".to_string(),
        });
    }
    if let Some(&(position, _)) = tokens.get(MAX_TOKENS) {
        return Err(ExpressionError::Parse {
            position,
            message: format!("expression longer than {MAX_TOKENS} tokens"),
        });
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
        depth: 0,
    };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(_) => Err(parser.error("unexpected trailing input")),
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

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            // Optional exponent: 1e-3, 2.5E4
            if let Some(&(e_pos, e)) = chars.peek() {
                if e == 'e' || e == 'E' {
                    let rest = &input[e_pos + 1..];
                    let digits_at = usize::from(rest.starts_with(['+', '-']));
                    if rest[digits_at..].starts_with(|ch: char| ch.is_ascii_digit()) {
                        num_str.push(e);
                        chars.next();
                        if digits_at == 1 {
                            if let Some((_, sign)) = chars.next() {
                                num_str.push(sign);
                            }
                        }
                        while let Some(&(_, d)) = chars.peek() {
                            if d.is_ascii_digit() {
                                num_str.push(d);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                    }
                }
            }
            let value = num_str.parse().map_err(|_| ExpressionError::Parse {
                position: pos,
                message: format!("invalid number '{num_str}'"),
            })?;
            tokens.push((pos, Token::Number(value)));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else if d == '.' && ident == "np" {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push((pos, Token::Identifier(ident)));
        } else {
            chars.next();
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => {
                    if let Some(&(_, '*')) = chars.peek() {
                        chars.next();
                        Token::Caret
                    } else {
                        Token::Star
                    }
                }
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => {
                    return Err(ExpressionError::Parse {
                        position: pos,
                        message: format!("unexpected character '{other}'"),
                    })
                }
            };
            tokens.push((pos, token));
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, token)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: &str) -> ExpressionError {
        let position = self
            .tokens
            .get(self.pos)
            .map(|(position, _)| *position)
            .unwrap_or(self.end);
        ExpressionError::Parse {
            position,
            message: message.to_string(),
        }
    }

    /// Runs `parse` one nesting level deeper.
    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Expr, ExpressionError>,
    ) -> Result<Expr, ExpressionError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        let expr = parse(self);
        self.depth -= 1;
        expr
    }

    fn expect_rparen(&mut self) -> Result<(), ExpressionError> {
        match self.peek() {
            Some(Token::RParen) => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.error("expected ')'")),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, ExpressionError> {
        self.parse_term()
    }

    fn parse_term(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_factor()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_factor()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    /// `-x^2` parses as `-(x^2)`.
    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                let operand = self.nested(Self::parse_unary)?;
                Ok(Expr::Neg(Box::new(operand)))
            }
            Some(Token::Plus) => {
                self.consume();
                self.nested(Self::parse_unary)
            }
            _ => self.parse_power(),
        }
    }

    /// Right-associative: `2^3^2 == 2^(3^2)`.
    fn parse_power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(Expr::Binary(Box::new(base), BinaryOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let start = self.pos;
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    let function = Function::from_name(&name)
                        .ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;
                    self.consume(); // eat '('
                    let arg = self.nested(Self::parse_expression)?;
                    self.expect_rparen()?;
                    Ok(Expr::Call(function, Box::new(arg)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.nested(Self::parse_expression)?;
                self.expect_rparen()?;
                Ok(expr)
            }
            _ => {
                self.pos = start;
                Err(self.error("expected a number, variable, function call or '('"))
            }
        }
    }
}

// --- EquationSystem ---

/// Compiled right-hand sides over a fixed set of variables.
/// Contains one compiled bytecode expression per output component.
pub struct EquationSystem {
    pub equations: Vec<Bytecode>,
    // Interior mutability for VM stack to avoid allocation per evaluation.
    // Note: This makes the system !Sync.
    stack: RefCell<Vec<f64>>,
}

impl EquationSystem {
    pub fn new(equations: Vec<Bytecode>) -> Self {
        Self {
            equations,
            stack: RefCell::new(Vec::with_capacity(64)),
        }
    }

    /// Compiles each expression against `var_names`.
    pub fn compile(expressions: &[&str], var_names: &[&str]) -> Result<Self, ExpressionError> {
        let compiler = Compiler::new(var_names);
        let equations = expressions
            .iter()
            .map(|expr| parse(expr).and_then(|parsed| compiler.compile(&parsed)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(equations))
    }

    pub fn dimension(&self) -> usize {
        self.equations.len()
    }

    /// Evaluates every equation at `x`, stopping at the first domain fault.
    pub fn try_apply(&self, x: &[f64], out: &mut [f64]) -> Result<(), DomainFault> {
        let mut stack = self.stack.borrow_mut();
        for (i, eq) in self.equations.iter().enumerate() {
            out[i] = VM::execute(eq, x, &mut stack)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(input: &str, x: f64, y: f64) -> Result<f64, ExpressionError> {
        let code = compile_expression(input, &["x", "y"])?;
        let mut stack = Vec::new();
        VM::execute(&code, &[x, y], &mut stack).map_err(|fault| ExpressionError::Domain {
            function: fault.function.name(),
            argument: fault.argument,
            x,
            y,
        })
    }

    #[test]
    fn precedence_follows_arithmetic_rules() {
        assert_eq!(eval("1 + 2 * 3", 0.0, 0.0).unwrap(), 7.0);
        assert_eq!(eval("(1 + 2) * 3", 0.0, 0.0).unwrap(), 9.0);
        assert_eq!(eval("2 ^ 3 ^ 2", 0.0, 0.0).unwrap(), 512.0);
        assert_eq!(eval("-x^2", 3.0, 0.0).unwrap(), -9.0);
        assert_eq!(eval("2^-1", 0.0, 0.0).unwrap(), 0.5);
        assert_eq!(eval("x**2", 4.0, 0.0).unwrap(), 16.0);
        assert_eq!(eval("10 - 4 - 3", 0.0, 0.0).unwrap(), 3.0);
        assert_eq!(eval("8 / 4 / 2", 0.0, 0.0).unwrap(), 1.0);
    }

    #[test]
    fn numbers_accept_decimal_and_exponent_forms() {
        assert_eq!(eval("1.5e2", 0.0, 0.0).unwrap(), 150.0);
        assert_eq!(eval("2E-1 * x", 10.0, 0.0).unwrap(), 2.0);
        assert_eq!(eval(".5", 0.0, 0.0).unwrap(), 0.5);
        assert!(matches!(
            eval("1.2.3", 0.0, 0.0),
            Err(ExpressionError::Parse { position: 0, .. })
        ));
    }

    #[test]
    fn allowed_functions_evaluate_including_numpy_spelling() {
        let value = eval("np.sin(x) + cos(y)", 0.0, 0.0).unwrap();
        assert!((value - 1.0).abs() < 1e-12);
        let value = eval("sqrt(x) * exp(log(y))", 4.0, 3.0).unwrap();
        assert!((value - 6.0).abs() < 1e-12);
    }

    #[test]
    fn identifiers_outside_the_allow_list_are_rejected() {
        assert_eq!(
            eval("__import__(x)", 0.0, 0.0),
            Err(ExpressionError::UnknownFunction("__import__".into()))
        );
        assert!(matches!(
            eval("__import__('os')", 0.0, 0.0),
            Err(ExpressionError::Parse { position: 11, .. })
        ));
        assert_eq!(
            eval("__import__", 0.0, 0.0),
            Err(ExpressionError::UnknownIdentifier("__import__".into()))
        );
        assert_eq!(
            eval("z + 1", 0.0, 0.0),
            Err(ExpressionError::UnknownIdentifier("z".into()))
        );
        assert_eq!(
            eval("np.tan(x)", 0.0, 0.0),
            Err(ExpressionError::UnknownFunction("np.tan".into()))
        );
        assert!(matches!(
            eval("x.real", 0.0, 0.0),
            Err(ExpressionError::Parse { .. })
        ));
        assert!(matches!(
            eval("x[0]", 0.0, 0.0),
            Err(ExpressionError::Parse { position: 1, .. })
        ));
        assert!(matches!(
            eval("y = 2", 0.0, 0.0),
            Err(ExpressionError::Parse { .. })
        ));
    }

    #[test]
    fn malformed_input_reports_position() {
        assert!(matches!(
            eval("1 +", 0.0, 0.0),
            Err(ExpressionError::Parse { position: 3, .. })
        ));
        assert!(matches!(
            eval("(x", 0.0, 0.0),
            Err(ExpressionError::Parse { position: 2, .. })
        ));
        assert!(matches!(
            eval("x y", 0.0, 0.0),
            Err(ExpressionError::Parse { position: 2, .. })
        ));
        assert!(matches!(eval("   ", 0.0, 0.0), Err(ExpressionError::Parse { .. })));
    }

    #[test]
    fn domain_errors_surface_instead_of_nan() {
        assert!(matches!(
            eval("log(x)", 0.0, 1.0),
            Err(ExpressionError::Domain { function: "log", .. })
        ));
        assert!(matches!(
            eval("sqrt(y - 2)", 0.0, 1.0),
            Err(ExpressionError::Domain { function: "sqrt", argument, .. }) if argument == -1.0
        ));
    }

    #[test]
    fn nesting_beyond_the_limit_is_a_parse_error() {
        let deep = format!("{}x{}", "(".repeat(50_000), ")".repeat(50_000));
        assert!(matches!(
            eval(&deep, 1.0, 1.0),
            Err(ExpressionError::Parse { ref message, .. }) if message.contains("longer than")
        ));

        let parens = format!("{}x{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert!(matches!(
            eval(&parens, 1.0, 1.0),
            Err(ExpressionError::Parse { ref message, .. }) if message == "expression nested too deeply"
        ));

        let signs = format!("{}x", "-".repeat(MAX_NESTING + 1));
        assert!(matches!(
            eval(&signs, 1.0, 1.0),
            Err(ExpressionError::Parse { ref message, .. }) if message == "expression nested too deeply"
        ));

        let calls = format!("{}x{}", "sin(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert!(matches!(eval(&calls, 1.0, 1.0), Err(ExpressionError::Parse { .. })));

        let within = format!("{}x{}", "(".repeat(MAX_NESTING - 1), ")".repeat(MAX_NESTING - 1));
        assert_eq!(eval(&within, 2.0, 0.0).unwrap(), 2.0);
        assert_eq!(eval("--x", 2.0, 0.0).unwrap(), 2.0);
    }

    #[test]
    fn long_operator_chains_are_bounded() {
        let chain = vec!["x"; MAX_TOKENS].join("+");
        assert!(matches!(
            eval(&chain, 1.0, 0.0),
            Err(ExpressionError::Parse { ref message, .. }) if message.contains("longer than")
        ));
        let short = vec!["x"; 100].join("+");
        assert_eq!(eval(&short, 1.0, 0.0).unwrap(), 100.0);
    }

    #[test]
    fn binary_operators_compile_to_matching_opcodes() {
        let code = compile_expression("x ^ y - 1", &["x", "y"]).expect("should compile");
        assert_eq!(
            code.ops,
            vec![
                OpCode::LoadVar(0),
                OpCode::LoadVar(1),
                OpCode::Pow,
                OpCode::LoadConst(1.0),
                OpCode::Sub,
            ]
        );
    }

    #[test]
    fn equation_system_evaluates_each_component() {
        let system = EquationSystem::compile(&["-y", "x"], &["x", "y"]).expect("should compile");
        assert_eq!(system.dimension(), 2);
        let mut out = [0.0; 2];
        system.try_apply(&[1.0, 2.0], &mut out).expect("no domain fault");
        assert_eq!(out, [-2.0, 1.0]);
    }
}
