//! Recursive-descent parser: tokens → statement list.
//!
//! Statements end at a newline or `;`; blocks are brace-delimited. Newlines
//! are insignificant inside parenthesized, bracketed, and brace-literal
//! contexts so multi-line list/map literals and call argument lists parse
//! naturally. Expression and block nesting is capped so hostile input cannot
//! overflow the host stack.

use super::lexer::{tokenize, Token, TokenKind};
use super::types::{AssignTarget, BinOp, Expr, Function, LogicOp, Stmt, SyntaxDiagnostic, UnOp};
use std::sync::Arc;

/// Maximum nesting of blocks and bracketed expressions.
const MAX_NESTING: usize = 64;

/// Parse a template source into a program. Empty or whitespace/comment-only
/// source yields an empty program.
pub fn parse_source(source: &str) -> Result<Vec<Stmt>, SyntaxDiagnostic> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    parser.program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn check(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> SyntaxDiagnostic {
        let tok = &self.tokens[self.pos];
        SyntaxDiagnostic { message: message.into(), line: tok.line, column: tok.column }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), SyntaxDiagnostic> {
        if self.peek() == &kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!("expected {}, found {}", what, self.peek().describe())))
        }
    }

    fn enter(&mut self) -> Result<(), SyntaxDiagnostic> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error_here(format!("nesting exceeds the limit of {}", MAX_NESTING)));
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }

    /// Skip newline tokens — used where line breaks are insignificant.
    fn eat_newlines(&mut self) {
        while matches!(self.peek(), TokenKind::Newline) {
            self.advance();
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn program(&mut self) -> Result<Vec<Stmt>, SyntaxDiagnostic> {
        let mut stmts = Vec::new();
        self.eat_newlines();
        while !matches!(self.peek(), TokenKind::Eof) {
            stmts.push(self.statement()?);
            self.eat_newlines();
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, SyntaxDiagnostic> {
        match self.peek() {
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Fn => self.fn_stmt(),
            TokenKind::Return => {
                self.advance();
                if matches!(self.peek(), TokenKind::Newline | TokenKind::RBrace | TokenKind::Eof) {
                    Ok(Stmt::Return(None))
                } else {
                    Ok(Stmt::Return(Some(self.expression()?)))
                }
            }
            TokenKind::Break => {
                self.advance();
                Ok(Stmt::Break)
            }
            TokenKind::Continue => {
                self.advance();
                Ok(Stmt::Continue)
            }
            TokenKind::Import => {
                self.advance();
                match self.advance() {
                    TokenKind::Ident(name) => Ok(Stmt::Import(name)),
                    other => Err(self.error_here(format!(
                        "expected module name after 'import', found {}",
                        other.describe()
                    ))),
                }
            }
            _ => self.assign_or_expr_stmt(),
        }
    }

    fn assign_or_expr_stmt(&mut self) -> Result<Stmt, SyntaxDiagnostic> {
        let expr = self.expression()?;

        let aug = match self.peek() {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinOp::Add),
            TokenKind::MinusAssign => Some(BinOp::Sub),
            TokenKind::StarAssign => Some(BinOp::Mul),
            TokenKind::SlashAssign => Some(BinOp::Div),
            TokenKind::PercentAssign => Some(BinOp::Mod),
            _ => return Ok(Stmt::Expr(expr)),
        };
        self.advance();

        let target = match expr {
            Expr::Ident(name) => AssignTarget::Name(name),
            Expr::Index { obj, index } => AssignTarget::Index { obj: *obj, index: *index },
            Expr::Member { .. } => {
                return Err(self.error_here("cannot assign to a member; assign to a name or subscript"));
            }
            _ => return Err(self.error_here("invalid assignment target")),
        };
        let value = self.expression()?;
        Ok(match aug {
            None => Stmt::Assign { target, value },
            Some(op) => Stmt::AugAssign { target, op, value },
        })
    }

    fn if_stmt(&mut self) -> Result<Stmt, SyntaxDiagnostic> {
        self.advance(); // 'if'
        let mut branches = Vec::new();
        let cond = self.expression()?;
        let body = self.block()?;
        branches.push((cond, body));

        let mut else_body = None;
        while self.check(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                let cond = self.expression()?;
                let body = self.block()?;
                branches.push((cond, body));
            } else {
                else_body = Some(self.block()?);
                break;
            }
        }
        Ok(Stmt::If { branches, else_body })
    }

    fn while_stmt(&mut self) -> Result<Stmt, SyntaxDiagnostic> {
        self.advance(); // 'while'
        let cond = self.expression()?;
        let body = self.block()?;
        Ok(Stmt::While { cond, body })
    }

    fn for_stmt(&mut self) -> Result<Stmt, SyntaxDiagnostic> {
        self.advance(); // 'for'
        let var = match self.advance() {
            TokenKind::Ident(name) => name,
            other => {
                return Err(self.error_here(format!(
                    "expected loop variable after 'for', found {}",
                    other.describe()
                )));
            }
        };
        self.expect(TokenKind::In, "'in'")?;
        let iter = self.expression()?;
        let body = self.block()?;
        Ok(Stmt::For { var, iter, body })
    }

    fn fn_stmt(&mut self) -> Result<Stmt, SyntaxDiagnostic> {
        self.advance(); // 'fn'
        let name = match self.advance() {
            TokenKind::Ident(name) => name,
            other => {
                return Err(self.error_here(format!(
                    "expected function name after 'fn', found {}",
                    other.describe()
                )));
            }
        };
        self.expect(TokenKind::LParen, "'('")?;
        self.eat_newlines();
        let mut params = Vec::new();
        if !matches!(self.peek(), TokenKind::RParen) {
            loop {
                match self.advance() {
                    TokenKind::Ident(p) => {
                        if params.contains(&p) {
                            return Err(self.error_here(format!("duplicate parameter '{}'", p)));
                        }
                        params.push(p);
                    }
                    other => {
                        return Err(self.error_here(format!(
                            "expected parameter name, found {}",
                            other.describe()
                        )));
                    }
                }
                self.eat_newlines();
                if !self.check(&TokenKind::Comma) {
                    break;
                }
                self.eat_newlines();
                if matches!(self.peek(), TokenKind::RParen) {
                    break; // trailing comma
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.block()?;
        Ok(Stmt::FuncDef(Arc::new(Function { name, params, body })))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SyntaxDiagnostic> {
        self.enter()?;
        self.expect(TokenKind::LBrace, "'{'")?;
        self.eat_newlines();
        let mut stmts = Vec::new();
        while !matches!(self.peek(), TokenKind::RBrace | TokenKind::Eof) {
            stmts.push(self.statement()?);
            if matches!(self.peek(), TokenKind::RBrace) {
                break;
            }
            if !matches!(self.peek(), TokenKind::Newline) {
                return Err(self.error_here(format!(
                    "expected end of statement, found {}",
                    self.peek().describe()
                )));
            }
            self.eat_newlines();
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        self.exit();
        Ok(stmts)
    }

    // ------------------------------------------------------------------
    // Expressions (precedence: or < and < not < comparison < +- < */% < unary < postfix)
    // ------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, SyntaxDiagnostic> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, SyntaxDiagnostic> {
        let mut lhs = self.and_expr()?;
        while self.check(&TokenKind::Or) {
            self.eat_newlines();
            let rhs = self.and_expr()?;
            lhs = Expr::Logic { op: LogicOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, SyntaxDiagnostic> {
        let mut lhs = self.not_expr()?;
        while self.check(&TokenKind::And) {
            self.eat_newlines();
            let rhs = self.not_expr()?;
            lhs = Expr::Logic { op: LogicOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, SyntaxDiagnostic> {
        if self.check(&TokenKind::Not) {
            self.enter()?;
            let operand = self.not_expr()?;
            self.exit();
            return Ok(Expr::Unary { op: UnOp::Not, operand: Box::new(operand) });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxDiagnostic> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::NotEq => BinOp::Ne,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        self.eat_newlines();
        let rhs = self.additive()?;
        if matches!(
            self.peek(),
            TokenKind::EqEq | TokenKind::NotEq | TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge
        ) {
            return Err(self.error_here("comparisons cannot be chained; use 'and'"));
        }
        Ok(Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    fn additive(&mut self) -> Result<Expr, SyntaxDiagnostic> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            self.eat_newlines();
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, SyntaxDiagnostic> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            self.eat_newlines();
            let rhs = self.unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, SyntaxDiagnostic> {
        if self.check(&TokenKind::Minus) {
            self.enter()?;
            let operand = self.unary()?;
            self.exit();
            return Ok(Expr::Unary { op: UnOp::Neg, operand: Box::new(operand) });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxDiagnostic> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                TokenKind::LParen => {
                    self.enter()?;
                    self.advance();
                    self.eat_newlines();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), TokenKind::RParen) {
                        loop {
                            args.push(self.expression()?);
                            self.eat_newlines();
                            if !self.check(&TokenKind::Comma) {
                                break;
                            }
                            self.eat_newlines();
                            if matches!(self.peek(), TokenKind::RParen) {
                                break; // trailing comma
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                    self.exit();
                    expr = Expr::Call { callee: Box::new(expr), args };
                }
                TokenKind::LBracket => {
                    self.enter()?;
                    self.advance();
                    self.eat_newlines();
                    let index = self.expression()?;
                    self.eat_newlines();
                    self.expect(TokenKind::RBracket, "']'")?;
                    self.exit();
                    expr = Expr::Index { obj: Box::new(expr), index: Box::new(index) };
                }
                TokenKind::Dot => {
                    self.advance();
                    match self.advance() {
                        TokenKind::Ident(name) => {
                            expr = Expr::Member { obj: Box::new(expr), name };
                        }
                        other => {
                            return Err(self.error_here(format!(
                                "expected member name after '.', found {}",
                                other.describe()
                            )));
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, SyntaxDiagnostic> {
        match self.peek().clone() {
            TokenKind::Int(n) => {
                self.advance();
                Ok(Expr::Int(n))
            }
            TokenKind::Float(x) => {
                self.advance();
                Ok(Expr::Float(x))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::NoneKw => {
                self.advance();
                Ok(Expr::None)
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name))
            }
            TokenKind::LParen => {
                self.enter()?;
                self.advance();
                self.eat_newlines();
                let inner = self.expression()?;
                self.eat_newlines();
                self.expect(TokenKind::RParen, "')'")?;
                self.exit();
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.enter()?;
                self.advance();
                self.eat_newlines();
                let mut items = Vec::new();
                if !matches!(self.peek(), TokenKind::RBracket) {
                    loop {
                        items.push(self.expression()?);
                        self.eat_newlines();
                        if !self.check(&TokenKind::Comma) {
                            break;
                        }
                        self.eat_newlines();
                        if matches!(self.peek(), TokenKind::RBracket) {
                            break; // trailing comma
                        }
                    }
                }
                self.expect(TokenKind::RBracket, "']'")?;
                self.exit();
                Ok(Expr::List(items))
            }
            TokenKind::LBrace => {
                self.enter()?;
                self.advance();
                self.eat_newlines();
                let mut entries = Vec::new();
                if !matches!(self.peek(), TokenKind::RBrace) {
                    loop {
                        let key = match self.advance() {
                            TokenKind::Str(k) => k,
                            other => {
                                return Err(self.error_here(format!(
                                    "map keys must be string literals, found {}",
                                    other.describe()
                                )));
                            }
                        };
                        self.expect(TokenKind::Colon, "':'")?;
                        self.eat_newlines();
                        let value = self.expression()?;
                        entries.push((key, value));
                        self.eat_newlines();
                        if !self.check(&TokenKind::Comma) {
                            break;
                        }
                        self.eat_newlines();
                        if matches!(self.peek(), TokenKind::RBrace) {
                            break; // trailing comma
                        }
                    }
                }
                self.expect(TokenKind::RBrace, "'}'")?;
                self.exit();
                Ok(Expr::Map(entries))
            }
            other => Err(self.error_here(format!("unexpected {}", other.describe()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_source_is_noop() {
        assert!(parse_source("").unwrap().is_empty());
        assert!(parse_source("  \n\n# comment\n").unwrap().is_empty());
    }

    #[test]
    fn parse_assignment() {
        let prog = parse_source("answer = 1").unwrap();
        assert_eq!(
            prog,
            vec![Stmt::Assign {
                target: AssignTarget::Name("answer".to_string()),
                value: Expr::Int(1),
            }]
        );
    }

    #[test]
    fn parse_precedence() {
        let prog = parse_source("x = 1 + 2 * 3").unwrap();
        let Stmt::Assign { value, .. } = &prog[0] else { panic!("expected assign") };
        assert_eq!(
            *value,
            Expr::Binary {
                op: BinOp::Add,
                lhs: Box::new(Expr::Int(1)),
                rhs: Box::new(Expr::Binary {
                    op: BinOp::Mul,
                    lhs: Box::new(Expr::Int(2)),
                    rhs: Box::new(Expr::Int(3)),
                }),
            }
        );
    }

    #[test]
    fn parse_not_binds_over_comparison() {
        let prog = parse_source("x = not 1 == 2").unwrap();
        let Stmt::Assign { value, .. } = &prog[0] else { panic!("expected assign") };
        let Expr::Unary { op: UnOp::Not, operand } = value else { panic!("expected not") };
        assert!(matches!(**operand, Expr::Binary { op: BinOp::Eq, .. }));
    }

    #[test]
    fn parse_if_else_if_else() {
        let prog = parse_source("if a > 1 { x = 1 } else if a > 0 { x = 2 } else { x = 3 }").unwrap();
        let Stmt::If { branches, else_body } = &prog[0] else { panic!("expected if") };
        assert_eq!(branches.len(), 2);
        assert_eq!(else_body.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn parse_for_and_while() {
        let prog = parse_source("for i in range(3) {\n  total += i\n}\nwhile total > 0 { total -= 1 }").unwrap();
        assert!(matches!(&prog[0], Stmt::For { var, .. } if var == "i"));
        assert!(matches!(&prog[1], Stmt::While { .. }));
    }

    #[test]
    fn parse_fn_def_and_return() {
        let prog = parse_source("fn add(a, b) {\n  return a + b\n}").unwrap();
        let Stmt::FuncDef(func) = &prog[0] else { panic!("expected fn") };
        assert_eq!(func.name, "add");
        assert_eq!(func.params, vec!["a", "b"]);
        assert!(matches!(func.body[0], Stmt::Return(Some(_))));
    }

    #[test]
    fn parse_bare_return() {
        let prog = parse_source("fn f() { return }").unwrap();
        let Stmt::FuncDef(func) = &prog[0] else { panic!("expected fn") };
        assert_eq!(func.body, vec![Stmt::Return(None)]);
    }

    #[test]
    fn parse_multiline_map_literal() {
        let src = "fn generate() {\n  return {\n    \"question\": q,\n    \"answer\": a,\n  }\n}";
        let prog = parse_source(src).unwrap();
        let Stmt::FuncDef(func) = &prog[0] else { panic!("expected fn") };
        let Stmt::Return(Some(Expr::Map(entries))) = &func.body[0] else { panic!("expected map return") };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "question");
    }

    #[test]
    fn parse_method_call_chain() {
        let prog = parse_source("xs.append(random.randint(1, 6))").unwrap();
        let Stmt::Expr(Expr::Call { callee, args }) = &prog[0] else { panic!("expected call") };
        assert!(matches!(**callee, Expr::Member { ref name, .. } if name == "append"));
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn parse_subscript_aug_assign() {
        let prog = parse_source("xs[0] += 1").unwrap();
        assert!(matches!(
            &prog[0],
            Stmt::AugAssign { target: AssignTarget::Index { .. }, op: BinOp::Add, .. }
        ));
    }

    #[test]
    fn parse_import() {
        let prog = parse_source("import random\nimport math").unwrap();
        assert_eq!(prog, vec![Stmt::Import("random".to_string()), Stmt::Import("math".to_string())]);
    }

    #[test]
    fn parse_semicolon_separated() {
        let prog = parse_source("a = 1; b = 2").unwrap();
        assert_eq!(prog.len(), 2);
    }

    #[test]
    fn parse_member_assignment_rejected() {
        let err = parse_source("a.b = 1").unwrap_err();
        assert!(err.message.contains("cannot assign to a member"));
    }

    #[test]
    fn parse_chained_comparison_rejected() {
        let err = parse_source("x = 1 < 2 < 3").unwrap_err();
        assert!(err.message.contains("chained"));
    }

    #[test]
    fn parse_unclosed_paren() {
        let err = parse_source("x = (1 + 2").unwrap_err();
        assert!(err.message.contains("expected ')'"), "got: {}", err.message);
    }

    #[test]
    fn parse_unexpected_token_has_position() {
        let err = parse_source("x = \ny = 1").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("unexpected"));
    }

    #[test]
    fn parse_map_requires_string_keys() {
        let err = parse_source("m = {1: 2}").unwrap_err();
        assert!(err.message.contains("string literals"));
    }

    #[test]
    fn parse_nesting_limit() {
        let deep = format!("x = {}1{}", "(".repeat(100), ")".repeat(100));
        let err = parse_source(&deep).unwrap_err();
        assert!(err.message.contains("nesting"));
    }

    #[test]
    fn parse_prefix_operator_runs_are_bounded() {
        // Host stack protection applies to prefix chains too.
        let minus = format!("x = {}1", "-".repeat(10_000));
        assert!(parse_source(&minus).unwrap_err().message.contains("nesting"));
        let nots = format!("x = {}true", "not ".repeat(10_000));
        assert!(parse_source(&nots).unwrap_err().message.contains("nesting"));
    }

    #[test]
    fn parse_single_line_block() {
        let prog = parse_source("if a > b { t = \"hard\" } else { t = \"easy\" }").unwrap();
        let Stmt::If { branches, else_body } = &prog[0] else { panic!("expected if") };
        assert_eq!(branches.len(), 1);
        assert!(else_body.is_some());
    }

    #[test]
    fn parse_trailing_commas() {
        assert!(parse_source("xs = [1, 2, 3,]").is_ok());
        assert!(parse_source("m = {\"a\": 1,}").is_ok());
        assert!(parse_source("f(1, 2,)").is_ok());
        assert!(parse_source("fn g(a, b,) { return a }").is_ok());
    }

    #[test]
    fn parse_duplicate_param_rejected() {
        let err = parse_source("fn f(a, a) { return a }").unwrap_err();
        assert!(err.message.contains("duplicate parameter"));
    }

    #[test]
    fn parse_idempotent() {
        let src = "import random\nx = random.randint(1, 6)\n";
        let first = parse_source(src).unwrap();
        let second = parse_source(src).unwrap();
        assert_eq!(first, second);
    }
}
