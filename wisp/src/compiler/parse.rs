use wisp_common::{Span, Spanned};

use crate::compiler::lex::Token;
use crate::compiler::syntax::Syntax;
use crate::construct::{Ast, SharedSymbol, SymbolTable};

pub struct Parser<'a> {
    tokens: Vec<Spanned<Token>>,
    index: usize,
    symbols: &'a mut SymbolTable,
}

/// Recursive descent over a flat token stream. The grammar is fully
/// parenthesized, so there's no precedence climbing to do — every
/// compound form is `(head arg...)`, and `head`'s spelling picks
/// between a handful of hard-coded special forms and a plain call.
/// Special-form desugaring (`defn`, `cond`, `delay`, `stream-cons`)
/// happens right here, while the head symbol is in hand, rather than
/// in a later pass.
impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Spanned<Token>>, symbols: &'a mut SymbolTable) -> Parser<'a> {
        Parser { tokens, index: 0, symbols }
    }

    pub fn parse_program(
        tokens: Vec<Spanned<Token>>,
        symbols: &'a mut SymbolTable,
    ) -> Result<Vec<Spanned<Ast>>, Syntax> {
        let mut parser = Parser::new(tokens, symbols);
        let mut forms = vec![];
        while !parser.is_done() {
            forms.push(parser.datum()?);
        }
        Ok(forms)
    }

    fn is_done(&self) -> bool {
        self.index >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Spanned<Token>> {
        self.tokens.get(self.index)
    }

    fn advance(&mut self) -> Option<Spanned<Token>> {
        let t = self.tokens.get(self.index).cloned();
        if t.is_some() {
            self.index += 1;
        }
        t
    }

    fn expect_close(&mut self, open_span: &Span) -> Result<Span, Syntax> {
        match self.advance() {
            Some(Spanned { item: Token::Close, span }) => Ok(span),
            Some(Spanned { span, .. }) => Err(Syntax::error_with_hint(
                "expected a closing parenthesis",
                &span,
                "opened here",
            )
            .add_note(crate::compiler::syntax::Note::new(open_span.clone()))),
            None => Err(Syntax::error(
                "unexpected end of input, expected a closing parenthesis",
                open_span,
            )),
        }
    }

    fn eof_span(&self) -> Span {
        self.tokens.last().map(|t| t.span.clone()).unwrap_or_else(Span::empty)
    }

    /// Parses one datum: an atom, a quoted datum, or a parenthesized
    /// form.
    fn datum(&mut self) -> Result<Spanned<Ast>, Syntax> {
        let next = match self.peek() {
            Some(t) => t.clone(),
            None => return Err(Syntax::error("unexpected end of input", &self.eof_span())),
        };

        match next.item {
            Token::Open => self.form(),
            Token::Close => Err(Syntax::error("unexpected closing parenthesis", &next.span)),
            Token::Dot => Err(Syntax::error("unexpected '.'", &next.span)),
            Token::Quote => {
                self.advance();
                let quoted = self.datum()?;
                let span = Span::combine(&next.span, &quoted.span);
                Ok(Spanned::new(Ast::Quote(Box::new(quoted)), span))
            }
            Token::Integer(i) => {
                self.advance();
                Ok(Spanned::new(Ast::Literal(wisp_common::Lit::Integer(i)), next.span))
            }
            Token::Float(f) => {
                self.advance();
                Ok(Spanned::new(Ast::Literal(wisp_common::Lit::Float(f)), next.span))
            }
            Token::String(s) => {
                self.advance();
                Ok(Spanned::new(Ast::Literal(wisp_common::Lit::String(s)), next.span))
            }
            Token::Character(c) => {
                self.advance();
                Ok(Spanned::new(Ast::Literal(wisp_common::Lit::Character(c)), next.span))
            }
            Token::Symbol(name) => {
                self.advance();
                Ok(Spanned::new(self.atom_for(&name), next.span))
            }
        }
    }

    fn atom_for(&mut self, name: &str) -> Ast {
        match name {
            "true" => Ast::Literal(wisp_common::Lit::Boolean(true)),
            "false" => Ast::Literal(wisp_common::Lit::Boolean(false)),
            "null" => Ast::Literal(wisp_common::Lit::Null),
            _ => Ast::symbol(self.symbols.intern(name)),
        }
    }

    fn intern(&mut self, name: &str) -> SharedSymbol {
        self.symbols.intern(name)
    }

    /// Parses a `(...)` form, dispatching on the head symbol.
    fn form(&mut self) -> Result<Spanned<Ast>, Syntax> {
        let open_span = self.advance().unwrap().span; // Token::Open

        if matches!(self.peek().map(|t| &t.item), Some(Token::Close)) {
            let close_span = self.advance().unwrap().span;
            return Ok(Spanned::new(
                Ast::Begin(vec![]),
                Span::combine(&open_span, &close_span),
            ));
        }

        let head_name = match self.peek() {
            Some(Spanned { item: Token::Symbol(name), .. }) => Some(name.clone()),
            _ => None,
        };

        let result = match head_name.as_deref() {
            Some("def") => self.parse_def(false),
            Some("def-mut") => self.parse_def(true),
            Some("defn") => self.parse_defn(),
            Some("lambda") => self.parse_lambda(),
            Some("let") => self.parse_let(false),
            Some("let-mut") => self.parse_let(true),
            Some("if") => self.parse_if(),
            Some("cond") => self.parse_cond(),
            Some("begin") => self.parse_variadic(Ast::Begin as fn(_) -> _),
            Some("namespace") => self.parse_namespace(),
            Some("and") => self.parse_variadic(Ast::And as fn(_) -> _),
            Some("or") => self.parse_variadic(Ast::Or as fn(_) -> _),
            Some("set") => self.parse_set(),
            Some("recur") => self.parse_variadic(Ast::Recur as fn(_) -> _),
            Some("delay") => self.parse_delay(),
            Some("stream-cons") => self.parse_stream_cons(),
            Some("quote") => self.parse_quote(),
            _ => self.parse_call(),
        }?;

        let close_span = self.expect_close(&open_span)?;
        Ok(Spanned::new(result.item, Span::combine(&open_span, &close_span)))
    }

    fn parse_variadic(&mut self, f: fn(Vec<Spanned<Ast>>) -> Ast) -> Result<Spanned<Ast>, Syntax> {
        self.advance(); // head symbol
        let mut items = vec![];
        while !matches!(self.peek().map(|t| &t.item), Some(Token::Close) | None) {
            items.push(self.datum()?);
        }
        Ok(Spanned::new(f(items), Span::empty()))
    }

    fn parse_def(&mut self, mutable: bool) -> Result<Spanned<Ast>, Syntax> {
        self.advance(); // def / def-mut
        let name = self.expect_symbol("expected a name after 'def'")?;
        let value = self.datum()?;
        Ok(Spanned::new(
            Ast::Def { name, mutable, value: Box::new(value) },
            Span::empty(),
        ))
    }

    fn parse_defn(&mut self) -> Result<Spanned<Ast>, Syntax> {
        self.advance(); // defn
        let name = self.expect_symbol("expected a name after 'defn'")?;
        let lambda = self.parse_lambda_tail()?;
        Ok(Spanned::new(
            Ast::Def { name, mutable: false, value: Box::new(lambda) },
            Span::empty(),
        ))
    }

    fn parse_lambda(&mut self) -> Result<Spanned<Ast>, Syntax> {
        self.advance(); // lambda
        self.parse_lambda_tail()
    }

    /// Shared by `lambda` and `defn`: a parameter list (optionally
    /// ending in `... rest`) followed by a body. The first body
    /// statement becomes the lambda's docstring if it's a string
    /// literal and at least one more statement follows it.
    fn parse_lambda_tail(&mut self) -> Result<Spanned<Ast>, Syntax> {
        let params_open = self.expect_open("expected a parameter list")?;
        let mut params = vec![];
        let mut variadic = None;

        loop {
            match self.peek().map(|t| t.item.clone()) {
                Some(Token::Close) => break,
                Some(Token::Symbol(name)) if name == "..." => {
                    self.advance();
                    let rest = self.expect_symbol("expected a name after '...'")?;
                    variadic = Some(rest);
                }
                Some(Token::Symbol(name)) => {
                    self.advance();
                    params.push(self.intern(&name));
                }
                _ => {
                    return Err(Syntax::error(
                        "expected a parameter name",
                        &self.peek().map(|t| t.span.clone()).unwrap_or_else(Span::empty),
                    ));
                }
            }
        }
        self.expect_close(&params_open)?;

        let mut body = vec![];
        while !matches!(self.peek().map(|t| &t.item), Some(Token::Close) | None) {
            body.push(self.datum()?);
        }

        if body.is_empty() {
            return Err(Syntax::error_no_note("lambda body must not be empty"));
        }

        let docstring = if body.len() > 1 {
            match &body[0].item {
                Ast::Literal(wisp_common::Lit::String(s)) => Some(s.clone()),
                _ => None,
            }
        } else {
            None
        };
        if docstring.is_some() {
            body.remove(0);
        }

        Ok(Spanned::new(
            Ast::Lambda { params, variadic, docstring, body },
            Span::empty(),
        ))
    }

    fn parse_let(&mut self, mutable: bool) -> Result<Spanned<Ast>, Syntax> {
        self.advance(); // let / let-mut
        let bindings_open = self.expect_open("expected a binding list")?;
        let mut bindings = vec![];

        while !matches!(self.peek().map(|t| &t.item), Some(Token::Close)) {
            let pair_open = self.expect_open("expected a (name value) binding")?;
            let name = self.expect_symbol("expected a binding name")?;
            let value = self.datum()?;
            self.expect_close(&pair_open)?;
            bindings.push((name, mutable, value));
        }
        self.expect_close(&bindings_open)?;

        let mut body = vec![];
        while !matches!(self.peek().map(|t| &t.item), Some(Token::Close) | None) {
            body.push(self.datum()?);
        }

        Ok(Spanned::new(Ast::Let { bindings, body }, Span::empty()))
    }

    fn parse_if(&mut self) -> Result<Spanned<Ast>, Syntax> {
        self.advance(); // if
        let cond = self.datum()?;
        let then = self.datum()?;
        let otherwise = if !matches!(self.peek().map(|t| &t.item), Some(Token::Close) | None) {
            Some(Box::new(self.datum()?))
        } else {
            None
        };
        Ok(Spanned::new(
            Ast::If { cond: Box::new(cond), then: Box::new(then), otherwise },
            Span::empty(),
        ))
    }

    /// `(cond (c1 e1) (c2 e2) ... (else ed))` lowers directly into a
    /// chain of `if`s, right-to-left.
    fn parse_cond(&mut self) -> Result<Spanned<Ast>, Syntax> {
        self.advance(); // cond
        let mut clauses = vec![];

        while !matches!(self.peek().map(|t| &t.item), Some(Token::Close) | None) {
            let clause_open = self.expect_open("expected a cond clause")?;
            let test = self.datum()?;
            let body = self.datum()?;
            self.expect_close(&clause_open)?;
            clauses.push((test, body));
        }

        let mut chain: Option<Ast> = None;
        while let Some((test, body)) = clauses.pop() {
            let is_else = matches!(
                &test.item,
                Ast::Symbol { name, .. } if self.symbols.name(*name) == "else"
            );
            chain = Some(if is_else {
                body.item
            } else {
                Ast::If {
                    cond: Box::new(test),
                    then: Box::new(body),
                    otherwise: chain.map(|c| Box::new(Spanned::new(c, Span::empty()))),
                }
            });
        }

        Ok(Spanned::new(
            chain.unwrap_or(Ast::Literal(wisp_common::Lit::Null)),
            Span::empty(),
        ))
    }

    fn parse_namespace(&mut self) -> Result<Spanned<Ast>, Syntax> {
        self.advance(); // namespace
        let name = self.expect_symbol("expected a name after 'namespace'")?;
        let mut body = vec![];
        while !matches!(self.peek().map(|t| &t.item), Some(Token::Close) | None) {
            body.push(self.datum()?);
        }
        Ok(Spanned::new(Ast::Namespace { name, body }, Span::empty()))
    }

    fn parse_set(&mut self) -> Result<Spanned<Ast>, Syntax> {
        self.advance(); // set
        let name = self.expect_symbol("expected a name after 'set'")?;
        let value = self.datum()?;
        Ok(Spanned::new(
            Ast::Set { name, slot: std::cell::Cell::new(None), value: Box::new(value) },
            Span::empty(),
        ))
    }

    /// `(delay e)` desugars to a zero-argument lambda wrapping `e`.
    fn parse_delay(&mut self) -> Result<Spanned<Ast>, Syntax> {
        self.advance(); // delay
        let body = self.datum()?;
        Ok(Spanned::new(
            Ast::Lambda { params: vec![], variadic: None, docstring: None, body: vec![body] },
            Span::empty(),
        ))
    }

    /// `(stream-cons a b)` desugars to `(cons a (delay b))`.
    fn parse_stream_cons(&mut self) -> Result<Spanned<Ast>, Syntax> {
        self.advance(); // stream-cons
        let head = self.datum()?;
        let tail = self.datum()?;
        let delayed_tail = Spanned::new(
            Ast::Lambda { params: vec![], variadic: None, docstring: None, body: vec![tail] },
            Span::empty(),
        );
        let cons_symbol = self.intern("cons");
        Ok(Spanned::new(
            Ast::Call {
                callee: Box::new(Spanned::new(Ast::symbol(cons_symbol), Span::empty())),
                args: vec![head, delayed_tail],
            },
            Span::empty(),
        ))
    }

    fn parse_quote(&mut self) -> Result<Spanned<Ast>, Syntax> {
        self.advance(); // quote
        let datum = self.datum()?;
        Ok(Spanned::new(Ast::Quote(Box::new(datum)), Span::empty()))
    }

    fn parse_call(&mut self) -> Result<Spanned<Ast>, Syntax> {
        let callee = self.datum()?;
        let mut args = vec![];
        loop {
            match self.peek().map(|t| &t.item) {
                Some(Token::Close) | None => break,
                Some(Token::Dot) => {
                    self.advance();
                    let tail = self.datum()?;
                    if !matches!(self.peek().map(|t| &t.item), Some(Token::Close)) {
                        return Err(Syntax::error(
                            "expected a closing parenthesis after a dotted tail",
                            &self.peek().map(|t| t.span.clone()).unwrap_or_else(Span::empty),
                        ));
                    }
                    let mut elements = args;
                    elements.insert(0, callee);
                    return Ok(Spanned::new(
                        Ast::DottedList { elements, tail: Box::new(tail) },
                        Span::empty(),
                    ));
                }
                _ => args.push(self.datum()?),
            }
        }
        Ok(Spanned::new(Ast::Call { callee: Box::new(callee), args }, Span::empty()))
    }

    fn expect_open(&mut self, message: &str) -> Result<Span, Syntax> {
        match self.advance() {
            Some(Spanned { item: Token::Open, span }) => Ok(span),
            Some(Spanned { span, .. }) => Err(Syntax::error(message, &span)),
            None => Err(Syntax::error(message, &self.eof_span())),
        }
    }

    fn expect_symbol(&mut self, message: &str) -> Result<SharedSymbol, Syntax> {
        match self.advance() {
            Some(Spanned { item: Token::Symbol(name), .. }) => Ok(self.intern(&name)),
            Some(Spanned { span, .. }) => Err(Syntax::error(message, &span)),
            None => Err(Syntax::error(message, &self.eof_span())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lex::Lexer;
    use wisp_common::Source;

    fn parse(src: &str) -> Vec<Ast> {
        let mut symbols = SymbolTable::new();
        let tokens = Lexer::lex(Source::source(src)).unwrap();
        Parser::parse_program(tokens, &mut symbols)
            .unwrap()
            .into_iter()
            .map(|s| s.item)
            .collect()
    }

    #[test]
    fn parses_call() {
        let ast = parse("(+ 1 2 3)");
        match &ast[0] {
            Ast::Call { args, .. } => assert_eq!(args.len(), 3),
            other => panic!("expected a call, got {:?}", other),
        }
    }

    #[test]
    fn parses_if() {
        let ast = parse("(if true 1 2)");
        assert!(matches!(ast[0], Ast::If { .. }));
    }

    #[test]
    fn parses_lambda_with_docstring() {
        let ast = parse("(lambda (x) \"doc\" x)");
        match &ast[0] {
            Ast::Lambda { docstring, body, .. } => {
                assert_eq!(docstring.as_deref(), Some("doc"));
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected a lambda, got {:?}", other),
        }
    }

    #[test]
    fn cond_lowers_to_if_chain() {
        let ast = parse("(cond (false 1) (true 2))");
        assert!(matches!(ast[0], Ast::If { .. }));
    }

    #[test]
    fn unclosed_paren_errors() {
        let mut symbols = SymbolTable::new();
        let tokens = Lexer::lex(Source::source("(+ 1 2")).unwrap();
        assert!(Parser::parse_program(tokens, &mut symbols).is_err());
    }

    #[test]
    fn quoted_dotted_pair_parses_to_a_dotted_list() {
        let ast = parse("'(a b . c)");
        match &ast[0] {
            Ast::Quote(inner) => match &inner.item {
                Ast::DottedList { elements, tail } => {
                    assert_eq!(elements.len(), 3);
                    assert!(matches!(tail.item, Ast::Symbol { .. }));
                }
                other => panic!("expected a dotted list, got {:?}", other),
            },
            other => panic!("expected a quote, got {:?}", other),
        }
    }

    #[test]
    fn dot_without_a_trailing_close_errors() {
        let mut symbols = SymbolTable::new();
        let tokens = Lexer::lex(Source::source("'(a . b c)")).unwrap();
        assert!(Parser::parse_program(tokens, &mut symbols).is_err());
    }

    #[test]
    fn bare_dot_errors() {
        let mut symbols = SymbolTable::new();
        let tokens = Lexer::lex(Source::source(".")).unwrap();
        assert!(Parser::parse_program(tokens, &mut symbols).is_err());
    }
}
