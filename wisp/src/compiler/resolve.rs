use wisp_common::Spanned;

use crate::compiler::syntax::Syntax;
use crate::construct::{Ast, Scope};

/// Walks the tree once, threading a `Scope` chain through every
/// `lambda` and `let`: binding sites (`def`, `let` bindings, lambda
/// parameters) push a name into the current scope before their body
/// is visited, and every `Symbol`/`Set` reference is looked up
/// against that chain and has its slot cached on the node. A name
/// that resolves against nothing is a compile-time error — this
/// language has no forward-reference hoisting, so `def` only makes a
/// name visible to code that follows it.
pub fn resolve(forms: &[Spanned<Ast>], scope: &mut Scope) -> Result<(), Syntax> {
    for form in forms {
        resolve_one(form, scope)?;
    }
    Ok(())
}

fn resolve_one(form: &Spanned<Ast>, scope: &mut Scope) -> Result<(), Syntax> {
    match &form.item {
        Ast::Literal(_) => Ok(()),

        Ast::Symbol { name, slot } => match scope.resolve(*name) {
            Some(location) => {
                slot.set(Some(location));
                Ok(())
            }
            None => Err(Syntax::error_with_hint(
                "unresolved name",
                &form.span,
                "this name is not defined in any enclosing scope",
            )),
        },

        Ast::Quote(_) => Ok(()),

        Ast::If { cond, then, otherwise } => {
            resolve_one(cond, scope)?;
            resolve_one(then, scope)?;
            if let Some(otherwise) = otherwise {
                resolve_one(otherwise, scope)?;
            }
            Ok(())
        }

        Ast::Def { name, value, .. } => {
            resolve_one(value, scope)?;
            scope.bind(*name);
            Ok(())
        }

        Ast::Set { name, slot, value } => {
            resolve_one(value, scope)?;
            match scope.resolve(*name) {
                Some(location) => {
                    slot.set(Some(location));
                    Ok(())
                }
                None => Err(Syntax::error_with_hint(
                    "unresolved name",
                    &form.span,
                    "'set' can only rebind a name already in scope",
                )),
            }
        }

        Ast::Lambda { params, variadic, body, .. } => {
            let mut inner = Scope::new(Some(scope.clone()));
            for param in params {
                inner.bind(*param);
            }
            if let Some(rest) = variadic {
                inner.bind(*rest);
            }
            resolve(body, &mut inner)
        }

        Ast::Let { bindings, body } => {
            let mut inner = Scope::new(Some(scope.clone()));
            for (name, _mutable, value) in bindings {
                resolve_one(value, &mut inner)?;
                inner.bind(*name);
            }
            resolve(body, &mut inner)
        }

        Ast::Begin(body) => resolve(body, scope),

        Ast::Namespace { body, .. } => resolve(body, scope),

        Ast::And(items) | Ast::Or(items) | Ast::Recur(items) => {
            for item in items {
                resolve_one(item, scope)?;
            }
            Ok(())
        }

        Ast::Call { callee, args } => {
            resolve_one(callee, scope)?;
            for arg in args {
                resolve_one(arg, scope)?;
            }
            Ok(())
        }

        // `Quote` doesn't recurse into its contents, so a `DottedList`
        // only reaches here when written directly as code rather than
        // as quoted data — there's no application semantics for it.
        Ast::DottedList { .. } => Err(Syntax::error_with_hint(
            "a dotted list can only appear inside 'quote'",
            &form.span,
            "'.' introduces an improper list, which can't be called",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lex::Lexer;
    use crate::compiler::parse::Parser;
    use crate::construct::SymbolTable;
    use wisp_common::Source;

    fn resolve_source(src: &str) -> Result<(), Syntax> {
        let mut symbols = SymbolTable::new();
        let tokens = Lexer::lex(Source::source(src)).unwrap();
        let forms = Parser::parse_program(tokens, &mut symbols).unwrap();
        let mut scope = Scope::new(None);
        resolve(&forms, &mut scope)
    }

    #[test]
    fn unbound_name_is_an_error() {
        assert!(resolve_source("(+ x 1)").is_err());
    }

    #[test]
    fn def_then_use_resolves() {
        assert!(resolve_source("(def x 1) (+ x 1)").is_ok());
    }

    #[test]
    fn lambda_params_resolve_in_body() {
        assert!(resolve_source("((lambda (x) (+ x 1)) 2)").is_ok());
    }

    #[test]
    fn let_bindings_resolve_in_body_not_each_other_by_default() {
        assert!(resolve_source("(let ((x 1) (y 2)) (+ x y))").is_ok());
    }

    #[test]
    fn quoted_dotted_list_resolves() {
        assert!(resolve_source("'(a b . c)").is_ok());
    }

    #[test]
    fn unquoted_dotted_list_is_an_error() {
        assert!(resolve_source("(a b . c)").is_err());
    }
}
