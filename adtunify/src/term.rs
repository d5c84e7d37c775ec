use std::rc::Rc;

use crate::{
    prelude::*,
    reader::Sexp,
    types::Type,
};

pub const UNREACHABLE: &str = "void";

#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Term {
    Identifier(Identifier),
    Unreachable,
    Lambda(Identifier, Rc<Self>),
    Apply(Rc<Self>, Rc<Self>),
    Let {
        var: Identifier,
        value: Rc<Self>,
        body: Rc<Self>,
    },
    /// A universally quantified placeholder, `(any T)`.
    Generic(Identifier),
    Sum(Vec<Rc<Self>>),
    Product(Vec<Rc<Self>>),
    DefMacro(Identifier, Rc<Self>),
    Unify(Rc<Self>, Rc<Self>),
}

fn write_form(
    f: &mut std::fmt::Formatter<'_>,
    head: &str,
    items: &[Rc<Term>],
) -> std::fmt::Result {
    f.write_str("(")?;
    f.write_str(head)?;
    for item in items {
        f.write_fmt(format_args!(" {item}"))?;
    }
    f.write_str(")")
}

impl std::fmt::Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Term::Identifier(name) => f.write_str(name),
            Term::Unreachable => f.write_str(UNREACHABLE),
            Term::Lambda(var, body) => f.write_fmt(format_args!("(lambda {var} {body})")),
            Term::Apply(lhs, rhs) => f.write_fmt(format_args!("({lhs} {rhs})")),
            Term::Let { var, value, body } => {
                f.write_fmt(format_args!("(let {var} {value} {body})"))
            }
            Term::Generic(name) => f.write_fmt(format_args!("(any {name})")),
            Term::Sum(options) => write_form(f, "or", options),
            Term::Product(dimensions) => write_form(f, "and", dimensions),
            Term::DefMacro(name, body) => f.write_fmt(format_args!("(defmacro {name} {body})")),
            Term::Unify(outbound, inbound) => {
                f.write_fmt(format_args!("(unify {outbound} {inbound})"))
            }
        }
    }
}

impl Term {
    pub fn identifier(name: &str) -> Rc<Self> {
        Rc::new(Term::Identifier(Rc::new(name.to_string())))
    }

    /// Projects an evaluated term onto its type.
    pub fn to_type(&self) -> Checked<Rc<Type>> {
        let ty = match self {
            Term::Identifier(name) => Type::Id(name.clone()),
            Term::Unreachable => Type::Unreachable,
            Term::Generic(name) => Type::Variable(name.clone()),
            Term::Apply(lhs, rhs) => Type::Operator(lhs.to_type()?, Some(rhs.to_type()?)),
            Term::Sum(options) => Type::Sum(
                options
                    .iter()
                    .map(|option| option.to_type())
                    .collect::<Checked<_>>()?,
            ),
            Term::Product(dimensions) => Type::Product(
                dimensions
                    .iter()
                    .map(|dimension| dimension.to_type())
                    .collect::<Checked<_>>()?,
            ),
            Term::Lambda(..) | Term::Let { .. } | Term::DefMacro(..) | Term::Unify(..) => {
                return Err(InvariantViolation::NoTypeProjection(self.to_string()))
            }
        };
        Ok(Rc::new(ty))
    }
}

fn expect_name(head: &str, sexp: &Spanned<Sexp>) -> Result<Identifier> {
    match sexp.value() {
        Sexp::Atom(name) => Ok(name.clone()),
        Sexp::List(_) => Err(Error::custom(
            sexp.span(),
            format!("`{head}` expects a name here, found {sexp}"),
        )),
    }
}

fn expect_arity(
    head: &str,
    sexp: &Spanned<Sexp>,
    items: &[Spanned<Sexp>],
    n: usize,
) -> Result<()> {
    if items.len() == n + 1 {
        Ok(())
    } else {
        Err(Error::custom(
            sexp.span(),
            format!(
                "`{head}` takes {n} argument(s), found {}",
                items.len() - 1
            ),
        ))
    }
}

/// Builds a term from a read s-expression.
pub fn lambdify(sexp: &Spanned<Sexp>) -> Result<Rc<Term>, Vec<Error>> {
    build(sexp).map_err(|e| vec![e])
}

fn build(sexp: &Spanned<Sexp>) -> Result<Rc<Term>> {
    let items = match sexp.value() {
        Sexp::Atom(name) if name.as_str() == UNREACHABLE => {
            return Ok(Rc::new(Term::Unreachable))
        }
        Sexp::Atom(name) => return Ok(Rc::new(Term::Identifier(name.clone()))),
        Sexp::List(items) => items,
    };
    let (first, rest) = items.split_first().ok_or_else(|| {
        Error::custom(sexp.span(), "term expressions must have elements")
    })?;
    let head = match first.value() {
        Sexp::Atom(head) => head.as_str(),
        Sexp::List(_) => "",
    };
    let term = match head {
        "lambda" => {
            expect_arity(head, sexp, items, 2)?;
            Term::Lambda(expect_name(head, &items[1])?, build(&items[2])?)
        }
        "let" => {
            expect_arity(head, sexp, items, 3)?;
            Term::Let {
                var: expect_name(head, &items[1])?,
                value: build(&items[2])?,
                body: build(&items[3])?,
            }
        }
        "any" => {
            expect_arity(head, sexp, items, 1)?;
            Term::Generic(expect_name(head, &items[1])?)
        }
        "or" => Term::Sum(rest.iter().map(build).collect::<Result<_>>()?),
        "and" => Term::Product(rest.iter().map(build).collect::<Result<_>>()?),
        "unify" => {
            expect_arity(head, sexp, items, 2)?;
            Term::Unify(build(&items[1])?, build(&items[2])?)
        }
        "defmacro" => {
            expect_arity(head, sexp, items, 2)?;
            Term::DefMacro(expect_name(head, &items[1])?, build(&items[2])?)
        }
        _ => {
            // (f a b) is ((f a) b)
            return rest.iter().try_fold(build(first)?, |term, arg| {
                Ok(Rc::new(Term::Apply(term, build(arg)?)))
            });
        }
    };
    Ok(Rc::new(term))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::reader::parse;

    fn run(input: &str) -> Result<Rc<Term>, String> {
        let sexp = parse(input).map_err(|es| format!("{es:?}"))?;
        lambdify(&sexp).map_err(|es| format!("{es:?}"))
    }

    #[test]
    fn test_reserved_forms() {
        assert_eq!(
            run("(lambda x (and x x))").unwrap().as_ref(),
            &Term::Lambda(
                Rc::new("x".into()),
                Rc::new(Term::Product(vec![Term::identifier("x"), Term::identifier("x")]))
            )
        );
        assert_eq!(
            run("(any T)").unwrap().as_ref(),
            &Term::Generic(Rc::new("T".into()))
        );
        assert_eq!(run("void").unwrap().as_ref(), &Term::Unreachable);
        assert_eq!(run("(or)").unwrap().as_ref(), &Term::Sum(vec![]));
        assert_eq!(
            format!("{}", run("(let x int (unify x (or Empty (Just x))))").unwrap()),
            "(let x int (unify x (or Empty (Just x))))"
        );
        assert_eq!(
            format!("{}", run("(defmacro Maybe (lambda T (or Empty (Just T))))").unwrap()),
            "(defmacro Maybe (lambda T (or Empty (Just T))))"
        );
    }

    #[test]
    fn test_application_is_left_associative() {
        let f = Term::identifier("f");
        let a = Term::identifier("a");
        let b = Term::identifier("b");
        assert_eq!(
            run("(f a b)").unwrap().as_ref(),
            &Term::Apply(Rc::new(Term::Apply(f, a.clone())), b)
        );
        assert_eq!(run("((a))").unwrap(), a);
    }

    #[test]
    fn test_malformed_forms() {
        assert!(run("()").is_err());
        assert!(run("(lambda x)").is_err());
        assert!(run("(lambda (x) x)").is_err());
        assert!(run("(let x y)").is_err());
        assert!(run("(any)").is_err());
        assert!(run("(unify a)").is_err());
        assert!(run("(defmacro (List) x)").is_err());
    }

    #[test]
    fn test_type_projection() {
        let ty = run("(and int (Node (any V)) void (or a b))")
            .unwrap()
            .to_type()
            .unwrap();
        assert_eq!(format!("{ty}"), "(and int (Node (any V)) void (or a b))");
        assert!(matches!(
            run("(lambda x x)").unwrap().to_type(),
            Err(InvariantViolation::NoTypeProjection(_))
        ));
    }
}
