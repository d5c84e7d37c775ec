use std::rc::Rc;

use chumsky::prelude::*;

use crate::prelude::*;

#[derive(Clone, Debug)]
pub enum Sexp {
    Atom(Identifier),
    List(Vec<Spanned<Sexp>>),
}

impl std::fmt::Display for Sexp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sexp::Atom(name) => f.write_str(name),
            Sexp::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    f.write_fmt(format_args!("{item}"))?;
                }
                f.write_str(")")
            }
        }
    }
}

pub trait SimpleParser<I: Clone + std::hash::Hash, O>:
    Parser<I, O, Error = Error<I>> + Clone
{
    #[allow(clippy::type_complexity)]
    fn spanned(self) -> chumsky::combinator::MapWithSpan<Self, fn(O, Span) -> Spanned<O>, O>
    where
        Self: Sized,
        I: std::cmp::Eq,
    {
        self.map_with_span(|value, span| Spanned { span, value })
    }
}
impl<I: Clone + std::hash::Hash, O, T> SimpleParser<I, O> for T where
    T: Parser<I, O, Error = Error<I>> + Clone
{
}

fn is_atom_char(c: &char) -> bool {
    !c.is_whitespace() && *c != '(' && *c != ')'
}

fn sexp_parser() -> impl SimpleParser<char, Spanned<Sexp>> {
    recursive(|sexp: Recursive<_, Spanned<Sexp>, _>| {
        let atom = filter(is_atom_char)
            .repeated()
            .at_least(1)
            .collect::<String>()
            .map(|s| Sexp::Atom(Rc::new(s)))
            .labelled("atom");

        // ( sexp sexp ... )
        let list = sexp
            .padded()
            .repeated()
            .padded()
            .delimited_by(just('('), just(')'))
            .map(Sexp::List)
            .labelled("list");

        choice((atom, list)).spanned()
    })
}

/// Lists nested deeper than this are rejected before parsing.
pub const DEFAULT_DEPTH: usize = 64;

/// Rejects inputs whose parentheses nest deeper than `max_depth`. The parser
/// recurses once per level, so this runs first and without recursion.
fn check_depth(s: &str, max_depth: usize) -> Result<()> {
    let mut depth = 0usize;
    for (i, c) in s.chars().enumerate() {
        match c {
            '(' => {
                depth += 1;
                if depth > max_depth {
                    return Err(Error::custom(
                        i..i + 1,
                        format!("lists nest deeper than {max_depth} levels"),
                    ));
                }
            }
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

/// Reads exactly one s-expression, surrounded by optional whitespace.
pub fn parse(s: &str) -> Result<Spanned<Sexp>, Vec<Error>> {
    parse_bounded(s, DEFAULT_DEPTH)
}

pub fn parse_bounded(s: &str, max_depth: usize) -> Result<Spanned<Sexp>, Vec<Error>> {
    check_depth(s, max_depth).map_err(|e| vec![e])?;
    sexp_parser()
        .padded()
        .then_ignore(end())
        .parse(s)
        .map_err(|es| {
            es.into_iter()
                .map(|e| e.map(|c| c.to_string()))
                .collect::<Vec<_>>()
        })
}

#[cfg(test)]
mod test {
    use super::*;

    fn read(s: &str) -> Result<String, String> {
        parse(s)
            .map(|sexp| format!("{sexp}"))
            .map_err(|es| format!("{es:?}"))
    }

    #[test]
    fn test_atoms() {
        assert_eq!(read("int").unwrap(), "int");
        assert_eq!(read("  '0  ").unwrap(), "'0");
        assert_eq!(read("foo-bar?").unwrap(), "foo-bar?");
    }

    #[test]
    fn test_lists() {
        assert_eq!(read("(a b c)").unwrap(), "(a b c)");
        assert_eq!(read("( a\n\t(b  c) )").unwrap(), "(a (b c))");
        assert_eq!(read("()").unwrap(), "()");
        assert_eq!(read("( )").unwrap(), "()");
        assert_eq!(
            read("(lambda x (and x x))").unwrap(),
            "(lambda x (and x x))"
        );
    }

    #[test]
    fn test_spans() {
        let sexp = parse(" (f x)").unwrap();
        assert_eq!(sexp.span(), 1..6);
        if let Sexp::List(items) = sexp.value() {
            assert_eq!(items[1].span(), 4..5);
        } else {
            panic!("expected a list, got {sexp}");
        }
    }

    #[test]
    fn test_malformed() {
        assert!(read("").is_err());
        assert!(read("   ").is_err());
        assert!(read("(a b").is_err());
        assert!(read("((a)").is_err());
        assert!(read("a)").is_err());
        assert!(read("a b").is_err());
    }

    fn nested(depth: usize) -> String {
        format!("{}int{}", "(f ".repeat(depth), ")".repeat(depth))
    }

    #[test]
    fn test_nesting_limit() {
        assert_eq!(read(&nested(3)).unwrap(), "(f (f (f int)))");
        assert!(parse(&nested(DEFAULT_DEPTH)).is_ok());

        let es = parse(&nested(10_000)).unwrap_err();
        assert_eq!(es.len(), 1);
        let first_rejected = 3 * DEFAULT_DEPTH;
        assert_eq!(es[0].span(), first_rejected..first_rejected + 1);

        assert!(parse_bounded(&nested(5), 4).is_err());
        assert!(parse_bounded(&nested(4), 4).is_ok());
        assert!(parse_bounded("((a) (b) (c))", 2).is_ok());
    }
}
