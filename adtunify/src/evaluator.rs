use std::rc::Rc;

use rpds::HashTrieMap;
use tracing::trace;

use crate::{
    macros::{MacroTable, TypeLambda},
    prelude::*,
    term::Term,
};

pub const DEFAULT_DEPTH: usize = 512;

/// Lexical environment: term bindings plus the type-level macros visible to
/// unification.
#[derive(Default, Clone, Debug)]
pub struct Env {
    terms: HashTrieMap<Identifier, Rc<Term>>,
    macros: MacroTable,
}
impl Env {
    pub fn lookup(&self, name: &Identifier) -> Option<&Rc<Term>> {
        self.terms.get(name)
    }
    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }
    pub fn terms(&self) -> impl Iterator<Item = (&Identifier, &Rc<Term>)> {
        self.terms.iter()
    }

    pub fn add_term(&mut self, name: Identifier, term: Rc<Term>) {
        self.terms = self.terms.insert(name, term);
    }
    pub fn add_macro(&mut self, name: Identifier, lambda: TypeLambda) {
        self.macros.define(name, lambda);
    }

    fn bound(&self, name: Identifier, term: Rc<Term>) -> Self {
        let mut ret = self.clone();
        ret.terms = ret.terms.insert(name, term);
        ret
    }
    fn unbound(&self, name: &Identifier) -> Self {
        let mut ret = self.clone();
        ret.terms = ret.terms.remove(name);
        ret
    }
}

pub fn evaluate(term: &Rc<Term>, env: &Env) -> Checked<Rc<Term>> {
    evaluate_bounded(term, env, DEFAULT_DEPTH)
}

/// Reduces `term` under `env`. Unbound identifiers stay symbolic and
/// applications whose head is not a lambda are left unreduced.
pub fn evaluate_bounded(term: &Rc<Term>, env: &Env, max_depth: usize) -> Checked<Rc<Term>> {
    fn rec(term: &Rc<Term>, env: &Env, depth: usize, max_depth: usize) -> Checked<Rc<Term>> {
        if depth > max_depth {
            return Err(InvariantViolation::DepthExceeded(max_depth));
        }
        trace!(%term, depth, "evaluating");
        let depth = depth + 1;
        let all = |terms: &[Rc<Term>]| {
            terms
                .iter()
                .map(|t| rec(t, env, depth, max_depth))
                .collect::<Checked<Vec<_>>>()
        };
        match term.as_ref() {
            Term::Identifier(name) => match env.lookup(name) {
                // x bound to x is already as reduced as it gets
                Some(value) if value == term => Ok(term.clone()),
                Some(value) => rec(value, env, depth, max_depth),
                None => Ok(term.clone()),
            },
            Term::Lambda(var, body) => {
                let body = rec(body, &env.unbound(var), depth, max_depth)?;
                Ok(Rc::new(Term::Lambda(var.clone(), body)))
            }
            Term::Apply(lhs, rhs) => {
                let lhs = rec(lhs, env, depth, max_depth)?;
                let rhs = rec(rhs, env, depth, max_depth)?;
                if let Term::Lambda(var, body) = lhs.as_ref() {
                    rec(body, &env.bound(var.clone(), rhs), depth, max_depth)
                } else {
                    Ok(Rc::new(Term::Apply(lhs, rhs)))
                }
            }
            Term::Let { var, value, body } => {
                rec(body, &env.bound(var.clone(), value.clone()), depth, max_depth)
            }
            Term::Sum(options) => Ok(Rc::new(Term::Sum(all(options)?))),
            Term::Product(dimensions) => Ok(Rc::new(Term::Product(all(dimensions)?))),
            Term::Unreachable | Term::Generic(_) | Term::DefMacro(..) | Term::Unify(..) => {
                Ok(term.clone())
            }
        }
    }
    rec(term, env, 0, max_depth)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{reader::parse, term::lambdify};

    fn term(input: &str) -> Rc<Term> {
        lambdify(&parse(input).unwrap()).unwrap()
    }

    fn run(input: &str) -> Checked<String> {
        evaluate(&term(input), &Env::default()).map(|t| t.to_string())
    }

    #[test]
    fn test_beta_reduction() {
        assert_eq!(run("((lambda x (and x x)) 5)").unwrap(), "(and 5 5)");
        assert_eq!(
            run("(((lambda a (lambda b (and a b))) int) bool)").unwrap(),
            "(and int bool)"
        );
        let lambda = evaluate(&term("(lambda x (and x x))"), &Env::default()).unwrap();
        let applied = Rc::new(Term::Apply(lambda, term("5")));
        assert_eq!(
            evaluate(&applied, &Env::default()).unwrap().to_string(),
            "(and 5 5)"
        );
    }

    #[test]
    fn test_symbolic_evaluation() {
        assert_eq!(run("unknown").unwrap(), "unknown");
        assert_eq!(run("(f int)").unwrap(), "(f int)");
        assert_eq!(run("((lambda x (and x x)) x)").unwrap(), "(and x x)");
        assert_eq!(run("(or (any T) void)").unwrap(), "(or (any T) void)");
    }

    #[test]
    fn test_let_and_shadowing() {
        assert_eq!(run("(let x int (and x x))").unwrap(), "(and int int)");
        assert_eq!(run("(let x int (lambda x x))").unwrap(), "(lambda x x)");
        assert_eq!(run("(let x int (let y x (Just y)))").unwrap(), "(Just int)");
        assert_eq!(
            run("(let id (lambda t t) (and (id a) (id b)))").unwrap(),
            "(and a b)"
        );
    }

    #[test]
    fn test_environment_lookup() {
        let mut env = Env::default();
        env.add_term(Rc::new("Pair".into()), term("(lambda t (and t t))"));
        env.add_term(Rc::new("Alias".into()), term("Pair"));
        assert_eq!(
            evaluate(&term("(Alias int)"), &env).unwrap().to_string(),
            "(and int int)"
        );
        assert!(env.lookup(&Rc::new("Missing".into())).is_none());
    }

    #[test]
    fn test_divergence_is_bounded() {
        assert_eq!(
            evaluate_bounded(
                &term("((lambda x (x x)) (lambda x (x x)))"),
                &Env::default(),
                64
            ),
            Err(InvariantViolation::DepthExceeded(64))
        );
        assert_eq!(
            run("(let x (f x) x)"),
            Err(InvariantViolation::DepthExceeded(DEFAULT_DEPTH))
        );
    }
}
