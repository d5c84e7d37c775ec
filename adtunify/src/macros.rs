use std::rc::Rc;

use rpds::HashTrieMap;
use tracing::debug;

use crate::{
    prelude::*,
    term::Term,
    types::{Bindings, Type},
};

/// A single-parameter type-level function, such as `List` in
/// `(lambda T (or Null (Node T)))`.
#[derive(PartialEq, Eq, Clone, derive_more::Display, Debug)]
#[display(fmt = "(lambda {param} {body})")]
pub struct TypeLambda {
    pub param: Identifier,
    pub body: Rc<Type>,
}

impl TypeLambda {
    /// Accepts an evaluated `Term::Lambda`; anything else is not a macro.
    pub fn from_term(term: &Term) -> Option<Checked<Self>> {
        match term {
            Term::Lambda(param, body) => Some(body.to_type().map(|body| TypeLambda {
                param: param.clone(),
                body,
            })),
            _ => None,
        }
    }

    pub fn instantiate(&self, operand: &Rc<Type>) -> Rc<Type> {
        self.body.substitute(&self.param, operand)
    }
}

#[derive(Default, Clone, Debug)]
pub struct MacroTable {
    macros: HashTrieMap<Identifier, Rc<TypeLambda>>,
}

impl MacroTable {
    pub fn define(&mut self, name: Identifier, lambda: TypeLambda) {
        self.macros = self.macros.insert(name, Rc::new(lambda));
    }

    pub fn get(&self, name: &Identifier) -> Option<&Rc<TypeLambda>> {
        self.macros.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &Rc<TypeLambda>)> {
        self.macros.iter()
    }

    /// Beta-reduces `(operator operand)` when `operator` names a macro.
    /// `None` means no expansion is possible.
    pub fn expand(
        &self,
        operator: &Rc<Type>,
        operand: Option<&Rc<Type>>,
        bindings: &Bindings,
    ) -> Option<Rc<Type>> {
        let operator = bindings.prune(operator);
        let name = match operator.as_ref() {
            Type::Id(name) => name,
            _ => return None,
        };
        let lambda = self.get(name)?;
        let operand = operand?;
        let expanded = lambda.instantiate(operand);
        debug!(
            "expanded ({name} {}) into {}",
            operand.with(bindings),
            expanded.with(bindings)
        );
        Some(expanded)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{evaluator, reader::parse, term::lambdify};

    fn lambda(input: &str) -> TypeLambda {
        let term = lambdify(&parse(input).unwrap()).unwrap();
        let term = evaluator::evaluate(&term, &Default::default()).unwrap();
        TypeLambda::from_term(&term).unwrap().unwrap()
    }

    fn table() -> MacroTable {
        let mut table = MacroTable::default();
        table.define(Rc::new("List".into()), lambda("(lambda T (or Null (Node T)))"));
        table.define(Rc::new("Node".into()), lambda("(lambda T (and T (List T)))"));
        table
    }

    #[test]
    fn test_expand() {
        let table = table();
        let bindings = Bindings::default();
        let expanded = table.expand(&Type::id("List"), Some(&Type::id("int")), &bindings);
        assert_eq!(
            expanded.map(|t| t.to_string()),
            Some("(or Null (Node int))".to_string())
        );
        let expanded = table.expand(&Type::id("Node"), Some(&Type::id("int")), &bindings);
        assert_eq!(
            expanded.map(|t| t.to_string()),
            Some("(and int (List int))".to_string())
        );
    }

    #[test]
    fn test_expand_through_bound_operator() {
        let table = table();
        let bindings = Bindings::default()
            .extended(Rc::new("F".into()), Type::id("List"))
            .unwrap();
        let expanded = table.expand(&Type::variable("F"), Some(&Type::id("bool")), &bindings);
        assert_eq!(
            expanded.map(|t| t.to_string()),
            Some("(or Null (Node bool))".to_string())
        );
    }

    #[test]
    fn test_no_expansion() {
        let table = table();
        let bindings = Bindings::default();
        assert_eq!(
            table.expand(&Type::id("Maybe"), Some(&Type::id("int")), &bindings),
            None
        );
        assert_eq!(table.expand(&Type::id("List"), None, &bindings), None);
        assert_eq!(
            table.expand(&Type::variable("F"), Some(&Type::id("int")), &bindings),
            None
        );
    }

    #[test]
    fn test_from_term() {
        assert_eq!(TypeLambda::from_term(&Term::Unreachable), None);
        assert_eq!(
            lambda("(lambda T (or Empty (Just T)))").to_string(),
            "(lambda T (or Empty (Just T)))"
        );
        let curried = lambdify(&parse("(lambda K (lambda V (and K V)))").unwrap()).unwrap();
        assert!(matches!(
            TypeLambda::from_term(&curried),
            Some(Err(InvariantViolation::NoTypeProjection(_)))
        ));
    }
}
