use std::{
    rc::Rc,
    sync::atomic::{AtomicUsize, Ordering},
};

use rpds::RedBlackTreeMap;

use crate::{
    prelude::*,
    term::{Term, UNREACHABLE},
};

#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Type {
    Id(Identifier),
    /// The uninhabited type, also standing in for variables nothing constrained.
    Unreachable,
    Variable(Identifier),
    /// A type constructor applied to an operand. Without an operand this is a
    /// reference to the operator alone.
    Operator(Rc<Self>, Option<Rc<Self>>),
    Product(Vec<Rc<Self>>),
    Sum(Vec<Rc<Self>>),
}

static NEXT_VARIABLE: AtomicUsize = AtomicUsize::new(0);

impl Type {
    pub fn id(name: &str) -> Rc<Self> {
        Rc::new(Type::Id(Rc::new(name.to_string())))
    }

    pub fn variable(name: &str) -> Rc<Self> {
        Rc::new(Type::Variable(Rc::new(name.to_string())))
    }

    /// A variable whose name has never been handed out before in this process.
    pub fn fresh_variable() -> Rc<Self> {
        let n = NEXT_VARIABLE.fetch_add(1, Ordering::Relaxed);
        Rc::new(Type::Variable(Rc::new(format!("__{n}"))))
    }

    pub fn apply(operator: Rc<Self>, operand: Rc<Self>) -> Rc<Self> {
        Rc::new(Type::Operator(operator, Some(operand)))
    }

    /// Renders the type with every bound variable resolved through `bindings`.
    pub fn with<'a>(&'a self, bindings: &'a Bindings) -> Bound<'a> {
        Bound {
            ty: self,
            bindings: Some(bindings),
        }
    }

    /// Replaces every resolved variable by what it resolves to. Variables left
    /// unresolved become `void`: nothing is known about their representation.
    pub fn fully_bind(&self, bindings: &Bindings) -> Rc<Self> {
        let ty = match self {
            Type::Id(_) | Type::Unreachable => self.clone(),
            Type::Variable(name) => match bindings.get(name) {
                Some(instance) => return instance.fully_bind(bindings),
                None => Type::Unreachable,
            },
            Type::Operator(operator, operand) => Type::Operator(
                operator.fully_bind(bindings),
                operand.as_ref().map(|operand| operand.fully_bind(bindings)),
            ),
            Type::Product(dimensions) => Type::Product(
                dimensions
                    .iter()
                    .map(|dimension| dimension.fully_bind(bindings))
                    .collect(),
            ),
            Type::Sum(options) => Type::Sum(
                options
                    .iter()
                    .map(|option| option.fully_bind(bindings))
                    .collect(),
            ),
        };
        Rc::new(ty)
    }

    /// Replaces each `Id(name)` by `replacement`. The replacement itself is
    /// inserted as is.
    pub fn substitute(self: &Rc<Self>, name: &Identifier, replacement: &Rc<Self>) -> Rc<Self> {
        match self.as_ref() {
            Type::Id(id) if id == name => replacement.clone(),
            Type::Id(_) | Type::Unreachable | Type::Variable(_) => self.clone(),
            Type::Operator(operator, operand) => Rc::new(Type::Operator(
                operator.substitute(name, replacement),
                operand
                    .as_ref()
                    .map(|operand| operand.substitute(name, replacement)),
            )),
            Type::Product(dimensions) => Rc::new(Type::Product(
                dimensions
                    .iter()
                    .map(|dimension| dimension.substitute(name, replacement))
                    .collect(),
            )),
            Type::Sum(options) => Rc::new(Type::Sum(
                options
                    .iter()
                    .map(|option| option.substitute(name, replacement))
                    .collect(),
            )),
        }
    }

    pub fn to_term(&self) -> Rc<Term> {
        let term = match self {
            Type::Id(name) => Term::Identifier(name.clone()),
            Type::Unreachable => Term::Unreachable,
            Type::Variable(name) => Term::Generic(name.clone()),
            Type::Operator(operator, None) => return operator.to_term(),
            Type::Operator(operator, Some(operand)) => {
                Term::Apply(operator.to_term(), operand.to_term())
            }
            Type::Product(dimensions) => {
                Term::Product(dimensions.iter().map(|d| d.to_term()).collect())
            }
            Type::Sum(options) => Term::Sum(options.iter().map(|o| o.to_term()).collect()),
        };
        Rc::new(term)
    }
}

pub struct Bound<'a> {
    ty: &'a Type,
    bindings: Option<&'a Bindings>,
}

impl<'a> Bound<'a> {
    fn nested(&self, ty: &'a Type) -> Self {
        Bound {
            ty,
            bindings: self.bindings,
        }
    }

    fn write_form(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        head: &str,
        items: &'a [Rc<Type>],
    ) -> std::fmt::Result {
        f.write_str("(")?;
        f.write_str(head)?;
        for item in items {
            f.write_fmt(format_args!(" {}", self.nested(item)))?;
        }
        f.write_str(")")
    }
}

impl std::fmt::Display for Bound<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.ty {
            Type::Id(name) => f.write_str(name),
            Type::Unreachable => f.write_str(UNREACHABLE),
            Type::Variable(name) => match self.bindings.and_then(|b| b.get(name)) {
                Some(instance) => f.write_fmt(format_args!("{}", self.nested(instance))),
                None => f.write_fmt(format_args!("(any {name})")),
            },
            Type::Operator(operator, None) => {
                f.write_fmt(format_args!("{}", self.nested(operator)))
            }
            Type::Operator(operator, Some(operand)) => f.write_fmt(format_args!(
                "({} {})",
                self.nested(operator),
                self.nested(operand)
            )),
            Type::Product(dimensions) => self.write_form(f, "and", dimensions),
            Type::Sum(options) => self.write_form(f, "or", options),
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bound = Bound {
            ty: self,
            bindings: None,
        };
        f.write_fmt(format_args!("{bound}"))
    }
}

/// A substitution from type variable names to types. Entries are only ever
/// added, never replaced.
#[derive(Default, Clone, PartialEq, Eq, Debug)]
pub struct Bindings {
    map: RedBlackTreeMap<Identifier, Rc<Type>>,
}

impl Bindings {
    pub fn get(&self, name: &Identifier) -> Option<&Rc<Type>> {
        self.map.get(name)
    }

    pub fn len(&self) -> usize {
        self.map.size()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &Rc<Type>)> {
        self.map.iter()
    }

    pub fn extended(&self, name: Identifier, ty: Rc<Type>) -> Checked<Self> {
        if self.map.contains_key(&name) {
            return Err(InvariantViolation::Rebinding(name.to_string()));
        }
        Ok(Bindings {
            map: self.map.insert(name, ty),
        })
    }

    /// Follows variable links until reaching a non-variable or an unbound variable.
    pub fn prune(&self, ty: &Rc<Type>) -> Rc<Type> {
        let mut ty = ty.clone();
        while let Type::Variable(name) = ty.as_ref() {
            match self.get(name) {
                Some(next) => ty = next.clone(),
                None => break,
            }
        }
        ty
    }

    /// The raw entries, without resolving through other entries.
    pub fn snapshot(&self) -> String {
        self.iter()
            .map(|(name, ty)| format!("{name}={ty}"))
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl std::fmt::Display for Bindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (name, ty)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_fmt(format_args!("{name}: {}", ty.with(self)))?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;

    use super::*;

    fn bind(bindings: &Bindings, name: &str, ty: Rc<Type>) -> Bindings {
        bindings.extended(Rc::new(name.into()), ty).unwrap()
    }

    #[test]
    fn test_rendering() {
        let node = Type::apply(Type::id("Node"), Type::variable("V"));
        let ty = Type::Product(vec![Type::id("int"), node]);
        assert_eq!(ty.to_string(), "(and int (Node (any V)))");

        let bindings = bind(&Bindings::default(), "V", Type::id("int"));
        assert_eq!(ty.with(&bindings).to_string(), "(and int (Node int))");

        let nullary = Type::Operator(Type::id("Null"), None);
        assert_eq!(nullary.to_string(), "Null");
        assert_eq!(Type::Sum(vec![]).to_string(), "(or)");
        assert_eq!(Type::Unreachable.to_string(), "void");
    }

    #[test]
    fn test_prune_follows_chains() {
        let bindings = bind(&Bindings::default(), "A", Type::variable("B"));
        let bindings = bind(&bindings, "B", Type::id("int"));
        assert_eq!(bindings.prune(&Type::variable("A")), Type::id("int"));
        assert_eq!(bindings.prune(&Type::variable("C")), Type::variable("C"));
        let list = Type::apply(Type::id("List"), Type::variable("A"));
        assert_eq!(bindings.prune(&list), list);
        assert_eq!(bindings.to_string(), "{A: int, B: int}");
        assert_eq!(bindings.snapshot(), "A=(any B);B=int");
    }

    #[test]
    fn test_rebinding_is_a_violation() {
        let bindings = bind(&Bindings::default(), "A", Type::id("int"));
        assert_eq!(
            bindings.extended(Rc::new("A".into()), Type::id("bool")),
            Err(InvariantViolation::Rebinding("A".into()))
        );
    }

    #[test]
    fn test_fully_bind() {
        let bindings = bind(&Bindings::default(), "A", Type::id("int"));
        let ty = Type::Sum(vec![
            Type::apply(Type::id("Just"), Type::variable("A")),
            Type::apply(Type::id("Just"), Type::variable("B")),
        ]);
        let bound = ty.fully_bind(&bindings);
        assert_eq!(bound.to_string(), "(or (Just int) (Just void))");
        assert_eq!(bound.to_term().to_string(), "(or (Just int) (Just void))");
        assert_eq!(Type::variable("B").to_term().to_string(), "(any B)");
    }

    #[test]
    fn test_substitute_does_not_rewrite_the_replacement() {
        let body = Type::Sum(vec![
            Type::id("Null"),
            Type::apply(Type::id("Node"), Type::id("T")),
        ]);
        let body = Rc::new(body);
        let expanded = body.substitute(&Rc::new("T".into()), &Type::id("T"));
        assert_eq!(expanded.to_string(), "(or Null (Node T))");
        let expanded = body.substitute(&Rc::new("T".into()), &Type::id("int"));
        assert_eq!(expanded.to_string(), "(or Null (Node int))");
    }

    #[test]
    fn test_fresh_variables_are_unique() {
        let names = (0..1000)
            .map(|_| Type::fresh_variable().to_string())
            .collect::<HashSet<_>>();
        assert_eq!(names.len(), 1000);
    }
}
