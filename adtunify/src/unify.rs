use std::{collections::HashMap, rc::Rc};

use tracing::{debug, trace};

use crate::{
    evaluator::{self, evaluate_bounded, Env},
    macros::MacroTable,
    prelude::*,
    term::Term,
    types::{Bindings, Type},
};

pub const DEFAULT_DEPTH: usize = 512;

#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Unification {
    Unified { reason: String, bindings: Bindings },
    Mismatch { reason: String },
}

impl Unification {
    fn unified(bindings: Bindings, reason: impl Into<String>) -> Self {
        Unification::Unified {
            reason: reason.into(),
            bindings,
        }
    }
    fn mismatch(reason: impl Into<String>) -> Self {
        Unification::Mismatch {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Unification::Unified { .. })
    }
    pub fn reason(&self) -> &str {
        match self {
            Unification::Unified { reason, .. } | Unification::Mismatch { reason } => reason,
        }
    }
    pub fn bindings(&self) -> Option<&Bindings> {
        match self {
            Unification::Unified { bindings, .. } => Some(bindings),
            Unification::Mismatch { .. } => None,
        }
    }
}

/// Whether the variable `name` appears anywhere inside `ty`.
pub fn occurs_in_type(name: &Identifier, ty: &Rc<Type>, bindings: &Bindings) -> bool {
    let ty = bindings.prune(ty);
    match ty.as_ref() {
        Type::Variable(other) => other == name,
        Type::Id(_) | Type::Unreachable => false,
        Type::Operator(operator, operand) => {
            occurs_in_type(name, operator, bindings)
                || operand
                    .as_ref()
                    .map_or(false, |operand| occurs_in_type(name, operand, bindings))
        }
        Type::Product(items) | Type::Sum(items) => {
            items.iter().any(|item| occurs_in_type(name, item, bindings))
        }
    }
}

/// State of one top-level unification: the calls already made (`None` while
/// still in progress) and the current recursion depth.
pub struct Unifier<'m> {
    macros: &'m MacroTable,
    visited: HashMap<String, Option<Unification>>,
    hits: usize,
    depth: usize,
    max_depth: usize,
    eval_depth: usize,
}

impl<'m> Unifier<'m> {
    pub fn new(macros: &'m MacroTable) -> Self {
        Unifier {
            macros,
            visited: HashMap::new(),
            hits: 0,
            depth: 0,
            max_depth: DEFAULT_DEPTH,
            eval_depth: evaluator::DEFAULT_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Depth limit for evaluating terms in `unify_terms`.
    pub fn with_eval_depth(mut self, eval_depth: usize) -> Self {
        self.eval_depth = eval_depth;
        self
    }

    /// How many calls were answered from the memo.
    pub fn memo_hits(&self) -> usize {
        self.hits
    }

    /// Evaluates both terms under `env` and unifies their types. The outbound
    /// type is returned too, for rendering under the resulting bindings.
    pub fn unify_terms(
        &mut self,
        env: &Env,
        outbound: &Rc<Term>,
        inbound: &Rc<Term>,
    ) -> Checked<(Rc<Type>, Unification)> {
        let outbound = evaluate_bounded(outbound, env, self.eval_depth)?.to_type()?;
        let inbound = evaluate_bounded(inbound, env, self.eval_depth)?.to_type()?;
        let result = self.unify(&outbound, &inbound, &Bindings::default())?;
        Ok((outbound, result))
    }

    pub fn unify(
        &mut self,
        outbound: &Rc<Type>,
        inbound: &Rc<Type>,
        bindings: &Bindings,
    ) -> Checked<Unification> {
        let a = bindings.prune(outbound);
        let b = bindings.prune(inbound);
        let key = format!(
            "{}|{}|{}",
            a.with(bindings),
            b.with(bindings),
            bindings.snapshot()
        );
        match self.visited.get(&key) {
            Some(Some(done)) => {
                trace!(%key, "memo hit");
                self.hits += 1;
                return Ok(done.clone());
            }
            Some(None) => return Err(InvariantViolation::CyclicUnification(key)),
            None => {}
        }
        if self.depth >= self.max_depth {
            return Err(InvariantViolation::DepthExceeded(self.max_depth));
        }
        trace!(outbound = %a.with(bindings), inbound = %b.with(bindings), "unifying");

        self.visited.insert(key.clone(), None);
        self.depth += 1;
        let result = self.unify_pruned(&a, &b, bindings);
        self.depth -= 1;
        let result = result?;
        self.visited.insert(key, Some(result.clone()));
        Ok(result)
    }

    fn unify_pruned(
        &mut self,
        a: &Rc<Type>,
        b: &Rc<Type>,
        bindings: &Bindings,
    ) -> Checked<Unification> {
        let rendered_a = a.with(bindings).to_string();
        let rendered_b = b.with(bindings).to_string();
        if rendered_a == rendered_b {
            return Ok(Unification::unified(bindings.clone(), "types are identical"));
        }

        match (a.as_ref(), b.as_ref()) {
            (Type::Variable(name), _) => {
                if occurs_in_type(name, b, bindings) {
                    return Ok(Unification::mismatch("recursive unification"));
                }
                let bindings = bindings.extended(name.clone(), b.clone())?;
                debug!("bound {name} to {rendered_b}");
                Ok(Unification::unified(
                    bindings,
                    format!("bound {name} to {rendered_b}"),
                ))
            }
            (_, Type::Variable(_)) => self.unify(b, a, bindings),
            (Type::Product(dimensions), _) => self.unify_product(dimensions, b, bindings),
            (Type::Sum(_), Type::Sum(inbound)) => self.unify_sums(a, inbound, bindings),
            (Type::Sum(options), _) => self.unify_options(a, options, b, bindings),
            (Type::Operator(operator, operand), _) => {
                self.unify_operator(a, operator, operand.as_ref(), b, bindings)
            }
            _ => Ok(Unification::mismatch(format!(
                "{rendered_a} <> {rendered_b}"
            ))),
        }
    }

    fn unify_product(
        &mut self,
        dimensions: &[Rc<Type>],
        b: &Rc<Type>,
        bindings: &Bindings,
    ) -> Checked<Unification> {
        let inbound = match b.as_ref() {
            Type::Product(inbound) => inbound,
            _ => return Ok(Unification::mismatch("inbound type is not a product type")),
        };
        if dimensions.len() != inbound.len() {
            return Ok(Unification::mismatch("product type lengths do not match"));
        }
        let mut bindings = bindings.clone();
        for (a_dim, b_dim) in dimensions.iter().zip(inbound) {
            match self.unify(a_dim, b_dim, &bindings)? {
                Unification::Unified { bindings: next, .. } => bindings = next,
                mismatch => return Ok(mismatch),
            }
        }
        Ok(Unification::unified(bindings, "products match"))
    }

    /// The first outbound option, in declaration order, that accepts `b` wins.
    fn unify_options(
        &mut self,
        a: &Rc<Type>,
        options: &[Rc<Type>],
        b: &Rc<Type>,
        bindings: &Bindings,
    ) -> Checked<Unification> {
        let mut reasons = vec![];
        for option in options {
            match self.unify(option, b, bindings)? {
                Unification::Unified { bindings, .. } => {
                    let reason = format!("matches {}", option.with(&bindings));
                    return Ok(Unification::unified(bindings, reason));
                }
                Unification::Mismatch { reason } => reasons.push(reason),
            }
        }
        Ok(Unification::mismatch(format!(
            "{} is none of the options of {}:\n\t{}",
            b.with(bindings),
            a.with(bindings),
            reasons.join("\n\t")
        )))
    }

    /// Every inbound option has to be accepted by the whole outbound sum.
    fn unify_sums(
        &mut self,
        a: &Rc<Type>,
        inbound: &[Rc<Type>],
        bindings: &Bindings,
    ) -> Checked<Unification> {
        let mut bindings = bindings.clone();
        for option in inbound {
            match self.unify(a, option, &bindings)? {
                Unification::Unified { bindings: next, .. } => bindings = next,
                Unification::Mismatch { reason } => {
                    return Ok(Unification::mismatch(format!(
                        "could not find a match for {} in {}: {reason}",
                        option.with(&bindings),
                        a.with(&bindings)
                    )))
                }
            }
        }
        Ok(Unification::unified(
            bindings,
            "inbound type is a subset of outbound type",
        ))
    }

    fn unify_operator(
        &mut self,
        a: &Rc<Type>,
        operator: &Rc<Type>,
        operand: Option<&Rc<Type>>,
        b: &Rc<Type>,
        bindings: &Bindings,
    ) -> Checked<Unification> {
        if let Type::Operator(b_operator, b_operand) = b.as_ref() {
            if let Unification::Unified { bindings: next, .. } =
                self.unify(operator, b_operator, bindings)?
            {
                return match (operand, b_operand) {
                    (Some(operand), Some(b_operand)) => self.unify(operand, b_operand, &next),
                    (None, None) => Ok(Unification::unified(next, "operators match")),
                    _ => Ok(Unification::mismatch(format!(
                        "type mismatch: {} != {}",
                        a.with(&next),
                        b.with(&next)
                    ))),
                };
            }
        }

        match self.macros.expand(operator, operand, bindings) {
            Some(expanded) => self.unify(&expanded, b, bindings),
            None => Ok(Unification::mismatch(format!(
                "{} <> {}: {} is not a macro",
                a.with(bindings),
                b.with(bindings),
                operator.with(bindings)
            ))),
        }
    }
}

pub fn unify(
    outbound: &Rc<Type>,
    inbound: &Rc<Type>,
    macros: &MacroTable,
    bindings: &Bindings,
) -> Checked<Unification> {
    Unifier::new(macros).unify(outbound, inbound, bindings)
}

/// Evaluates both terms under `env` and unifies their types, expanding the
/// macros `env` defines on demand.
pub fn unify_terms(env: &Env, outbound: &Rc<Term>, inbound: &Rc<Term>) -> Checked<Unification> {
    Unifier::new(env.macros())
        .unify_terms(env, outbound, inbound)
        .map(|(_, result)| result)
}
