use std::rc::Rc;

use tracing::{debug, info};

use crate::{
    evaluator::{self, evaluate_bounded, Env},
    macros::TypeLambda,
    prelude::*,
    reader::{self, Sexp},
    term::{lambdify, Term},
    types::{Bindings, Type},
    unify::{self, Unification, Unifier},
};

/// Name under which the last evaluated value is kept.
pub const LAST_VALUE: &str = "_";

#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub read_depth: usize,
    pub eval_depth: usize,
    pub unify_depth: usize,
}
impl Default for Limits {
    fn default() -> Self {
        Limits {
            read_depth: reader::DEFAULT_DEPTH,
            eval_depth: evaluator::DEFAULT_DEPTH,
            unify_depth: unify::DEFAULT_DEPTH,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("could not parse `{input}`")]
    Parse { input: String, errors: Vec<Error> },
    #[error("`{0}` is not a lambda and cannot define a macro")]
    NotAMacro(String),
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error(transparent)]
    Violation(#[from] InvariantViolation),
}
impl SessionError {
    fn parse(input: &str, errors: Vec<Error>) -> Self {
        SessionError::Parse {
            input: input.to_string(),
            errors,
        }
    }

    /// Violations mean the engine itself is broken; nothing after them can be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Violation(_))
    }
}

#[derive(Debug)]
pub enum Response {
    Value(Rc<Term>),
    Macro {
        name: Identifier,
        lambda: TypeLambda,
    },
    Unified {
        outbound: Rc<Term>,
        inbound: Rc<Term>,
        unified: String,
        reason: String,
        bindings: Bindings,
        final_type: Rc<Term>,
    },
    Mismatch {
        outbound: Rc<Term>,
        inbound: Rc<Term>,
        reason: String,
    },
    Parsed(Sexp),
    Typed(Rc<Type>),
    Env(Vec<String>),
    Help,
}

const HELP: &str = r#"
term                -- evaluate the term, binding it to the next 'N name
(unify out in)      -- unify the types of two terms
(defmacro Name (lambda T body))
                    -- define a type-level macro used by unification
:parse      term    -- show the read s-expression
:type       term    -- show the type of the evaluated term
:env                -- show named definitions and macros
:help               -- show this message
"#;

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Response::Value(term) => f.write_fmt(format_args!("{term}")),
            Response::Macro { name, lambda } => {
                f.write_fmt(format_args!("(defmacro {name} {lambda})"))
            }
            Response::Unified {
                outbound,
                inbound,
                unified,
                bindings,
                final_type,
                ..
            } => f.write_fmt(format_args!(
                "Unified {outbound} <: {inbound} to {unified} with {bindings}\n\
                 Final type is {final_type}"
            )),
            Response::Mismatch {
                outbound,
                inbound,
                reason,
            } => f.write_fmt(format_args!(
                "Unification {outbound} <: {inbound} failed: {reason}"
            )),
            Response::Parsed(sexp) => f.write_fmt(format_args!("{sexp}")),
            Response::Typed(ty) => f.write_fmt(format_args!("{ty}")),
            Response::Env(entries) => f.write_str(&entries.join("\n")),
            Response::Help => f.write_str(HELP.trim()),
        }
    }
}

/// Script lines worth evaluating, with their 1-based line numbers. Blank
/// lines and `#` comments are skipped.
pub fn script_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

#[derive(Default)]
pub struct Session {
    env: Env,
    inputs: usize,
    limits: Limits,
}

impl Session {
    pub fn new(limits: Limits) -> Self {
        Session {
            limits,
            ..Default::default()
        }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn next_input_name(&self) -> String {
        format!("'{}", self.inputs)
    }

    /// Handles one line of interactive input: a `:command` or a term that is
    /// remembered under the next `'N` name.
    pub fn handle(&mut self, input: &str) -> Result<Response, SessionError> {
        let input = input.trim();
        let (cmd, input) = if let Some(stripped) = input.strip_prefix(':') {
            stripped
                .trim_start()
                .split_once(' ')
                .unwrap_or((stripped, ""))
        } else {
            ("", input)
        };
        match cmd {
            "p" | "parse" => Ok(Response::Parsed(
                reader::parse_bounded(input, self.limits.read_depth)
                    .map_err(|errors| SessionError::parse(input, errors))?
                    .forget_span(),
            )),
            "t" | "type" => {
                let term = self.read(input)?;
                let value = evaluate_bounded(&term, &self.env, self.limits.eval_depth)?;
                Ok(Response::Typed(value.to_type()?))
            }
            "env" => Ok(Response::Env(self.describe_env())),
            "h" | "help" => Ok(Response::Help),
            "" => {
                let name = self.next_input_name();
                self.inputs += 1;
                self.evaluate(Some(name), input)
            }
            _ => Err(SessionError::UnknownCommand(cmd.to_string())),
        }
    }

    /// Evaluates one term, optionally remembering it under `name`.
    pub fn evaluate(
        &mut self,
        name: Option<String>,
        input: &str,
    ) -> Result<Response, SessionError> {
        let term = self.read(input)?;
        if let Some(name) = name {
            debug!("binding {name} to {term}");
            self.env.add_term(Rc::new(name), term.clone());
        }
        match term.as_ref() {
            Term::Unify(outbound, inbound) => self.unify(outbound, inbound),
            Term::DefMacro(name, body) => self.define_macro(name, body),
            _ => {
                let value = evaluate_bounded(&term, &self.env, self.limits.eval_depth)?;
                self.env
                    .add_term(Rc::new(LAST_VALUE.to_string()), value.clone());
                Ok(Response::Value(value))
            }
        }
    }

    fn read(&self, input: &str) -> Result<Rc<Term>, SessionError> {
        let sexp = reader::parse_bounded(input, self.limits.read_depth)
            .map_err(|errors| SessionError::parse(input, errors))?;
        lambdify(&sexp).map_err(|errors| SessionError::parse(input, errors))
    }

    fn define_macro(
        &mut self,
        name: &Identifier,
        body: &Rc<Term>,
    ) -> Result<Response, SessionError> {
        let value = evaluate_bounded(body, &self.env, self.limits.eval_depth)?;
        let lambda = TypeLambda::from_term(&value)
            .ok_or_else(|| SessionError::NotAMacro(value.to_string()))??;
        info!("defined macro {name} as {lambda}");
        self.env.add_macro(name.clone(), lambda.clone());
        Ok(Response::Macro {
            name: name.clone(),
            lambda,
        })
    }

    fn unify(&mut self, outbound: &Rc<Term>, inbound: &Rc<Term>) -> Result<Response, SessionError> {
        let (outbound_type, result) = Unifier::new(self.env.macros())
            .with_max_depth(self.limits.unify_depth)
            .with_eval_depth(self.limits.eval_depth)
            .unify_terms(&self.env, outbound, inbound)?;
        info!(success = result.is_success(), "unified {outbound} <: {inbound}");
        Ok(match result {
            Unification::Unified { reason, bindings } => Response::Unified {
                outbound: outbound.clone(),
                inbound: inbound.clone(),
                unified: outbound_type.with(&bindings).to_string(),
                final_type: outbound_type.fully_bind(&bindings).to_term(),
                reason,
                bindings,
            },
            Unification::Mismatch { reason } => Response::Mismatch {
                outbound: outbound.clone(),
                inbound: inbound.clone(),
                reason,
            },
        })
    }

    fn describe_env(&self) -> Vec<String> {
        let mut terms = self
            .env
            .terms()
            .filter(|(name, _)| !name.starts_with('\''))
            .map(|(name, term)| format!("{name}: {term}"))
            .collect::<Vec<_>>();
        terms.sort();
        let mut macros = self
            .env
            .macros()
            .iter()
            .map(|(name, lambda)| format!("macro {name}: {lambda}"))
            .collect::<Vec<_>>();
        macros.sort();
        terms.extend(macros);
        terms
    }
}
