use std::rc::Rc;

pub type Identifier = Rc<String>;

pub type Span = std::ops::Range<usize>;

#[derive(derive_more::AsRef, Clone, derive_more::Display, Debug)]
#[display(bound = "T: std::fmt::Display")]
#[display(fmt = "{value}")]
pub struct Spanned<T> {
    pub span: Span,
    #[as_ref]
    pub value: T,
}
impl<T> Spanned<T> {
    pub fn forget_span(self) -> T {
        self.value
    }
    pub fn value(&self) -> &T {
        &self.value
    }
    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

pub use chumsky::error::Error as _;
pub type Error<I = String> = chumsky::error::Simple<I, Span>;
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Engine defects. These abort the current unit of work and are never
/// reported as an ordinary type mismatch.
#[derive(thiserror::Error, Clone, PartialEq, Eq, Debug)]
pub enum InvariantViolation {
    #[error("`{0}` has no type; lambdas must be beta-reduced first")]
    NoTypeProjection(String),
    #[error("unification re-entered `{0}` while it was still in progress")]
    CyclicUnification(String),
    #[error("type variable `{0}` is already bound")]
    Rebinding(String),
    #[error("recursion depth limit {0} exceeded")]
    DepthExceeded(usize),
}

pub type Checked<T> = std::result::Result<T, InvariantViolation>;
