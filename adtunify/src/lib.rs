pub mod evaluator;
pub mod macros;
pub mod prelude;
pub mod reader;
pub mod session;
pub mod term;
pub mod types;
pub mod unify;
