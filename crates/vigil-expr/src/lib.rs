//! Side-effect-free rule expressions and alarm templates.
//!
//! Rules are small boolean/arithmetic expressions over a fixed set of
//! bindings (see [`Env::for_point`]); alarms render Handlebars templates over
//! the same bindings.
//!
//! ```
//! use vigil_expr::{eval_rule, Env, Value};
//!
//! let mut env = Env::new();
//! env.bind("pointVal", Value::Int(30));
//! assert!(eval_rule("pointVal >= 25 && pointVal < 40", &env).unwrap());
//! ```

pub mod ast;
pub mod env;
pub mod error;
pub mod eval;
pub mod parser;
pub mod template;
pub mod value;

pub use ast::Expr;
pub use env::Env;
pub use error::{ExprError, Result};
pub use eval::{eval, eval_bool, MAX_EVAL_DEPTH};
pub use parser::{parse, MAX_EXPR_LEN, MAX_NESTING};
pub use template::render;
pub use value::Value;

/// Parses and evaluates a rule expression, requiring a boolean result.
pub fn eval_rule(src: &str, env: &Env) -> Result<bool> {
    eval_bool(&parse(src)?, env)
}
