use thiserror::Error;

/// Errors raised while compiling or evaluating a rule expression or
/// rendering an alarm template.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("expression must evaluate to bool, got {0}")]
    NotBoolean(&'static str),

    #[error("template error: {0}")]
    Template(String),
}

pub type Result<T> = std::result::Result<T, ExprError>;
