use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParamError {
    #[error("Parameter name '{0}' is declared more than once")]
    DuplicateName(String),

    // Constraints resolve only against names already declared (see
    // `expr::resolver`), so a cycle can never be built in the first place;
    // there is no separate cycle-detection pass to report one from.
    #[error("Constraint for '{0}' references undefined parameter '{1}'")]
    UndefinedReference(String, String),

    #[error("Division by zero while evaluating the constraint for '{0}'")]
    DivisionByZero(String),

    #[error("Parameter '{0}' value {1} lies outside its bounds [{2}, {3}]")]
    OutOfBounds(String, f64, f64, f64),

    #[error("Mixture-fraction parameter '{0}' must lie within [0, 1], got {1}")]
    InvalidMixFrac(String, f64),

    #[error("Expected {0} free parameter values, got {1}")]
    FreeVectorLengthMismatch(usize, usize),

    #[error("Unknown function '{0}' referenced in a constraint expression")]
    UnknownFunction(String),

    #[error("Unparsable constraint expression for '{0}': {1}")]
    MalformedExpression(String, String),
}
