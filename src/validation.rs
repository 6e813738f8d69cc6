//! Pure validation errors for the action model (§4.5). Never touches the
//! network.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unknown action kind")]
    UnknownAction,
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("parameter {0} out of range")]
    OutOfRange(&'static str),
}
