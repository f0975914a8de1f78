use error_stack::Context;

/// A generic error context to use when a dedicated error type isn't worth it.
#[derive(Debug, Default)]
pub struct AnyErr;

impl std::fmt::Display for AnyErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AnyErr")
    }
}

impl Context for AnyErr {}
