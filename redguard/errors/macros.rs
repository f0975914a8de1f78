/// Build an [`AnyErr`](crate::errors::AnyErr) report from nothing, or from a
/// message with optional formatting args.
#[macro_export]
macro_rules! anyerr {
    () => {
        $crate::errors::error_stack::Report::new($crate::errors::AnyErr)
    };

    ($msg:literal) => {
        $crate::errors::error_stack::Report::new($crate::errors::AnyErr).attach_printable($msg)
    };

    ($msg:literal, $($arg:expr),* $(,)?) => {
        $crate::errors::error_stack::Report::new($crate::errors::AnyErr)
            .attach_printable(format!($msg, $($arg),*))
    };
}
