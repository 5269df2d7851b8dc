//! Helper macros for the provisioning protocol state machine modules.

/// Generate debug formatting code for a state or event carrying the
/// session I/O bundle.
#[macro_export]
macro_rules! debug_fmt_session_io {
    ($io:ident, $f:ident) => {
        $f.debug_tuple("").field(&$io.link.describe())
    };
}
