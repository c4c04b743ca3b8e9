//! Log through `log` or `defmt`, whichever feature is enabled.  With neither, log statements
//! compile to nothing but still borrow their arguments, so no unused-variable warnings appear.

macro_rules! log_at {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {{
        #[cfg(feature = "log")]
        ::log::$level!($s $(, $x)*);
        #[cfg(feature = "defmt")]
        ::defmt::$level!($s $(, $x)*);
        #[cfg(not(any(feature = "log", feature = "defmt")))]
        let _ = ($(&$x),*);
    }};
}

macro_rules! error {
    ($($args:tt)*) => { $crate::fmt::log_at!(error, $($args)*) };
}

// Named "warning" so it does not clash with the builtin warn attribute; exported as warn.
macro_rules! warning {
    ($($args:tt)*) => { $crate::fmt::log_at!(warn, $($args)*) };
}

macro_rules! debug {
    ($($args:tt)*) => { $crate::fmt::log_at!(debug, $($args)*) };
}

macro_rules! trace {
    ($($args:tt)*) => { $crate::fmt::log_at!(trace, $($args)*) };
}

pub(crate) use {debug, error, log_at, trace, warning as warn};
