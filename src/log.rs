//! Logging interface, contingent on the `log` or `defmt-03` features
//!
//! Messages only format integers and string slices, so that both
//! backends accept the same format strings. Without a backend, the
//! arguments are still evaluated by reference, so they never go unused.
//! Don't enable logging when your logger writes over this USB device!

macro_rules! trace {
    ($fmt:tt $(, $arg:expr)* $(,)?) => {
        #[cfg(feature = "log")]
        ::log::trace!($fmt $(, $arg)*);
        #[cfg(feature = "defmt-03")]
        ::defmt_03::trace!($fmt $(, $arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt-03")))]
        let _ = ($(&$arg,)*);
    };
}

macro_rules! debug {
    ($fmt:tt $(, $arg:expr)* $(,)?) => {
        #[cfg(feature = "log")]
        ::log::debug!($fmt $(, $arg)*);
        #[cfg(feature = "defmt-03")]
        ::defmt_03::debug!($fmt $(, $arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt-03")))]
        let _ = ($(&$arg,)*);
    };
}

macro_rules! info {
    ($fmt:tt $(, $arg:expr)* $(,)?) => {
        #[cfg(feature = "log")]
        ::log::info!($fmt $(, $arg)*);
        #[cfg(feature = "defmt-03")]
        ::defmt_03::info!($fmt $(, $arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt-03")))]
        let _ = ($(&$arg,)*);
    };
}

macro_rules! warn {
    ($fmt:tt $(, $arg:expr)* $(,)?) => {
        #[cfg(feature = "log")]
        ::log::warn!($fmt $(, $arg)*);
        #[cfg(feature = "defmt-03")]
        ::defmt_03::warn!($fmt $(, $arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt-03")))]
        let _ = ($(&$arg,)*);
    };
}

macro_rules! error {
    ($fmt:tt $(, $arg:expr)* $(,)?) => {
        #[cfg(feature = "log")]
        ::log::error!($fmt $(, $arg)*);
        #[cfg(feature = "defmt-03")]
        ::defmt_03::error!($fmt $(, $arg)*);
        #[cfg(not(any(feature = "log", feature = "defmt-03")))]
        let _ = ($(&$arg,)*);
    };
}
