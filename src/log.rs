//! Driver logging, compiled in only with the hidden `__log` feature
//!
//! Keep the feature off in release builds. When it is on, point the log
//! sink at something other than this driver's serial port, or every
//! message triggers more messages.

macro_rules! debug {
    ($($args:tt)*) => {
        #[cfg(feature = "__log")]
        ::__log::debug!($($args)*)
    };
}

macro_rules! warn {
    ($($args:tt)*) => {
        #[cfg(feature = "__log")]
        ::__log::warn!($($args)*)
    };
}
