//! Customized unified error type.

use std::error;
use std::fmt;
use std::io;
use std::net;
use std::num;
use std::string;

/// Customized error type for RingKv.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RingKvError(String);

impl RingKvError {
    pub fn msg(msg: impl ToString) -> Self {
        RingKvError(msg.to_string())
    }
}

impl fmt::Display for RingKvError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0) // do not display literal quotes
    }
}

impl error::Error for RingKvError {}

// Helper macro for saving boiler-plate `impl From<X>`s for transparent
// conversion from various common error types to `RingKvError`.
macro_rules! impl_from_error {
    ($error:ty) => {
        impl From<$error> for RingKvError {
            fn from(e: $error) -> Self {
                // just store the source error's string representation
                RingKvError(e.to_string())
            }
        }
    };
}

impl_from_error!(io::Error);
impl_from_error!(string::FromUtf8Error);
impl_from_error!(num::ParseIntError);
impl_from_error!(net::AddrParseError);
impl_from_error!(rmp_serde::encode::Error);
impl_from_error!(rmp_serde::decode::Error);
impl_from_error!(toml::de::Error);
