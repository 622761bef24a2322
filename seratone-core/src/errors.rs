// Seratone
// Copyright (c) 2026 The Project Seratone Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Seratone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// An invalid mode selection or out-of-range parameter was given at configure time.
    ConfigError(&'static str),
    /// The sample container at the boundary was malformed (wrong rate, depth, or channel count).
    FormatError(&'static str),
    /// The correlator could not find a synchronisation preamble above threshold.
    NoSync,
    /// Synchronisation was acquired, but the mode probes did not match any known pattern.
    UnknownMode,
    /// Synchronisation and mode detection succeeded, but the decoded payload is unreliable. The
    /// payload is still surfaced so that callers may inspect it.
    DecodeFailure(&'static str),
    /// An assertion was violated inside the core (singular solver, buffer underflow). This is the
    /// implementation-bug class of error and is always logged before propagation.
    InternalError(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::ConfigError(msg) => {
                write!(f, "invalid configuration: {}", msg)
            }
            Error::FormatError(msg) => {
                write!(f, "malformed waveform container: {}", msg)
            }
            Error::NoSync => {
                write!(f, "no synchronisation preamble found")
            }
            Error::UnknownMode => {
                write!(f, "mode probes did not match any known operating mode")
            }
            Error::DecodeFailure(msg) => {
                write!(f, "unreliable decode: {}", msg)
            }
            Error::InternalError(msg) => {
                write!(f, "internal error: {}", msg)
            }
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create a configuration error.
pub fn config_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::ConfigError(msg))
}

/// Convenience function to create a format error.
pub fn format_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::FormatError(msg))
}

/// Convenience function to create a decode-failure error.
pub fn decode_failure_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::DecodeFailure(msg))
}

/// Convenience function to create an internal error.
pub fn internal_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::InternalError(msg))
}
