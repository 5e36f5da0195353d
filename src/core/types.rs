/*!
 * Core Types
 * Common types used across the monitoring services
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;

/// Opaque allocation key (an address, or any caller-chosen integer)
pub type Address = usize;

/// Handle returned by every callback and threshold registry
pub type HandleId = u64;

/// Where an event or traced call originated
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub function: String,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
        }
    }

    /// Location of the caller, via `#[track_caller]`
    ///
    /// The platform primitive carries no function name, so `function` is
    /// left empty unless set with [`SourceLocation::in_function`].
    #[track_caller]
    pub fn caller() -> Self {
        let loc = Location::caller();
        Self::new(loc.file(), loc.line(), "")
    }

    pub fn in_function(mut self, function: impl Into<String>) -> Self {
        self.function = function.into();
        self
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}, {}", self.file, self.line, self.function)
    }
}

/// Capture the current source location, including the enclosing module path
#[macro_export]
macro_rules! here {
    () => {
        $crate::core::types::SourceLocation::new(file!(), line!(), module_path!())
    };
    ($function:expr) => {
        $crate::core::types::SourceLocation::new(file!(), line!(), $function)
    };
}
