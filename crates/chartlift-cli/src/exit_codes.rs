//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

#![allow(dead_code)]

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Input error - malformed chart reference or flag combination
pub const INPUT_ERROR: i32 = 2;

/// Fetch error - repository unreachable, chart or version not found
pub const FETCH_ERROR: i32 = 3;

/// Chart error - invalid chart content or unsafe archive entry
pub const CHART_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Image error - manifest rendering or image transfer failed
pub const IMAGE_ERROR: i32 = 6;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
