//! Process exit codes for client commands, so scripts can tell a missing
//! download from a rejected request.

pub const SUCCESS: i32 = 0;
/// Daemon unreachable, move failure, or anything else
pub const ERROR: i32 = 1;
pub const NOT_FOUND: i32 = 2;
/// Validation failure or illegal state transition
pub const INVALID_INPUT: i32 = 3;
