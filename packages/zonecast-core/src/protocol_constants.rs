//! Fixed protocol constants that should NOT be changed.
//!
//! These values form the wire contract with existing HTTP clients (path shape,
//! header names, option keys). Tunable timings live in [`crate::state::ActionDefaults`].

use axum::http::HeaderName;

// ─────────────────────────────────────────────────────────────────────────────
// Route Shape
// ─────────────────────────────────────────────────────────────────────────────

/// First non-empty path segment of every API route.
pub const API_ROOT: &str = "zonecast";

/// Segment for command-style routes (`/zonecast/controller/<action>`).
pub const CONTROLLER_SEGMENT: &str = "controller";

/// Segment for read-style routes (`/zonecast/data/<action>`).
pub const DATA_SEGMENT: &str = "data";

/// Number of `/`-separated segments in a valid action path.
///
/// `"/zonecast/controller/play"` splits into `["", "zonecast", "controller", "play"]`.
pub const ACTION_PATH_SEGMENTS: usize = 4;

// ─────────────────────────────────────────────────────────────────────────────
// Query Options
// ─────────────────────────────────────────────────────────────────────────────

/// Delimiter for options that carry several values (`id=Kitchen,Office`).
pub const MULTI_VALUE_DELIMITER: char = ',';

/// Option disabling convergence waits (`sync=false`).
pub const OPTION_SYNC: &str = "sync";

/// Option overriding the post-execution settle delay in milliseconds.
pub const OPTION_WAIT: &str = "wait";

/// Option carrying the client's last seen resource version.
pub const OPTION_LAST_UPDATE_ID: &str = "lastupdateid";

/// Option overriding the long-poll timeout in milliseconds.
pub const OPTION_TIMEOUT: &str = "timeout";

/// Option carrying a client session identifier.
pub const OPTION_SESSION_ID: &str = "sessionid";

// ─────────────────────────────────────────────────────────────────────────────
// Response Headers
// ─────────────────────────────────────────────────────────────────────────────

// Header names are case-insensitive; `HeaderName` stores the lower-case form
// of `updateId` and `sessionId`.

/// Response header carrying the current resource version.
pub const HEADER_UPDATE_ID: HeaderName = HeaderName::from_static("updateid");

/// Response header echoing the client session.
pub const HEADER_SESSION_ID: HeaderName = HeaderName::from_static("sessionid");

// ─────────────────────────────────────────────────────────────────────────────
// Process
// ─────────────────────────────────────────────────────────────────────────────

/// Exit code used when a fatal action terminates the process (`EX_SOFTWARE`).
pub const CRASH_EXIT_CODE: i32 = 70;

/// Product name reported by `GETVERSION`.
pub const APP_NAME: &str = "Zonecast";
