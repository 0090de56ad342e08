//! Default endpoint paths and client settings

use std::time::Duration;

/// Refresh endpoint path, relative to the API base URL
pub const DEFAULT_REFRESH_PATH: &str = "auth/refreshToken";

/// Login endpoint path, relative to the API base URL
pub const DEFAULT_LOGIN_PATH: &str = "auth/login";

/// Per-request timeout applied to API and refresh calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on buffered response bodies included in error messages
pub const ERROR_BODY_LIMIT: usize = 4096;
