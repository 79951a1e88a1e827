//! Alipan OpenAPI endpoints and protocol constants

/// Production OpenAPI host
pub const DEFAULT_BASE_URL: &str = "https://openapi.alipan.com";

/// QR-code login session creation
pub const QRCODE_CREATE_PATH: &str = "/oauth/authorize/qrcode";

/// Token endpoint for both authorization_code and refresh_token grants
pub const TOKEN_PATH: &str = "/oauth/access_token";

/// Drive identity; returns `default_drive_id`
pub const DRIVE_INFO_PATH: &str = "/adrive/v1.0/user/getDriveInfo";

pub const SPACE_INFO_PATH: &str = "/adrive/v1.0/user/getSpaceInfo";

pub const USER_INFO_PATH: &str = "/adrive/v1.0/user/get";

pub const FILE_LIST_PATH: &str = "/adrive/v1.0/openFile/list";

pub const FILE_CREATE_PATH: &str = "/adrive/v1.0/openFile/create";

pub const FILE_DELETE_PATH: &str = "/adrive/v1.0/openFile/delete";

/// Scopes alist's AliyundriveOpen driver needs
pub const DEFAULT_SCOPES: &[&str] = &["user:base", "file:all:read", "file:all:write"];

/// Edge length in pixels of the generated QR image
pub const DEFAULT_QR_SIZE: u32 = 400;

/// Access token lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_EXPIRES_IN: u64 = 7200;

/// Sent on every provider request
pub const USER_AGENT: &str = concat!("alipan-auth-relay/", env!("CARGO_PKG_VERSION"));
