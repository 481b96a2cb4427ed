//! Core types and traits shared by every `signond` component.
//!
//! This crate provides:
//! - The structured error taxonomy (`SignonError`) every other crate
//!   propagates into.
//! - The property-map representation (`PropertyMap`) used on the wire
//!   between the daemon, plugins and the UI dialog.
//! - Identity domain types (`IdentityId`, `AppToken`, `MethodName`,
//!   `MechanismName`, `CredentialsType`, `IdentityInfo`).
//! - The `Disposable` inactivity-timeout base behaviour shared by
//!   `signon-identity` and `signon-session`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod disposable;
pub mod error;
pub mod identity_info;
pub mod ids;
pub mod property_map;

pub use disposable::{Disposable, DisposableRegistry, DisposableState};
pub use error::{ErrorKind, SignonError, SignonResult};
pub use identity_info::{CredentialsType, IdentityInfo};
pub use ids::{AppToken, IdentityId, MechanismName, MethodName};
pub use property_map::PropertyMap;

/// Well-known property-map keys, preserved verbatim for wire compatibility
/// with existing plugins and UI dialogs.
pub mod keys {
    /// Username field.
    pub const USER_NAME: &str = "UserName";
    /// Secret (password) field.
    pub const SECRET: &str = "Secret";
    /// Realm field.
    pub const REALM: &str = "Realm";
    /// Caption field.
    pub const CAPTION: &str = "Caption";
    /// Whether the identity backing this session is already stored.
    pub const STORED_IDENTITY: &str = "StoredIdentity";
    /// UI policy selector (see `signon_session::UiPolicy`).
    pub const UI_POLICY: &str = "UiPolicy";
    /// Whether the dialog should prompt for a password.
    pub const QUERY_PASSWORD: &str = "QueryPassword";
    /// Message to show alongside a query dialog.
    pub const QUERY_MESSAGE: &str = "QueryMessage";
    /// Translatable id for the query message.
    pub const QUERY_MESSAGE_ID: &str = "QueryMessageId";
    /// Identifier correlating a UI request with its reply.
    pub const REQUEST_ID: &str = "requestId";
    /// Whether a refresh round-trip is required before retrying.
    pub const REFRESH_REQUIRED: &str = "refreshRequired";
    /// Captcha challenge URL.
    pub const CAPTCHA_URL: &str = "CaptchaUrl";
    /// Captcha challenge image, base64-encoded.
    pub const CAPTCHA_IMAGE: &str = "CaptchaImage";
    /// Error code surfaced by a failed UI query.
    pub const QUERY_ERROR_CODE: &str = "QueryErrorCode";
    /// Whether the user asked to remember this credential.
    pub const REMEMBER: &str = "Remember";
    /// Watchdog/keep-alive marker forwarded to plugins.
    pub const WATCHDOG: &str = "watchdog";
    /// Access-control tokens injected by the core at dispatch time.
    pub const ACL_TOKENS: &str = "AccessControlTokens";
}
