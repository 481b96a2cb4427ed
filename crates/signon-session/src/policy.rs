//! UI policy — the configuration enum applied at the single site in
//! `SessionCore` that mediates plugin `UI` tags (spec.md §9 "UI policy as
//! configuration").

/// How a [`crate::core::SessionCore`] should treat a plugin's `UI` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiPolicy {
    /// The plugin chooses whether and how to prompt.
    #[default]
    Default,
    /// Always prompt; strip any previously cached secret before the
    /// first `PROCESS` (spec.md §4.4).
    RequestPassword,
    /// Refuse any UI call outright with a `UserInteraction` error instead
    /// of showing a dialog (spec.md §4.4).
    NoUserInteraction,
    /// Allow only captcha-shaped dialogs (`CaptchaUrl`/`CaptchaImage`);
    /// anything else is treated the same as `NoUserInteraction`.
    Validation,
}

impl UiPolicy {
    /// Whether a dialog carrying `params` is permitted to be shown to
    /// the user under this policy.
    #[must_use]
    pub fn permits_dialog(self, params: &signon_core::PropertyMap) -> bool {
        match self {
            Self::Default | Self::RequestPassword => true,
            Self::NoUserInteraction => false,
            Self::Validation => {
                params.contains_key(signon_core::keys::CAPTCHA_URL)
                    || params.contains_key(signon_core::keys::CAPTCHA_IMAGE)
            }
        }
    }

    /// Whether this policy requires stripping any cached secret before
    /// the first `PROCESS` call (spec.md §4.4).
    #[must_use]
    pub fn strips_cached_secret(self) -> bool {
        matches!(self, Self::RequestPassword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signon_core::PropertyMap;

    #[test]
    fn no_user_interaction_permits_nothing() {
        let params = PropertyMap::new().with(signon_core::keys::CAPTCHA_URL, "https://example.com");
        assert!(!UiPolicy::NoUserInteraction.permits_dialog(&params));
    }

    #[test]
    fn validation_permits_only_captcha_shaped_dialogs() {
        let captcha = PropertyMap::new().with(signon_core::keys::CAPTCHA_URL, "https://example.com");
        let plain = PropertyMap::new().with(signon_core::keys::QUERY_MESSAGE, "enter password");
        assert!(UiPolicy::Validation.permits_dialog(&captcha));
        assert!(!UiPolicy::Validation.permits_dialog(&plain));
    }

    #[test]
    fn default_and_request_password_permit_everything() {
        let plain = PropertyMap::new();
        assert!(UiPolicy::Default.permits_dialog(&plain));
        assert!(UiPolicy::RequestPassword.permits_dialog(&plain));
    }

    #[test]
    fn only_request_password_strips_cached_secret() {
        assert!(UiPolicy::RequestPassword.strips_cached_secret());
        assert!(!UiPolicy::Default.strips_cached_secret());
        assert!(!UiPolicy::NoUserInteraction.strips_cached_secret());
    }
}
