//! Request headers derived from the current settings.

use crate::settings::{Settings, SettingsStore};
use crate::transport::{ApiRequest, PreparedRequest};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const USER_ID_HEADER: &str = "X-User-Id";
pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

/// Ordered list of request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(&'static str, String)>);

impl Headers {
    /// Derives the outgoing headers for `settings`.
    ///
    /// Identity headers are omitted when their value is empty.
    #[must_use]
    pub fn for_settings(settings: &Settings) -> Self {
        let mut headers = vec![(CONTENT_TYPE, "application/json".to_string())];
        if !settings.user_id.is_empty() {
            headers.push((USER_ID_HEADER, settings.user_id.clone()));
        }
        if !settings.admin_key.is_empty() {
            headers.push((ADMIN_KEY_HEADER, settings.admin_key.clone()));
        }
        Self(headers)
    }

    /// Looks up a header by case-insensitive name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(key, value)| (*key, value.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Shapes outgoing requests with the caller's credentials.
///
/// Reads the settings store on every call, so a change is picked up by the
/// next request and never by one already prepared.
#[derive(Debug, Clone)]
pub struct CredentialProvider {
    settings: SettingsStore,
}

impl CredentialProvider {
    #[must_use]
    pub const fn new(settings: SettingsStore) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn headers(&self) -> Headers {
        Headers::for_settings(&self.settings.get())
    }

    /// Attaches the current headers to `request`, resolving its URL against `base`.
    ///
    /// `base` must end with a slash.
    #[must_use]
    pub fn prepare(&self, base: &str, request: &ApiRequest) -> PreparedRequest {
        PreparedRequest {
            method: request.method,
            url: format!("{base}{}", request.path.trim_start_matches('/')),
            headers: self.headers(),
            body: request.body.clone(),
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &SettingsStore {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthenticated_headers() {
        let headers = Headers::for_settings(&Settings::default());
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get(USER_ID_HEADER), None);
        assert_eq!(headers.get(ADMIN_KEY_HEADER), None);
    }

    #[test]
    fn test_identity_headers() {
        let headers = Headers::for_settings(&Settings {
            user_id: "u1".to_string(),
            admin_key: "k".to_string(),
        });
        assert_eq!(headers.get(USER_ID_HEADER), Some("u1"));
        assert_eq!(headers.get(ADMIN_KEY_HEADER), Some("k"));
    }

    #[test]
    fn test_prepare_reads_settings_each_time() {
        let settings = SettingsStore::in_memory();
        let provider = CredentialProvider::new(settings.clone());
        let request = ApiRequest::get("cart/");

        let before = provider.prepare("http://shop.test/api/", &request);
        settings.set_admin_key("fresh");
        let after = provider.prepare("http://shop.test/api/", &request);

        assert_eq!(before.url, "http://shop.test/api/cart/");
        assert_eq!(before.headers.get(ADMIN_KEY_HEADER), None);
        assert_eq!(after.headers.get(ADMIN_KEY_HEADER), Some("fresh"));
    }
}
