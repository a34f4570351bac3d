//! Sessions and container handles.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::types::DataPlaneInput;

/// Authentication material for one tenant scope: the cluster URL plus
/// either basic credentials or an access key. Immutable after creation.
#[derive(Debug, Clone)]
pub struct Session {
    url: String,
    authentication_token: Option<String>,
    access_key: Option<String>,
}

impl Session {
    /// Creates a session authenticating with an access key.
    pub fn with_access_key(url: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            authentication_token: None,
            access_key: Some(access_key.into()),
        }
    }

    /// Creates a session authenticating with basic credentials.
    pub fn with_basic_auth(
        url: impl Into<String>,
        username: &str,
        password: &str,
    ) -> Self {
        let token = format!(
            "Basic {}",
            BASE64.encode(format!("{username}:{password}").as_bytes())
        );
        Self {
            url: url.into(),
            authentication_token: Some(token),
            access_key: None,
        }
    }

    /// The cluster endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stamps this session's endpoint and credentials onto a fresh input.
    pub fn data_plane_input(&self, container_name: impl Into<String>) -> DataPlaneInput {
        DataPlaneInput {
            url: self.url.clone(),
            container_name: container_name.into(),
            authentication_token: self.authentication_token.clone(),
            access_key: self.access_key.clone(),
            ..Default::default()
        }
    }

    /// Returns a handle to a named container under this session.
    pub fn container(self: &Arc<Self>, name: impl Into<String>) -> Container {
        Container {
            session: Arc::clone(self),
            name: name.into(),
        }
    }
}

/// A named tenant bucket addressed through a session.
#[derive(Debug, Clone)]
pub struct Container {
    session: Arc<Session>,
    name: String,
}

impl Container {
    /// The container name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// A data-plane input addressing this container.
    pub fn input(&self) -> DataPlaneInput {
        self.session.data_plane_input(self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_key_session() {
        let session = Session::with_access_key("https://cluster:8081", "key-123");
        let input = session.data_plane_input("users");
        assert_eq!(input.url, "https://cluster:8081");
        assert_eq!(input.container_name, "users");
        assert_eq!(input.access_key.as_deref(), Some("key-123"));
        assert!(input.authentication_token.is_none());
    }

    #[test]
    fn test_basic_auth_encodes_credentials() {
        let session = Session::with_basic_auth("https://cluster", "user", "pass");
        let input = session.data_plane_input("c");
        // "user:pass" in base64
        assert_eq!(
            input.authentication_token.as_deref(),
            Some("Basic dXNlcjpwYXNz")
        );
    }

    #[test]
    fn test_container_handle() {
        let session = Arc::new(Session::with_access_key("https://h", "k"));
        let container = session.container("logs");
        assert_eq!(container.name(), "logs");
        assert_eq!(container.input().container_name, "logs");
    }
}
