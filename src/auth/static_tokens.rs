use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;

use super::{AuthError, AuthUser, Authenticator};

/// Token table loaded from configuration, used for local development and tests.
#[derive(Clone, Default)]
pub struct StaticAuthenticator {
    users: Arc<HashMap<String, AuthUser>>,
}

impl StaticAuthenticator {
    pub fn new(users: impl IntoIterator<Item = (String, AuthUser)>) -> Self {
        Self {
            users: Arc::new(users.into_iter().collect()),
        }
    }

    /// Number of known tokens.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Authenticator for StaticAuthenticator {
    fn user(&self, token: String) -> BoxFuture<'static, Result<Option<AuthUser>, AuthError>> {
        let users = self.users.clone();
        Box::pin(async move { Ok(users.get(&token).cloned()) })
    }
}
