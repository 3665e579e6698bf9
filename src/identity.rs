/// Who the session controller is acting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Local-only data, no remote mirroring.
    Guest,
    User {
        id: String,
        access_token: Option<String>,
    },
}

impl Identity {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User {
            id: id.into(),
            access_token: None,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Guest => None,
            Self::User { id, .. } => Some(id.as_str()),
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        match self {
            Self::Guest => None,
            Self::User { access_token, .. } => access_token.as_deref(),
        }
    }
}

/// Snapshot of the identity provider.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub user_id: Option<String>,
    pub access_token: Option<String>,
    pub is_guest: bool,
    pub loading: bool,
}

impl AuthState {
    /// `None` while the provider has not settled yet.
    pub fn identity(&self) -> Option<Identity> {
        if self.loading {
            return None;
        }
        match (&self.user_id, self.is_guest) {
            (Some(id), false) => Some(Identity::User {
                id: id.clone(),
                access_token: self.access_token.clone(),
            }),
            _ => Some(Identity::Guest),
        }
    }
}
