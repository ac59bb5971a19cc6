#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub can_login: bool,
    pub is_superuser: bool,
    /// argon2 PHC string; `None` for roles that cannot authenticate with a password.
    pub password_hash: Option<String>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            can_login: false,
            is_superuser: false,
            password_hash: None,
        }
    }

    pub fn with_login(mut self, can_login: bool) -> Self {
        self.can_login = can_login;
        self
    }

    pub fn with_superuser(mut self, is_superuser: bool) -> Self {
        self.is_superuser = is_superuser;
        self
    }

    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }
}

/// Attribute changes carried by `ALTER ROLE`. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleOptions {
    pub can_login: Option<bool>,
    pub is_superuser: Option<bool>,
    pub password_hash: Option<String>,
}

impl RoleOptions {
    pub fn is_empty(&self) -> bool {
        self.can_login.is_none() && self.is_superuser.is_none() && self.password_hash.is_none()
    }

    pub fn apply(&self, role: &mut Role) {
        if let Some(can_login) = self.can_login {
            role.can_login = can_login;
        }
        if let Some(is_superuser) = self.is_superuser {
            role.is_superuser = is_superuser;
        }
        if let Some(hash) = &self.password_hash {
            role.password_hash = Some(hash.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_only_touches_set_fields() {
        let mut role = Role::new("alice").with_login(true).with_password_hash("old");
        let options = RoleOptions {
            is_superuser: Some(true),
            ..Default::default()
        };

        options.apply(&mut role);

        assert!(role.can_login);
        assert!(role.is_superuser);
        assert_eq!(role.password_hash.as_deref(), Some("old"));
    }

    #[test]
    fn default_options_are_empty() {
        assert!(RoleOptions::default().is_empty());
        assert!(
            !RoleOptions {
                can_login: Some(false),
                ..Default::default()
            }
            .is_empty()
        );
    }
}
