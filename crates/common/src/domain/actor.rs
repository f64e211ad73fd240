/// Role granting read and manage access across every company
pub const IOT_MANAGER_ROLE: &str = "IOT Manager";

/// Identity exempt from per-user quotas
pub const ADMINISTRATOR_USER: &str = "Administrator";

/// The acting identity of a request, passed explicitly to every operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_manager(&self) -> bool {
        self.has_role(IOT_MANAGER_ROLE)
    }

    pub fn is_administrator(&self) -> bool {
        self.user_id == ADMINISTRATOR_USER
    }

    pub fn is_authenticated(&self) -> bool {
        !self.user_id.is_empty()
    }
}
