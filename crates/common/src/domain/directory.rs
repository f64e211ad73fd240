use crate::domain::actor::Actor;
use crate::domain::result::DomainResult;
use async_trait::async_trait;

/// Lookup of company, company-group and messaging-app relations
///
/// Backed by the tenant directory owned by the cloud account service.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CompanyDirectory: Send + Sync {
    /// IDs of the company groups the user belongs to
    async fn list_user_groups(&self, user_id: &str) -> DomainResult<Vec<String>>;

    /// Users belonging to a company group
    async fn list_group_users(&self, group_id: &str) -> DomainResult<Vec<String>>;

    /// Companies the user is a member or admin of
    async fn list_user_companies(&self, user_id: &str) -> DomainResult<Vec<String>>;

    /// Companies the user administers
    async fn list_admin_companies(&self, user_id: &str) -> DomainResult<Vec<String>>;

    /// Admin identity of a company
    async fn get_company_admin(&self, company_id: &str) -> DomainResult<Option<String>>;

    /// Messaging application configured for a company, if any
    async fn get_messaging_app(&self, company_id: &str) -> DomainResult<Option<String>>;
}

/// Lookup of user profile and role membership
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn get_roles(&self, user_id: &str) -> DomainResult<Vec<String>>;

    async fn get_full_name(&self, user_id: &str) -> DomainResult<Option<String>>;
}

impl Actor {
    /// Build the acting identity with its roles resolved from the directory
    pub async fn resolve(user_id: &str, identity: &dyn IdentityDirectory) -> DomainResult<Actor> {
        let roles = if user_id.is_empty() {
            Vec::new()
        } else {
            identity.get_roles(user_id).await?
        };
        Ok(Actor::new(user_id, roles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IOT_MANAGER_ROLE;

    #[tokio::test]
    async fn test_resolve_actor_loads_roles() {
        let mut identity = MockIdentityDirectory::new();
        identity
            .expect_get_roles()
            .withf(|user_id: &str| user_id == "ops@example.com")
            .times(1)
            .returning(|_| Ok(vec![IOT_MANAGER_ROLE.to_string()]));

        let actor = Actor::resolve("ops@example.com", &identity).await.unwrap();
        assert!(actor.is_manager());
    }

    #[tokio::test]
    async fn test_resolve_anonymous_actor_skips_lookup() {
        let identity = MockIdentityDirectory::new();
        let actor = Actor::resolve("", &identity).await.unwrap();
        assert!(actor.roles.is_empty());
        assert!(!actor.is_authenticated());
    }
}
