use common::domain::{
    Actor, CompanyDirectory, CountDeviceEventsRepoInput, DeviceEvent, DomainError, DomainResult,
    EventFilters, EventScope, ListDeviceEventsRepoInput, Owner, Pagination,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Per-record read permission and query scoping for device events
///
/// Single-record checks follow the full rule chain. Listing pushes only the
/// ownership and group-membership rules down into the query, so managers and
/// company admins do not see extra rows in their personal lists.
pub struct AccessScoper {
    company_directory: Arc<dyn CompanyDirectory>,
}

impl AccessScoper {
    pub fn new(company_directory: Arc<dyn CompanyDirectory>) -> Self {
        Self { company_directory }
    }

    #[instrument(skip(self, actor, event), fields(user_id = %actor.user_id, event_id = %event.id))]
    pub async fn can_read(&self, actor: &Actor, event: &DeviceEvent) -> DomainResult<bool> {
        if actor.is_manager() {
            return Ok(true);
        }

        if let Some(company_id) = &event.owner_company {
            let admin = self.company_directory.get_company_admin(company_id).await?;
            if admin.as_deref() == Some(actor.user_id.as_str()) {
                return Ok(true);
            }
        }

        let allowed = match &event.owner {
            Owner::User(user_id) => *user_id == actor.user_id,
            Owner::CompanyGroup(group_id) => self
                .company_directory
                .list_user_groups(&actor.user_id)
                .await?
                .iter()
                .any(|g| g == group_id),
            Owner::Public => true,
            Owner::Company(_) => false,
        };

        debug!(allowed, "resolved event read permission");
        Ok(allowed)
    }

    /// `can_read` as a guard; the denial carries no record details
    pub async fn require_read(&self, actor: &Actor, event: &DeviceEvent) -> DomainResult<()> {
        if self.can_read(actor, event).await? {
            Ok(())
        } else {
            Err(DomainError::PermissionDenied(
                "not allowed to access this device event".to_string(),
            ))
        }
    }

    /// Owner ids a user's personal listing covers: their groups plus themselves
    pub async fn visible_owner_ids(&self, user_id: &str) -> DomainResult<Vec<String>> {
        let mut owner_ids = self.company_directory.list_user_groups(user_id).await?;
        owner_ids.push(user_id.to_string());
        Ok(owner_ids)
    }

    pub async fn list_visible_events_input(
        &self,
        user_id: &str,
        filters: EventFilters,
        pagination: Pagination,
    ) -> DomainResult<ListDeviceEventsRepoInput> {
        Ok(ListDeviceEventsRepoInput {
            scope: EventScope::OwnerIn(self.visible_owner_ids(user_id).await?),
            filters,
            pagination,
        })
    }

    pub async fn count_visible_events_input(
        &self,
        user_id: &str,
        filters: EventFilters,
    ) -> DomainResult<CountDeviceEventsRepoInput> {
        Ok(CountDeviceEventsRepoInput {
            scope: EventScope::OwnerIn(self.visible_owner_ids(user_id).await?),
            filters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::{event, manager, user};
    use common::domain::MockCompanyDirectory;

    fn scoper(directory: MockCompanyDirectory) -> AccessScoper {
        AccessScoper::new(Arc::new(directory))
    }

    fn with_company_admin(directory: &mut MockCompanyDirectory) {
        directory
            .expect_get_company_admin()
            .returning(|_| Ok(Some("admin@company-1.com".to_string())));
    }

    #[tokio::test]
    async fn test_manager_reads_any_event() {
        let mut directory = MockCompanyDirectory::new();
        directory.expect_get_company_admin().times(0);
        directory.expect_list_user_groups().times(0);
        let scoper = scoper(directory);

        let owners = [
            Owner::User("someone-else".to_string()),
            Owner::Company("company-9".to_string()),
            Owner::CompanyGroup("group-9".to_string()),
            Owner::Public,
        ];
        for owner in owners {
            let mut evt = event("evt-1", false);
            evt.owner = owner;
            assert!(scoper.can_read(&manager("boss"), &evt).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_company_admin_reads_company_events() {
        let mut directory = MockCompanyDirectory::new();
        with_company_admin(&mut directory);
        let scoper = scoper(directory);

        let mut evt = event("evt-1", false);
        evt.owner = Owner::Company("company-1".to_string());
        assert!(scoper
            .can_read(&user("admin@company-1.com"), &evt)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_owner_reads_own_event_but_not_others() {
        let mut directory = MockCompanyDirectory::new();
        with_company_admin(&mut directory);
        let scoper = scoper(directory);

        let evt = event("evt-1", false);
        assert!(scoper.can_read(&user("alice@example.com"), &evt).await.unwrap());
        assert!(!scoper.can_read(&user("bob@example.com"), &evt).await.unwrap());
    }

    #[tokio::test]
    async fn test_group_member_reads_group_event() {
        let mut directory = MockCompanyDirectory::new();
        with_company_admin(&mut directory);
        directory
            .expect_list_user_groups()
            .withf(|user_id: &str| user_id == "bob@example.com")
            .returning(|_| Ok(vec!["group-1".to_string()]));
        let scoper = scoper(directory);

        let mut evt = event("evt-1", false);
        evt.owner = Owner::CompanyGroup("group-1".to_string());
        assert!(scoper.can_read(&user("bob@example.com"), &evt).await.unwrap());

        evt.owner = Owner::CompanyGroup("group-2".to_string());
        assert!(!scoper.can_read(&user("bob@example.com"), &evt).await.unwrap());
    }

    #[tokio::test]
    async fn test_public_event_is_readable_by_anyone() {
        let mut directory = MockCompanyDirectory::new();
        with_company_admin(&mut directory);
        let scoper = scoper(directory);

        let mut evt = event("evt-1", false);
        evt.owner = Owner::Public;
        assert!(scoper.can_read(&user("bob@example.com"), &evt).await.unwrap());
    }

    #[tokio::test]
    async fn test_require_read_denies_without_details() {
        let mut directory = MockCompanyDirectory::new();
        with_company_admin(&mut directory);
        let scoper = scoper(directory);

        let result = scoper
            .require_read(&user("bob@example.com"), &event("evt-1", false))
            .await;
        match result {
            Err(DomainError::PermissionDenied(message)) => assert!(!message.contains("evt-1")),
            other => panic!("expected permission denied, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_visible_owner_ids_are_groups_plus_user() {
        let mut directory = MockCompanyDirectory::new();
        directory
            .expect_list_user_groups()
            .returning(|_| Ok(vec!["group-1".to_string(), "group-2".to_string()]));
        let scoper = scoper(directory);

        let input = scoper
            .list_visible_events_input("bob@example.com", EventFilters::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(
            input.scope,
            EventScope::OwnerIn(vec![
                "group-1".to_string(),
                "group-2".to_string(),
                "bob@example.com".to_string()
            ])
        );
    }
}
