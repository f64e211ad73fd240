use common::domain::{
    Actor, CompanyDirectory, CreateShareGroupRepoInput, DeviceRepository, DomainError,
    DomainResult, ShareGroup, ShareGroupRepository, ShareGroupUser,
};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, info, instrument};

// ============================================================================
// Service Request Types
// ============================================================================

#[derive(Debug, Clone, Validate)]
pub struct CreateShareGroupRequest {
    #[garde(skip)]
    pub actor: Actor,
    #[garde(length(min = 1))]
    pub company_id: String,
    #[garde(length(min = 1))]
    pub name: String,
    #[garde(skip)]
    pub users: Vec<ShareGroupUser>,
    #[garde(inner(length(min = 1)))]
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, Validate)]
pub struct ShareGroupDevicesRequest {
    #[garde(skip)]
    pub actor: Actor,
    #[garde(length(min = 1))]
    pub group_id: String,
    #[garde(inner(length(min = 1)))]
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, Validate)]
pub struct AddShareGroupUsersRequest {
    #[garde(skip)]
    pub actor: Actor,
    #[garde(length(min = 1))]
    pub group_id: String,
    #[garde(skip)]
    pub users: Vec<ShareGroupUser>,
}

#[derive(Debug, Clone, Validate)]
pub struct RemoveShareGroupUsersRequest {
    #[garde(skip)]
    pub actor: Actor,
    #[garde(length(min = 1))]
    pub group_id: String,
    #[garde(inner(length(min = 1)))]
    pub user_ids: Vec<String>,
}

/// Domain service maintaining share group membership
///
/// A share group exposes a company's devices to users outside the company,
/// so members must be foreign to the company while devices must belong to it.
pub struct ShareGroupService {
    group_repository: Arc<dyn ShareGroupRepository>,
    device_repository: Arc<dyn DeviceRepository>,
    company_directory: Arc<dyn CompanyDirectory>,
}

impl ShareGroupService {
    pub fn new(
        group_repository: Arc<dyn ShareGroupRepository>,
        device_repository: Arc<dyn DeviceRepository>,
        company_directory: Arc<dyn CompanyDirectory>,
    ) -> Self {
        Self {
            group_repository,
            device_repository,
            company_directory,
        }
    }

    /// Manager, admin of the company, or one of its members
    pub async fn can_access_group(&self, actor: &Actor, company_id: &str) -> DomainResult<bool> {
        if actor.is_manager() {
            return Ok(true);
        }

        let admin = self.company_directory.get_company_admin(company_id).await?;
        if admin.as_deref() == Some(actor.user_id.as_str()) {
            return Ok(true);
        }

        Ok(self
            .company_directory
            .list_user_companies(&actor.user_id)
            .await?
            .iter()
            .any(|c| c == company_id))
    }

    async fn require_group_access(&self, actor: &Actor, company_id: &str) -> DomainResult<()> {
        if !actor.is_authenticated() {
            return Err(DomainError::Unauthenticated);
        }
        if self.can_access_group(actor, company_id).await? {
            Ok(())
        } else {
            Err(DomainError::NotCompanyMember(
                actor.user_id.clone(),
                company_id.to_string(),
            ))
        }
    }

    /// Checks run before any share group document is written
    #[instrument(skip(self, actor, users, devices), fields(user_id = %actor.user_id))]
    pub async fn validate_before_save(
        &self,
        actor: &Actor,
        company_id: &str,
        users: &[ShareGroupUser],
        devices: &[String],
    ) -> DomainResult<()> {
        self.require_group_access(actor, company_id).await?;

        for user in users {
            let companies = self
                .company_directory
                .list_user_companies(&user.user_id)
                .await?;
            if companies.iter().any(|c| c == company_id) {
                return Err(DomainError::CompanyStaffNotShareable(
                    user.user_id.clone(),
                    company_id.to_string(),
                ));
            }
        }

        for serial in devices {
            let device = self
                .device_repository
                .get_device(serial)
                .await?
                .ok_or_else(|| DomainError::DeviceNotFound(serial.clone()))?;
            if device.company_id.as_deref() != Some(company_id) {
                return Err(DomainError::DeviceCompanyMismatch(
                    serial.clone(),
                    company_id.to_string(),
                ));
            }
        }

        debug!("share group passed validation");
        Ok(())
    }

    async fn load_group(&self, group_id: &str) -> DomainResult<ShareGroup> {
        self.group_repository
            .get_group(group_id)
            .await?
            .ok_or_else(|| DomainError::ShareGroupNotFound(group_id.to_string()))
    }

    #[instrument(skip(self, request), fields(company_id = %request.company_id, name = %request.name))]
    pub async fn create_group(&self, request: CreateShareGroupRequest) -> DomainResult<ShareGroup> {
        common::garde::validate_struct(&request)?;

        let users = dedup_users(request.users);
        let devices = dedup_devices(request.devices);
        self.validate_before_save(&request.actor, &request.company_id, &users, &devices)
            .await?;

        let group = self
            .group_repository
            .create_group(CreateShareGroupRepoInput {
                id: xid::new().to_string(),
                company_id: request.company_id,
                name: request.name,
                users,
                devices,
            })
            .await?;

        info!(group_id = %group.id, "share group created");
        Ok(group)
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn get_group(&self, actor: &Actor, group_id: &str) -> DomainResult<ShareGroup> {
        let group = self.load_group(group_id).await?;
        if !actor.is_authenticated() || !self.can_access_group(actor, &group.company_id).await? {
            return Err(DomainError::PermissionDenied(
                "not allowed to access this share group".to_string(),
            ));
        }
        Ok(group)
    }

    /// Managers see every group, everyone else the groups of companies they administer
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn list_groups(&self, actor: &Actor) -> DomainResult<Vec<ShareGroup>> {
        if !actor.is_authenticated() {
            return Err(DomainError::Unauthenticated);
        }
        if actor.is_manager() {
            return self.group_repository.list_all_groups().await;
        }

        let companies = self
            .company_directory
            .list_admin_companies(&actor.user_id)
            .await?;
        if companies.is_empty() {
            return Ok(Vec::new());
        }
        self.group_repository.list_groups_by_companies(companies).await
    }

    #[instrument(skip(self, request), fields(group_id = %request.group_id, count = request.devices.len()))]
    pub async fn add_devices(&self, request: ShareGroupDevicesRequest) -> DomainResult<ShareGroup> {
        common::garde::validate_struct(&request)?;

        let mut group = self.load_group(&request.group_id).await?;
        let added: Vec<String> = dedup_devices(request.devices)
            .into_iter()
            .filter(|serial| !group.has_device(serial))
            .collect();

        if added.is_empty() {
            self.require_group_access(&request.actor, &group.company_id)
                .await?;
            debug!("all devices already shared");
            return Ok(group);
        }

        self.validate_before_save(&request.actor, &group.company_id, &group.users, &added)
            .await?;

        group.devices.extend(added);
        self.group_repository.save_group(group).await
    }

    #[instrument(skip(self, request), fields(group_id = %request.group_id, count = request.devices.len()))]
    pub async fn remove_devices(&self, request: ShareGroupDevicesRequest) -> DomainResult<ShareGroup> {
        common::garde::validate_struct(&request)?;

        let mut group = self.load_group(&request.group_id).await?;
        self.require_group_access(&request.actor, &group.company_id)
            .await?;

        if group.remove_devices(&request.devices) == 0 {
            return Ok(group);
        }
        self.group_repository.save_group(group).await
    }

    #[instrument(skip(self, request), fields(group_id = %request.group_id, count = request.users.len()))]
    pub async fn add_users(&self, request: AddShareGroupUsersRequest) -> DomainResult<ShareGroup> {
        common::garde::validate_struct(&request)?;

        let mut group = self.load_group(&request.group_id).await?;
        let added: Vec<ShareGroupUser> = dedup_users(request.users)
            .into_iter()
            .filter(|user| !group.has_user(&user.user_id))
            .collect();

        if added.is_empty() {
            self.require_group_access(&request.actor, &group.company_id)
                .await?;
            debug!("all users already members");
            return Ok(group);
        }

        self.validate_before_save(&request.actor, &group.company_id, &added, &group.devices)
            .await?;

        group.users.extend(added);
        self.group_repository.save_group(group).await
    }

    #[instrument(skip(self, request), fields(group_id = %request.group_id, count = request.user_ids.len()))]
    pub async fn remove_users(&self, request: RemoveShareGroupUsersRequest) -> DomainResult<ShareGroup> {
        common::garde::validate_struct(&request)?;

        let mut group = self.load_group(&request.group_id).await?;
        self.require_group_access(&request.actor, &group.company_id)
            .await?;

        if group.remove_users(&request.user_ids) == 0 {
            return Ok(group);
        }
        self.group_repository.save_group(group).await
    }
}

fn dedup_devices(devices: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(devices.len());
    for serial in devices {
        if !unique.contains(&serial) {
            unique.push(serial);
        }
    }
    unique
}

fn dedup_users(users: Vec<ShareGroupUser>) -> Vec<ShareGroupUser> {
    let mut unique: Vec<ShareGroupUser> = Vec::with_capacity(users.len());
    for user in users {
        if !unique.iter().any(|u| u.user_id == user.user_id) {
            unique.push(user);
        }
    }
    unique
}
