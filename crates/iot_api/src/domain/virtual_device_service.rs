use chrono::Utc;
use common::domain::{
    Actor, CreateDeviceRepoInput, CreateVirtualDeviceRepoInput, DeviceRepository, DomainError,
    DomainResult, Owner, VirtualDevice, VirtualDeviceRepository, VIRTUAL_DEVICE_QUOTA,
};
use garde::Validate;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Validate)]
pub struct CreateVirtualDeviceRequest {
    #[garde(skip)]
    pub actor: Actor,
    #[garde(length(min = 1))]
    pub user_id: String,
    /// Generated when absent
    #[garde(length(min = 1))]
    pub serial: Option<String>,
}

#[derive(Debug, Clone, Validate)]
pub struct DeleteVirtualDeviceRequest {
    #[garde(skip)]
    pub actor: Actor,
    #[garde(length(min = 1))]
    pub serial: String,
}

/// Domain service for per-user virtual devices and their backing Device rows
pub struct VirtualDeviceService {
    virtual_device_repository: Arc<dyn VirtualDeviceRepository>,
    device_repository: Arc<dyn DeviceRepository>,
}

impl VirtualDeviceService {
    pub fn new(
        virtual_device_repository: Arc<dyn VirtualDeviceRepository>,
        device_repository: Arc<dyn DeviceRepository>,
    ) -> Self {
        Self {
            virtual_device_repository,
            device_repository,
        }
    }

    fn require_owner_access(actor: &Actor, user_id: &str) -> DomainResult<()> {
        if !actor.is_authenticated() {
            return Err(DomainError::Unauthenticated);
        }
        if actor.user_id == user_id || actor.is_administrator() || actor.is_manager() {
            Ok(())
        } else {
            Err(DomainError::PermissionDenied(
                "not allowed to manage virtual devices of another user".to_string(),
            ))
        }
    }

    /// Create a virtual device plus the beta Device it stands for
    ///
    /// The two rows are written separately. If the Device insert fails the
    /// virtual device is deleted again before the error is returned.
    #[instrument(skip(self, request), fields(user_id = %request.user_id, actor = %request.actor.user_id))]
    pub async fn create_virtual_device(
        &self,
        request: CreateVirtualDeviceRequest,
    ) -> DomainResult<VirtualDevice> {
        common::garde::validate_struct(&request)?;
        Self::require_owner_access(&request.actor, &request.user_id)?;

        let count = self
            .virtual_device_repository
            .count_virtual_devices(&request.user_id)
            .await?;
        if count >= VIRTUAL_DEVICE_QUOTA as u64 && !request.actor.is_administrator() {
            return Err(DomainError::VirtualDeviceQuotaExceeded(
                request.user_id,
                VIRTUAL_DEVICE_QUOTA,
            ));
        }

        let serial = request
            .serial
            .unwrap_or_else(|| xid::new().to_string())
            .to_uppercase();
        debug!(serial = %serial, existing = count, "creating virtual device");

        let virtual_device = self
            .virtual_device_repository
            .create_virtual_device(CreateVirtualDeviceRepoInput {
                serial: serial.clone(),
                user_id: request.user_id.clone(),
            })
            .await?;

        let dependent = self
            .device_repository
            .create_device(CreateDeviceRepoInput {
                serial: serial.clone(),
                name: serial.clone(),
                description: Some(format!("Virtual Device for {}", request.user_id)),
                company_id: None,
                owner: Owner::User(request.user_id.clone()),
                use_beta: true,
                use_beta_start_time: Some(Utc::now()),
            })
            .await;

        if let Err(e) = dependent {
            warn!(serial = %serial, error = %e, "dependent device creation failed, rolling back");
            if let Err(cleanup) = self
                .virtual_device_repository
                .delete_virtual_device(&serial)
                .await
            {
                error!(serial = %serial, error = %cleanup, "failed to roll back virtual device");
            }
            return Err(DomainError::DependentEntityFailure(format!(
                "failed to create device {}: {}",
                serial, e
            )));
        }

        info!(serial = %serial, "virtual device created");
        Ok(virtual_device)
    }

    /// Remove the dependent Device, then the virtual device
    ///
    /// Not atomic: a crash between the two deletes leaves an orphaned
    /// virtual device row that a later delete will clean up.
    #[instrument(skip(self, request), fields(serial = %request.serial, actor = %request.actor.user_id))]
    pub async fn delete_virtual_device(&self, request: DeleteVirtualDeviceRequest) -> DomainResult<()> {
        common::garde::validate_struct(&request)?;

        let virtual_device = self
            .virtual_device_repository
            .get_virtual_device(&request.serial)
            .await?
            .ok_or_else(|| DomainError::VirtualDeviceNotFound(request.serial.clone()))?;
        Self::require_owner_access(&request.actor, &virtual_device.user_id)?;

        match self.device_repository.delete_device(&virtual_device.serial).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("dependent device already gone");
            }
            Err(e) => {
                return Err(DomainError::DependentEntityFailure(format!(
                    "failed to delete device {}: {}",
                    virtual_device.serial, e
                )));
            }
        }

        if !self
            .virtual_device_repository
            .delete_virtual_device(&virtual_device.serial)
            .await?
        {
            return Err(DomainError::VirtualDeviceNotFound(virtual_device.serial));
        }

        info!("virtual device deleted");
        Ok(())
    }

    #[instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub async fn list_virtual_devices(
        &self,
        actor: &Actor,
        user_id: &str,
    ) -> DomainResult<Vec<VirtualDevice>> {
        Self::require_owner_access(actor, user_id)?;
        self.virtual_device_repository
            .list_virtual_devices(user_id)
            .await
    }
}
