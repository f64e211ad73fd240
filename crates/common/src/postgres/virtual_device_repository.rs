use crate::domain::{
    CreateVirtualDeviceRepoInput, DomainError, DomainResult, VirtualDevice, VirtualDeviceRepository,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

/// PostgreSQL implementation of VirtualDeviceRepository trait
#[derive(Clone)]
pub struct PostgresVirtualDeviceRepository {
    client: PostgresClient,
}

impl PostgresVirtualDeviceRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VirtualDeviceRepository for PostgresVirtualDeviceRepository {
    #[instrument(skip(self, input), fields(serial = %input.serial, user_id = %input.user_id))]
    async fn create_virtual_device(
        &self,
        input: CreateVirtualDeviceRepoInput,
    ) -> DomainResult<VirtualDevice> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();
        let result = conn
            .execute(
                "INSERT INTO iot_virtual_devices (serial, user_id, created_at) VALUES ($1, $2, $3)",
                &[&input.serial, &input.user_id, &now],
            )
            .await;

        if let Err(e) = result {
            if let Some(db_err) = e.as_db_error() {
                if db_err.code().code() == "23505" {
                    return Err(DomainError::VirtualDeviceAlreadyExists(input.serial));
                }
            }
            return Err(DomainError::RepositoryError(e.into()));
        }

        debug!("created virtual device: {}", input.serial);

        Ok(VirtualDevice {
            serial: input.serial,
            user_id: input.user_id,
            created_at: Some(now),
        })
    }

    #[instrument(skip(self), fields(serial = %serial))]
    async fn get_virtual_device(&self, serial: &str) -> DomainResult<Option<VirtualDevice>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT serial, user_id, created_at FROM iot_virtual_devices WHERE serial = $1",
                &[&serial],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.map(|row| VirtualDevice {
            serial: row.get(0),
            user_id: row.get(1),
            created_at: Some(row.get(2)),
        }))
    }

    #[instrument(skip(self), fields(serial = %serial))]
    async fn delete_virtual_device(&self, serial: &str) -> DomainResult<bool> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let deleted = conn
            .execute("DELETE FROM iot_virtual_devices WHERE serial = $1", &[&serial])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(deleted > 0)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn count_virtual_devices(&self, user_id: &str) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_one(
                "SELECT COUNT(*) FROM iot_virtual_devices WHERE user_id = $1",
                &[&user_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn list_virtual_devices(&self, user_id: &str) -> DomainResult<Vec<VirtualDevice>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT serial, user_id, created_at
                 FROM iot_virtual_devices
                 WHERE user_id = $1
                 ORDER BY created_at DESC",
                &[&user_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows
            .into_iter()
            .map(|row| VirtualDevice {
                serial: row.get(0),
                user_id: row.get(1),
                created_at: Some(row.get(2)),
            })
            .collect())
    }
}
