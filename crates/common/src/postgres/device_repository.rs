use crate::domain::{CreateDeviceRepoInput, Device, DeviceRepository, DomainError, DomainResult, Owner};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;
use tracing::{debug, instrument};

fn device_from_row(row: &Row) -> DomainResult<Device> {
    let owner_type: String = row.get("owner_type");
    let owner_id: Option<String> = row.get("owner_id");

    Ok(Device {
        serial: row.get("serial"),
        name: row.get("device_name"),
        description: row.get("description"),
        company_id: row.get("company_id"),
        owner: Owner::from_parts(Some(owner_type.as_str()), owner_id.as_deref())?,
        longitude: row.get("longitude"),
        latitude: row.get("latitude"),
        use_beta: row.get("use_beta"),
        use_beta_start_time: row.get("use_beta_start_time"),
        created_at: Some(row.get("created_at")),
        updated_at: Some(row.get("updated_at")),
    })
}

/// PostgreSQL implementation of DeviceRepository trait
#[derive(Clone)]
pub struct PostgresDeviceRepository {
    client: PostgresClient,
}

impl PostgresDeviceRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceRepository for PostgresDeviceRepository {
    #[instrument(skip(self, input), fields(serial = %input.serial))]
    async fn create_device(&self, input: CreateDeviceRepoInput) -> DomainResult<Device> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let now = Utc::now();
        let owner_type = input.owner.owner_type();
        let owner_id = input.owner.owner_id();

        let result = conn
            .execute(
                "INSERT INTO iot_devices (serial, device_name, description, company_id, owner_type, owner_id,
                     use_beta, use_beta_start_time, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)",
                &[
                    &input.serial,
                    &input.name,
                    &input.description,
                    &input.company_id,
                    &owner_type,
                    &owner_id,
                    &input.use_beta,
                    &input.use_beta_start_time,
                    &now,
                ],
            )
            .await;

        if let Err(e) = result {
            if let Some(db_err) = e.as_db_error() {
                if db_err.code().code() == "23505" {
                    return Err(DomainError::DeviceAlreadyExists(input.serial));
                }
            }
            return Err(DomainError::RepositoryError(e.into()));
        }

        debug!("registered device: {}", input.serial);

        Ok(Device {
            serial: input.serial,
            name: input.name,
            description: input.description,
            company_id: input.company_id,
            owner: input.owner,
            longitude: None,
            latitude: None,
            use_beta: input.use_beta,
            use_beta_start_time: input.use_beta_start_time,
            created_at: Some(now),
            updated_at: Some(now),
        })
    }

    #[instrument(skip(self), fields(serial = %serial))]
    async fn get_device(&self, serial: &str) -> DomainResult<Option<Device>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(
                "SELECT serial, device_name, description, company_id, owner_type, owner_id, longitude, latitude,
                        use_beta, use_beta_start_time, created_at, updated_at
                 FROM iot_devices
                 WHERE serial = $1",
                &[&serial],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.as_ref().map(device_from_row).transpose()
    }

    #[instrument(skip(self), fields(serial = %serial))]
    async fn delete_device(&self, serial: &str) -> DomainResult<bool> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let deleted = conn
            .execute("DELETE FROM iot_devices WHERE serial = $1", &[&serial])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(deleted > 0)
    }
}
