use crate::domain::{
    CreateShareGroupRepoInput, DomainError, DomainResult, ShareGroup, ShareGroupRepository,
    ShareGroupUser,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// PostgreSQL implementation of ShareGroupRepository trait
///
/// Members live in `iot_share_group_users` / `iot_share_group_devices`, keyed by
/// position; every write replaces both child tables inside one transaction.
#[derive(Clone)]
pub struct PostgresShareGroupRepository {
    client: PostgresClient,
}

impl PostgresShareGroupRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

/// Rewrite the ordered member rows of a group
async fn replace_members(
    tx: &tokio_postgres::Transaction<'_>,
    group_id: &str,
    users: &[ShareGroupUser],
    devices: &[String],
) -> Result<(), tokio_postgres::Error> {
    tx.execute(
        "DELETE FROM iot_share_group_users WHERE group_id = $1",
        &[&group_id],
    )
    .await?;
    tx.execute(
        "DELETE FROM iot_share_group_devices WHERE group_id = $1",
        &[&group_id],
    )
    .await?;

    for (idx, user) in users.iter().enumerate() {
        let idx = idx as i32;
        tx.execute(
            "INSERT INTO iot_share_group_users (group_id, idx, user_id, comment) VALUES ($1, $2, $3, $4)",
            &[&group_id, &idx, &user.user_id, &user.comment],
        )
        .await?;
    }

    for (idx, device) in devices.iter().enumerate() {
        let idx = idx as i32;
        tx.execute(
            "INSERT INTO iot_share_group_devices (group_id, idx, device_id) VALUES ($1, $2, $3)",
            &[&group_id, &idx, device],
        )
        .await?;
    }

    Ok(())
}

impl PostgresShareGroupRepository {
    /// Load groups with their ordered members for the given parent rows
    async fn load_groups(
        &self,
        conn: &deadpool_postgres::Client,
        rows: Vec<tokio_postgres::Row>,
    ) -> DomainResult<Vec<ShareGroup>> {
        let mut groups: Vec<ShareGroup> = rows
            .into_iter()
            .map(|row| ShareGroup {
                id: row.get("id"),
                company_id: row.get("company_id"),
                name: row.get("group_name"),
                users: Vec::new(),
                devices: Vec::new(),
                created_at: Some(row.get::<_, DateTime<Utc>>("created_at")),
                updated_at: Some(row.get::<_, DateTime<Utc>>("updated_at")),
            })
            .collect();

        if groups.is_empty() {
            return Ok(groups);
        }

        let ids: Vec<String> = groups.iter().map(|g| g.id.clone()).collect();
        let positions: HashMap<String, usize> = ids
            .iter()
            .enumerate()
            .map(|(pos, id)| (id.clone(), pos))
            .collect();

        let user_rows = conn
            .query(
                "SELECT group_id, user_id, comment FROM iot_share_group_users
                 WHERE group_id = ANY($1) ORDER BY group_id, idx",
                &[&ids],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        for row in user_rows {
            let group_id: String = row.get(0);
            if let Some(&pos) = positions.get(&group_id) {
                groups[pos].users.push(ShareGroupUser {
                    user_id: row.get(1),
                    comment: row.get(2),
                });
            }
        }

        let device_rows = conn
            .query(
                "SELECT group_id, device_id FROM iot_share_group_devices
                 WHERE group_id = ANY($1) ORDER BY group_id, idx",
                &[&ids],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        for row in device_rows {
            let group_id: String = row.get(0);
            if let Some(&pos) = positions.get(&group_id) {
                groups[pos].devices.push(row.get(1));
            }
        }

        Ok(groups)
    }
}

#[async_trait]
impl ShareGroupRepository for PostgresShareGroupRepository {
    #[instrument(skip(self, input), fields(group_id = %input.id, company_id = %input.company_id))]
    async fn create_group(&self, input: CreateShareGroupRepoInput) -> DomainResult<ShareGroup> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let now = Utc::now();
        let result = tx
            .execute(
                "INSERT INTO iot_share_groups (id, company_id, group_name, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $4)",
                &[&input.id, &input.company_id, &input.name, &now],
            )
            .await;

        if let Err(e) = result {
            if let Some(db_err) = e.as_db_error() {
                if db_err.code().code() == "23505" {
                    return Err(DomainError::ShareGroupAlreadyExists(input.id));
                }
            }
            return Err(DomainError::RepositoryError(e.into()));
        }

        replace_members(&tx, &input.id, &input.users, &input.devices)
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(group_id = %input.id, "created share group");

        Ok(ShareGroup {
            id: input.id,
            company_id: input.company_id,
            name: input.name,
            users: input.users,
            devices: input.devices,
            created_at: Some(now),
            updated_at: Some(now),
        })
    }

    #[instrument(skip(self), fields(group_id = %group_id))]
    async fn get_group(&self, group_id: &str) -> DomainResult<Option<ShareGroup>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT id, company_id, group_name, created_at, updated_at
                 FROM iot_share_groups WHERE id = $1",
                &[&group_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(self.load_groups(&conn, rows).await?.into_iter().next())
    }

    #[instrument(skip(self, group), fields(group_id = %group.id, users = group.users.len(), devices = group.devices.len()))]
    async fn save_group(&self, group: ShareGroup) -> DomainResult<ShareGroup> {
        let mut conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let now = Utc::now();
        let updated = tx
            .execute(
                "UPDATE iot_share_groups SET company_id = $2, group_name = $3, updated_at = $4 WHERE id = $1",
                &[&group.id, &group.company_id, &group.name, &now],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if updated == 0 {
            return Err(DomainError::ShareGroupNotFound(group.id));
        }

        replace_members(&tx, &group.id, &group.users, &group.devices)
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(ShareGroup {
            updated_at: Some(now),
            ..group
        })
    }

    #[instrument(skip(self, company_ids), fields(companies = company_ids.len()))]
    async fn list_groups_by_companies(&self, company_ids: Vec<String>) -> DomainResult<Vec<ShareGroup>> {
        if company_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT id, company_id, group_name, created_at, updated_at
                 FROM iot_share_groups WHERE company_id = ANY($1)
                 ORDER BY created_at DESC",
                &[&company_ids],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        self.load_groups(&conn, rows).await
    }

    #[instrument(skip(self))]
    async fn list_all_groups(&self) -> DomainResult<Vec<ShareGroup>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(
                "SELECT id, company_id, group_name, created_at, updated_at
                 FROM iot_share_groups ORDER BY created_at DESC",
                &[],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        self.load_groups(&conn, rows).await
    }
}
