use crate::domain::{CompanyDirectory, DomainError, DomainResult, IdentityDirectory};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use tracing::instrument;

/// Read-only view over the cloud account tables (companies, groups, users, roles)
#[derive(Clone)]
pub struct PostgresDirectory {
    client: PostgresClient,
}

impl PostgresDirectory {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }

    async fn query_strings(&self, sql: &str, key: &str) -> DomainResult<Vec<String>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let rows = conn
            .query(sql, &[&key])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn query_optional_string(&self, sql: &str, key: &str) -> DomainResult<Option<String>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let row = conn
            .query_opt(sql, &[&key])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(row.and_then(|row| row.get::<_, Option<String>>(0)))
    }
}

#[async_trait]
impl CompanyDirectory for PostgresDirectory {
    #[instrument(skip(self))]
    async fn list_user_groups(&self, user_id: &str) -> DomainResult<Vec<String>> {
        self.query_strings(
            "SELECT group_id FROM cloud_company_group_users WHERE user_id = $1 ORDER BY group_id",
            user_id,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_group_users(&self, group_id: &str) -> DomainResult<Vec<String>> {
        self.query_strings(
            "SELECT user_id FROM cloud_company_group_users WHERE group_id = $1 ORDER BY user_id",
            group_id,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_user_companies(&self, user_id: &str) -> DomainResult<Vec<String>> {
        self.query_strings(
            "SELECT company_id FROM cloud_company_users WHERE user_id = $1
             UNION
             SELECT id FROM cloud_companies WHERE admin = $1",
            user_id,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_admin_companies(&self, user_id: &str) -> DomainResult<Vec<String>> {
        self.query_strings(
            "SELECT id FROM cloud_companies WHERE admin = $1 ORDER BY id",
            user_id,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_company_admin(&self, company_id: &str) -> DomainResult<Option<String>> {
        self.query_optional_string("SELECT admin FROM cloud_companies WHERE id = $1", company_id)
            .await
    }

    #[instrument(skip(self))]
    async fn get_messaging_app(&self, company_id: &str) -> DomainResult<Option<String>> {
        let app = self
            .query_optional_string("SELECT wechat_app FROM cloud_companies WHERE id = $1", company_id)
            .await?;
        Ok(app.filter(|app| !app.is_empty()))
    }
}

#[async_trait]
impl IdentityDirectory for PostgresDirectory {
    #[instrument(skip(self))]
    async fn get_roles(&self, user_id: &str) -> DomainResult<Vec<String>> {
        self.query_strings(
            "SELECT role FROM cloud_user_roles WHERE user_id = $1 ORDER BY role",
            user_id,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_full_name(&self, user_id: &str) -> DomainResult<Option<String>> {
        self.query_optional_string("SELECT full_name FROM cloud_users WHERE id = $1", user_id)
            .await
    }
}
