use crate::domain::{
    CountDeviceEventsRepoInput, CreateDeviceEventRepoInput, DeviceEvent, DeviceEventRepository,
    Disposal, DisposeDeviceEventRepoInput, DomainError, DomainResult, EventFilters, EventScope,
    ListDeviceEventsRepoInput, Owner, Pagination,
};
use crate::postgres::PostgresClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::{debug, instrument};

const EVENT_COLUMNS: &str = "id, device_id, event_source, event_level, event_type, event_info, event_data, event_time, \
     owner_type, owner_id, owner_company, wechat_notify, disposed, disposed_by, disposed_at, created_at, updated_at";

type SqlParam = Box<dyn ToSql + Sync + Send>;

/// Accumulates positional parameters and WHERE clauses for dynamic event queries
#[derive(Default)]
struct EventQueryBuilder {
    clauses: Vec<String>,
    params: Vec<SqlParam>,
}

impl EventQueryBuilder {
    fn new(scope: &EventScope, filters: &EventFilters) -> Self {
        let mut builder = Self::default();

        match scope {
            EventScope::OwnerIn(owner_ids) => {
                let p = builder.bind(Box::new(owner_ids.clone()));
                builder.clauses.push(format!("owner_id = ANY({})", p));
            }
            EventScope::Company(company_id) => {
                let p = builder.bind(Box::new(company_id.clone()));
                builder.clauses.push(format!("owner_company = {}", p));
            }
            EventScope::Device(serial) => {
                let p = builder.bind(Box::new(serial.clone()));
                builder.clauses.push(format!("device_id = {}", p));
            }
        }

        if let Some(source) = &filters.event_source {
            let p = builder.bind(Box::new(source.clone()));
            builder.clauses.push(format!("event_source = {}", p));
        }
        if let Some(level) = filters.event_level {
            let p = builder.bind(Box::new(level));
            builder.clauses.push(format!("event_level = {}", p));
        }
        if let Some(event_type) = &filters.event_type {
            let p = builder.bind(Box::new(event_type.clone()));
            builder.clauses.push(format!("event_type = {}", p));
        }
        if let Some(disposed) = filters.disposed {
            let p = builder.bind(Box::new(disposed));
            builder.clauses.push(format!("disposed = {}", p));
        }
        if let Some(after) = filters.created_after {
            let p = builder.bind(Box::new(after));
            builder.clauses.push(format!("created_at >= {}", p));
        }
        if let Some(before) = filters.created_before {
            let p = builder.bind(Box::new(before));
            builder.clauses.push(format!("created_at < {}", p));
        }

        builder
    }

    /// Register a parameter and return its placeholder
    fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn param_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }
}

fn event_from_row(row: &Row) -> DomainResult<DeviceEvent> {
    let owner_type: String = row.get("owner_type");
    let owner_id: Option<String> = row.get("owner_id");
    let owner = Owner::from_parts(Some(owner_type.as_str()), owner_id.as_deref())?;

    let disposed: bool = row.get("disposed");
    let disposed_by: Option<String> = row.get("disposed_by");
    let disposed_at: Option<DateTime<Utc>> = row.get("disposed_at");
    let updated_at: DateTime<Utc> = row.get("updated_at");

    let disposal = match (disposed, disposed_by) {
        (true, Some(disposed_by)) => Some(Disposal {
            disposed_by,
            disposed_at: disposed_at.unwrap_or(updated_at),
        }),
        _ => None,
    };

    Ok(DeviceEvent {
        id: row.get("id"),
        device_id: row.get("device_id"),
        event_source: row.get("event_source"),
        event_level: row.get("event_level"),
        event_type: row.get("event_type"),
        event_info: row.get("event_info"),
        event_data: row.get("event_data"),
        event_time: row.get("event_time"),
        owner,
        owner_company: row.get("owner_company"),
        wechat_notify: row.get("wechat_notify"),
        disposal,
        created_at: row.get("created_at"),
        updated_at,
    })
}

/// PostgreSQL implementation of DeviceEventRepository trait
#[derive(Clone)]
pub struct PostgresDeviceEventRepository {
    client: PostgresClient,
}

impl PostgresDeviceEventRepository {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceEventRepository for PostgresDeviceEventRepository {
    #[instrument(skip(self, input), fields(event_id = %input.id, device_id = %input.device_id))]
    async fn create_event(&self, input: CreateDeviceEventRepoInput) -> DomainResult<DeviceEvent> {
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
                "INSERT INTO iot_device_events (id, device_id, event_source, event_level, event_type, event_info, event_data,
                     event_time, owner_type, owner_id, owner_company, wechat_notify, disposed, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, FALSE, $13, $13)",
                &[
                    &input.id,
                    &input.device_id,
                    &input.event_source,
                    &input.event_level,
                    &input.event_type,
                    &input.event_info,
                    &input.event_data,
                    &input.event_time,
                    &owner_type,
                    &owner_id,
                    &input.owner_company,
                    &input.wechat_notify,
                    &now,
                ],
            )
            .await;

        if let Err(e) = result {
            if let Some(db_err) = e.as_db_error() {
                // PostgreSQL error code 23505 is unique_violation
                if db_err.code().code() == "23505" {
                    return Err(DomainError::DeviceEventAlreadyExists(input.id));
                }
            }
            return Err(DomainError::RepositoryError(e.into()));
        }

        debug!(event_id = %input.id, "inserted device event");

        Ok(DeviceEvent {
            id: input.id,
            device_id: input.device_id,
            event_source: input.event_source,
            event_level: input.event_level,
            event_type: input.event_type,
            event_info: input.event_info,
            event_data: input.event_data,
            event_time: input.event_time,
            owner: input.owner,
            owner_company: input.owner_company,
            wechat_notify: input.wechat_notify,
            disposal: None,
            created_at: now,
            updated_at: now,
        })
    }

    #[instrument(skip(self), fields(event_id = %event_id))]
    async fn get_event(&self, event_id: &str) -> DomainResult<Option<DeviceEvent>> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!("SELECT {} FROM iot_device_events WHERE id = $1", EVENT_COLUMNS);
        let row = conn
            .query_opt(sql.as_str(), &[&event_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        row.as_ref().map(event_from_row).transpose()
    }

    #[instrument(skip(self, input), fields(event_id = %input.id, disposed_by = %input.disposal.disposed_by))]
    async fn dispose_event(&self, input: DisposeDeviceEventRepoInput) -> DomainResult<DeviceEvent> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let sql = format!(
            "UPDATE iot_device_events
             SET disposed = TRUE, disposed_by = $2, disposed_at = $3, updated_at = $3
             WHERE id = $1
             RETURNING {}",
            EVENT_COLUMNS
        );
        let row = conn
            .query_opt(
                sql.as_str(),
                &[&input.id, &input.disposal.disposed_by, &input.disposal.disposed_at],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        match row {
            Some(row) => event_from_row(&row),
            None => Err(DomainError::DeviceEventNotFound(input.id)),
        }
    }

    #[instrument(skip(self), fields(event_id = %event_id))]
    async fn delete_event(&self, event_id: &str) -> DomainResult<bool> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let deleted = conn
            .execute("DELETE FROM iot_device_events WHERE id = $1", &[&event_id])
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(deleted > 0)
    }

    #[instrument(skip(self, input), fields(scope = ?input.scope, start = input.pagination.start))]
    async fn list_events(&self, input: ListDeviceEventsRepoInput) -> DomainResult<Vec<DeviceEvent>> {
        let (start, page_limit) = pagination_bounds(&input.pagination)?;
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let mut builder = EventQueryBuilder::new(&input.scope, &input.filters);
        let offset = builder.bind(Box::new(start));
        let limit = match page_limit {
            Some(limit) => builder.bind(Box::new(limit)),
            None => "ALL".to_string(),
        };

        let sql = format!(
            "SELECT {} FROM iot_device_events {} ORDER BY created_at DESC LIMIT {} OFFSET {}",
            EVENT_COLUMNS,
            builder.where_clause(),
            limit,
            offset
        );

        let rows = conn
            .query(sql.as_str(), &builder.param_refs())
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        rows.iter().map(event_from_row).collect()
    }

    #[instrument(skip(self, input), fields(scope = ?input.scope))]
    async fn count_events(&self, input: CountDeviceEventsRepoInput) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let builder = EventQueryBuilder::new(&input.scope, &input.filters);
        let sql = format!(
            "SELECT COUNT(*) FROM iot_device_events {}",
            builder.where_clause()
        );

        let row = conn
            .query_one(sql.as_str(), &builder.param_refs())
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    #[instrument(skip(self), fields(cutoff = %cutoff))]
    async fn delete_events_created_before(&self, cutoff: DateTime<Utc>) -> DomainResult<u64> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let deleted = conn
            .execute(
                "DELETE FROM iot_device_events WHERE created_at < $1",
                &[&cutoff],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(deleted, "deleted expired device events");
        Ok(deleted)
    }
}

/// OFFSET and LIMIT as Postgres BIGINTs
fn pagination_bounds(pagination: &Pagination) -> DomainResult<(i64, Option<i64>)> {
    let start = i64::try_from(pagination.start).map_err(|_| {
        DomainError::ValidationError(format!("start {} is out of range", pagination.start))
    })?;
    let limit = pagination
        .limit
        .map(|limit| {
            i64::try_from(limit)
                .map_err(|_| DomainError::ValidationError(format!("limit {} is out of range", limit)))
        })
        .transpose()?;
    Ok((start, limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_scope_binds_identity_list_first() {
        let scope = EventScope::OwnerIn(vec!["u@example.com".to_string(), "group-1".to_string()]);
        let builder = EventQueryBuilder::new(&scope, &EventFilters::default());
        assert_eq!(builder.where_clause(), "WHERE owner_id = ANY($1)");
        assert_eq!(builder.params.len(), 1);
    }

    #[test]
    fn test_filters_are_appended_in_order() {
        let filters = EventFilters {
            event_level: Some(2),
            disposed: Some(false),
            ..Default::default()
        };
        let builder = EventQueryBuilder::new(&EventScope::Company("company-1".to_string()), &filters);
        assert_eq!(
            builder.where_clause(),
            "WHERE owner_company = $1 AND event_level = $2 AND disposed = $3"
        );
    }

    #[test]
    fn test_pagination_beyond_bigint_is_a_validation_error() {
        let too_far = Pagination {
            start: u64::MAX,
            limit: None,
        };
        assert!(matches!(
            pagination_bounds(&too_far),
            Err(DomainError::ValidationError(_))
        ));

        let too_many = Pagination {
            start: 0,
            limit: Some(i64::MAX as u64 + 1),
        };
        assert!(matches!(
            pagination_bounds(&too_many),
            Err(DomainError::ValidationError(_))
        ));

        let page = Pagination {
            start: 20,
            limit: Some(10),
        };
        assert_eq!(pagination_bounds(&page).unwrap(), (20, Some(10)));
    }
}
