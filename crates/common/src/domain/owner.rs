use crate::domain::result::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};

pub const OWNER_TYPE_USER: &str = "User";
pub const OWNER_TYPE_COMPANY: &str = "Cloud Company";
pub const OWNER_TYPE_COMPANY_GROUP: &str = "Cloud Company Group";

/// The addressee and visibility scope of an event or device.
///
/// Stored as an `(owner_type, owner_id)` column pair; an empty type with a
/// null id is the ownerless `Public` case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id")]
pub enum Owner {
    User(String),
    Company(String),
    CompanyGroup(String),
    Public,
}

impl Owner {
    /// Type tag as persisted in the `owner_type` column
    pub fn owner_type(&self) -> &'static str {
        match self {
            Owner::User(_) => OWNER_TYPE_USER,
            Owner::Company(_) => OWNER_TYPE_COMPANY,
            Owner::CompanyGroup(_) => OWNER_TYPE_COMPANY_GROUP,
            Owner::Public => "",
        }
    }

    pub fn owner_id(&self) -> Option<&str> {
        match self {
            Owner::User(id) | Owner::Company(id) | Owner::CompanyGroup(id) => Some(id),
            Owner::Public => None,
        }
    }

    /// Rebuild an owner from its persisted column pair
    pub fn from_parts(owner_type: Option<&str>, owner_id: Option<&str>) -> DomainResult<Self> {
        match (owner_type.unwrap_or(""), owner_id) {
            ("", None) => Ok(Owner::Public),
            (OWNER_TYPE_USER, Some(id)) if !id.is_empty() => Ok(Owner::User(id.to_string())),
            (OWNER_TYPE_COMPANY, Some(id)) if !id.is_empty() => {
                Ok(Owner::Company(id.to_string()))
            }
            (OWNER_TYPE_COMPANY_GROUP, Some(id)) if !id.is_empty() => {
                Ok(Owner::CompanyGroup(id.to_string()))
            }
            (owner_type, owner_id) => Err(DomainError::InvalidOwner(format!(
                "owner_type={:?} owner_id={:?}",
                owner_type, owner_id
            ))),
        }
    }
}
