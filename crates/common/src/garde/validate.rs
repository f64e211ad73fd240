//! Request validation backed by garde.

use crate::domain::DomainError;
use garde::{Report, Validate};

/// Validate a request, mapping the garde report into a `DomainError::ValidationError`
pub fn validate_struct<T>(value: &T) -> Result<(), DomainError>
where
    T: Validate,
    T::Context: Default,
{
    value
        .validate()
        .map_err(|report| DomainError::ValidationError(describe_report(&report)))
}

/// Render every failing path as "path: message", joined by ", "
fn describe_report(report: &Report) -> String {
    report
        .iter()
        .map(|(path, error)| match path.to_string() {
            p if p.is_empty() => error.message().to_string(),
            p => format!("{}: {}", p, error.message()),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Validate)]
    struct AddDeviceRequest {
        #[garde(length(min = 1))]
        group_id: String,
        #[garde(length(min = 1), inner(length(min = 1)))]
        devices: Vec<String>,
    }

    #[test]
    fn test_valid_request_passes() {
        let request = AddDeviceRequest {
            group_id: "group-1".to_string(),
            devices: vec!["SN-1".to_string()],
        };
        assert!(validate_struct(&request).is_ok());
    }

    #[test]
    fn test_empty_member_list_is_rejected() {
        let request = AddDeviceRequest {
            group_id: "group-1".to_string(),
            devices: vec![],
        };
        let result = validate_struct(&request);
        match result {
            Err(DomainError::ValidationError(msg)) => assert!(msg.contains("devices")),
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_member_is_rejected() {
        let request = AddDeviceRequest {
            group_id: "group-1".to_string(),
            devices: vec!["".to_string()],
        };
        assert!(matches!(
            validate_struct(&request),
            Err(DomainError::ValidationError(_))
        ));
    }
}
