//! Import helpers for simplifying resource import implementations

use crate::resource::{ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource};
use crate::types::{AttributePath, Diagnostic, DynamicValue};

/// Sets the import ID to a specific attribute in state
///
/// Example: ID "example.com" -> state.name = "example.com"
pub fn import_state_passthrough_id(
    attr_path: AttributePath,
    request: &ImportResourceStateRequest,
    response: &mut ImportResourceStateResponse,
) {
    let mut state = DynamicValue::object();

    if let Err(e) = state.set_string(&attr_path, request.id.clone()) {
        response.diagnostics.push(
            Diagnostic::error(
                format!("Failed to set import ID: {}", e),
                format!("Could not set attribute '{}' to value '{}'", attr_path, request.id),
            )
            .with_attribute(attr_path),
        );
        return;
    }

    response.imported_resources.push(ImportedResource {
        type_name: request.type_name.clone(),
        state,
    });
}

/// Splits a composite import ID on commas.
///
/// `format` is shown to the user on failure, e.g. `"domain,record_id"`.
/// Every part must be non-empty.
pub fn split_import_id(
    id: &str,
    expected_parts: usize,
    format: &str,
) -> std::result::Result<Vec<String>, Diagnostic> {
    let parts: Vec<String> = id.split(',').map(str::to_string).collect();
    if parts.len() != expected_parts || parts.iter().any(String::is_empty) {
        return Err(Diagnostic::error(
            "Invalid import ID",
            format!("Unexpected format of ID ({}), expected {}", id, format),
        ));
    }
    Ok(parts)
}

/// Builds a response holding a single imported state
pub fn imported(type_name: &str, state: DynamicValue) -> ImportResourceStateResponse {
    ImportResourceStateResponse {
        imported_resources: vec![ImportedResource {
            type_name: type_name.to_string(),
            state,
        }],
        diagnostics: vec![],
    }
}

/// Builds a failed response carrying one diagnostic
pub fn import_failed(diagnostic: Diagnostic) -> ImportResourceStateResponse {
    ImportResourceStateResponse {
        imported_resources: vec![],
        diagnostics: vec![diagnostic],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_sets_attribute() {
        let request = ImportResourceStateRequest {
            type_name: "abrha_domain".to_string(),
            id: "example.com".to_string(),
        };
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };

        import_state_passthrough_id(AttributePath::new("name"), &request, &mut response);

        assert!(response.diagnostics.is_empty());
        assert_eq!(response.imported_resources.len(), 1);
        assert_eq!(
            response.imported_resources[0]
                .state
                .get_string(&AttributePath::new("name"))
                .unwrap(),
            "example.com"
        );
    }

    #[test]
    fn split_accepts_expected_shape() {
        let parts = split_import_id("example.com,1234", 2, "domain,record_id").unwrap();
        assert_eq!(parts, vec!["example.com", "1234"]);
    }

    #[test]
    fn split_rejects_wrong_part_count_and_empty_parts() {
        let err = split_import_id("example.com", 2, "domain,record_id").unwrap_err();
        assert_eq!(
            err.detail,
            "Unexpected format of ID (example.com), expected domain,record_id"
        );
        assert!(split_import_id("a,b,c", 2, "domain,record_id").is_err());
        assert!(split_import_id("example.com,", 2, "domain,record_id").is_err());
    }
}
