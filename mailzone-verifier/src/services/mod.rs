//! Propagation verification services.

mod normalize;
pub mod propagation;
pub mod resolver;

use mailzone_provider::canonical_hostname;

use crate::error::{VerifierError, VerifierResult};
use crate::types::PropagationQuery;

/// Validate and normalise a query before any resolver is contacted.
///
/// Trims whitespace, case-folds the name and drops its trailing dot, and rejects
/// empty or overlong names and empty expected values.
pub(crate) fn validate_query(query: &PropagationQuery) -> VerifierResult<PropagationQuery> {
    let name = validate_name(&query.name)?;
    if query.expected_value.trim().is_empty() {
        return Err(VerifierError::ValidationError(format!(
            "Expected value for {} {name} is empty",
            query.record_type
        )));
    }
    Ok(PropagationQuery {
        name,
        record_type: query.record_type,
        expected_value: query.expected_value.trim().to_string(),
    })
}

/// Canonical form of a record name, or a validation error.
pub(crate) fn validate_name(name: &str) -> VerifierResult<String> {
    let name = canonical_hostname(name);
    if name.is_empty() {
        return Err(VerifierError::ValidationError(
            "Record name is required".to_string(),
        ));
    }
    if name.len() > 253 {
        return Err(VerifierError::ValidationError(format!(
            "Record name exceeds maximum length of 253 characters (got {})",
            name.len()
        )));
    }
    if name.split('.').any(str::is_empty) {
        return Err(VerifierError::ValidationError(format!(
            "Invalid record name: {name}"
        )));
    }
    Ok(name)
}
