//! Numeric sum endpoint.
//!
//! `GET /sum/1/2/3` adds the path segments as floating point numbers.

use axum::{extract::Path, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::{ApiError, AppState};

/// Sum response.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SumResponse {
    pub sum: f64,
}

/// Create the sum routes.
pub fn sum_routes() -> Router<AppState> {
    Router::new()
        .route("/sum", get(empty_sum))
        .route("/sum/{*numbers}", get(calculate_sum))
}

async fn empty_sum() -> Result<Json<SumResponse>, ApiError> {
    sum_path("").map(|sum| Json(SumResponse { sum }))
}

async fn calculate_sum(Path(numbers): Path<String>) -> Result<Json<SumResponse>, ApiError> {
    debug!(numbers = %numbers, "Received request to sum numbers");
    let sum = sum_path(&numbers)?;
    info!(sum, "Calculated sum");
    Ok(Json(SumResponse { sum }))
}

/// Add the `/`-separated numbers in `numbers`. Empty segments are ignored.
/// Infinite or NaN inputs, and sums that overflow, are rejected.
pub fn sum_path(numbers: &str) -> Result<f64, ApiError> {
    if numbers.is_empty() {
        warn!("Empty input received");
        return Err(ApiError::BadRequest("No numbers provided".to_string()));
    }

    let values = numbers
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            warn!(error = %e, "Error parsing numbers");
            ApiError::BadRequest("Invalid number format in the URL path".to_string())
        })?;

    if values.is_empty() {
        warn!("No valid numbers found in input");
        return Err(ApiError::BadRequest("No valid numbers provided".to_string()));
    }

    let sum: f64 = values.iter().sum();
    if !sum.is_finite() {
        warn!(numbers = %numbers, "Sum is not a finite number");
        return Err(ApiError::BadRequest(
            "Invalid number format in the URL path".to_string(),
        ));
    }

    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_path() {
        assert_eq!(sum_path("1/2/3/4/5").unwrap(), 15.0);
        assert_eq!(sum_path("1.5/-0.5").unwrap(), 1.0);
        assert_eq!(sum_path("7//3/").unwrap(), 10.0);
    }

    #[test]
    fn test_sum_path_rejects_non_finite() {
        for input in ["1e400", "inf/1", "NaN", "1e308/1e308"] {
            assert!(
                matches!(
                    sum_path(input),
                    Err(ApiError::BadRequest(m)) if m == "Invalid number format in the URL path"
                ),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn test_sum_path_errors() {
        assert!(matches!(sum_path(""), Err(ApiError::BadRequest(m)) if m == "No numbers provided"));
        assert!(matches!(sum_path("//"), Err(ApiError::BadRequest(m)) if m == "No valid numbers provided"));
        assert!(matches!(
            sum_path("1/two/3"),
            Err(ApiError::BadRequest(m)) if m == "Invalid number format in the URL path"
        ));
    }
}
