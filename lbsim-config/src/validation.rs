// lbsim-config/src/validation.rs
//! Custom validation functions for configuration.

use validator::ValidationError;

/// Replay speed factor must be a finite, strictly positive number.
pub fn validate_time_scale(scale: f64) -> Result<(), ValidationError> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_time_scale"))
    }
}

/// Validate log level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"]
        .contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

/// Trace path must name something.
pub fn validate_trace_path(path: &std::path::Path) -> Result<(), ValidationError> {
    if path.as_os_str().is_empty() {
        return Err(ValidationError::new("empty_trace_path"));
    }
    Ok(())
}
