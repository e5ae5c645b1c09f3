use thiserror::Error;

/// An environment variable required by the application is not set.
#[derive(Debug, Error)]
#[error("Missing environment variable: {0}")]
pub struct MissingEnvVarError(pub String);

/// Reads an environment variable, returning a structured error if it's missing.
///
/// A variable that is set but blank (only whitespace) counts as missing, since
/// schedulers commonly export empty placeholders.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, MissingEnvVarError> {
    get_env_var_opt(name).ok_or_else(|| MissingEnvVarError(name.to_string()))
}

/// Reads an optional environment variable, trimming surrounding whitespace.
///
/// Returns `None` when the variable is unset, blank, or not valid unicode.
pub fn get_env_var_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn missing_var_reports_its_name() {
        let name = "SHARED_UTILS_TEST_DEFINITELY_UNSET";
        let err = get_env_var(name).unwrap_err();
        assert_eq!(err.to_string(), format!("Missing environment variable: {name}"));
    }

    #[test]
    #[serial]
    fn blank_var_counts_as_missing() {
        let name = "SHARED_UTILS_TEST_BLANK";
        // SAFETY: serialized test; no other thread touches the environment.
        unsafe { std::env::set_var(name, "   ") };
        assert!(get_env_var_opt(name).is_none());
        assert!(get_env_var(name).is_err());

        unsafe { std::env::set_var(name, " value ") };
        assert_eq!(get_env_var(name).unwrap(), "value");
        unsafe { std::env::remove_var(name) };
    }
}
