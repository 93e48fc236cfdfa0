use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Read and parse an optional environment variable.
///
/// Unset and empty variables yield `Ok(None)`; values that fail to parse are
/// an error naming the variable.
pub fn parse_env<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid {name} environment variable '{value}': {e}")),
        Err(_) => Ok(None),
    }
}

/// Read an optional string environment variable, treating empty as unset.
pub fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
