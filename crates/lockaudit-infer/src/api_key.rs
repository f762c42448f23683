use std::env;
use std::fmt;

/// Bearer token for the completion endpoint. Its value never appears in logs or errors.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Reads the key from `var`; unset or blank variables yield `None`.
    pub fn from_env(var: &str) -> Option<Self> {
        env::var(var)
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .map(Self)
    }

    pub(crate) fn bearer(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<hidden>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_the_key() {
        let key = ApiKey::new("sk-live-123");

        assert_eq!(format!("{key:?}"), "ApiKey(<hidden>)");
        assert!(!format!("{:?}", Some(&key)).contains("sk-live"));
        assert_eq!(key.bearer(), "sk-live-123");
    }

    #[test]
    fn blank_environment_values_are_ignored() {
        let var = "LOCKAUDIT_TEST_BLANK_API_KEY";
        let var = format!("{var}_{}", std::process::id());

        // SAFETY: test-scoped environment variable with unique name.
        unsafe {
            env::set_var(&var, "   ");
        }
        assert_eq!(ApiKey::from_env(&var), None);

        // SAFETY: cleanup of test-scoped environment variable.
        unsafe {
            env::remove_var(&var);
        }
        assert_eq!(ApiKey::from_env(&var), None);
    }
}
