use std::env;

use crate::MragentError;

/// Wrapper around API keys so they never end up in debug output.
#[derive(Clone)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***redacted***")
    }
}

/// Require that a given environment variable is set and non-empty.
pub fn require_env(var: &str) -> Result<SecretValue, MragentError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(SecretValue(value)),
        _ => Err(MragentError::MissingSecret(var.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_env_reads_model_key() {
        unsafe { std::env::set_var("MRAGENT_TEST_MODEL_KEY", "value") };
        let secret = require_env("MRAGENT_TEST_MODEL_KEY").expect("secret should load");
        assert_eq!(secret.expose(), "value");
        assert_eq!(format!("{secret:?}"), "***redacted***");
    }

    #[test]
    fn require_env_missing() {
        unsafe { std::env::remove_var("MRAGENT_TEST_MODEL_KEY_MISSING") };
        let err = require_env("MRAGENT_TEST_MODEL_KEY_MISSING").unwrap_err();
        assert!(matches!(err, MragentError::MissingSecret(_)));
    }
}
