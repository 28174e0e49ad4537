use std::path::PathBuf;

use anyhow::bail;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockMode {
    /// Re-enter the account password
    Password,
    /// Any input clears the lock
    Always,
}

impl UnlockMode {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "password" => Ok(Self::Password),
            "always" => Ok(Self::Always),
            other => bail!("DUET_UNLOCK must be 'password' or 'always', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub unlock: UnlockMode,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let db_path = std::env::var("DUET_DB_PATH").unwrap_or_else(|_| "duet.db".into());
        let unlock = std::env::var("DUET_UNLOCK").unwrap_or_else(|_| "password".into());
        Ok(Self {
            db_path: PathBuf::from(db_path),
            unlock: UnlockMode::parse(&unlock)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlock_mode_parsing() {
        assert_eq!(UnlockMode::parse("password").unwrap(), UnlockMode::Password);
        assert_eq!(UnlockMode::parse(" Always ").unwrap(), UnlockMode::Always);
        assert!(UnlockMode::parse("pin").is_err());
    }
}
