use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    pub currency: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: PathBuf::from("public/data"),
            currency: "$".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: lookup("PORT")
                .and_then(|value| value.parse::<u16>().ok())
                .unwrap_or(defaults.port),
            data_dir: lookup("FINANCES_DATA_DIR")
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            currency: lookup("FINANCES_CURRENCY").unwrap_or(defaults.currency),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_or_invalid_values_fall_back() {
        let config = Config::from_lookup(|name| (name == "PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn values_are_read_from_the_environment() {
        let config = Config::from_lookup(|name| match name {
            "PORT" => Some("9000".into()),
            "FINANCES_DATA_DIR" => Some("/srv/finances".into()),
            "FINANCES_CURRENCY" => Some("€".into()),
            _ => None,
        });
        assert_eq!(config.port, 9000);
        assert_eq!(config.data_dir, PathBuf::from("/srv/finances"));
        assert_eq!(config.currency, "€");
    }
}
