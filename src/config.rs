//! Configuration loader and validator for the storefront bulk console.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::model::{ActionKind, PreflightPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub host: Host,
    pub actions: Actions,
}

/// Grid and job behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub max_batch_size: usize,
    pub poll_interval_ms: u64,
    #[serde(default = "default_lookback_years")]
    pub lookback_years: u32,
    #[serde(default)]
    pub preflight_failure: PreflightPolicy,
}

fn default_lookback_years() -> u32 {
    2
}

/// Host framework RPC endpoint and credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Host {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actions {
    pub sync: ActionSettings,
    pub rename: ActionSettings,
    pub reconcile: ActionSettings,
}

impl Actions {
    pub fn get(&self, action: ActionKind) -> &ActionSettings {
        match action {
            ActionKind::Sync => &self.sync,
            ActionKind::Rename => &self.rename,
            ActionKind::Reconcile => &self.reconcile,
        }
    }
}

/// Host methods and names for one action family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionSettings {
    /// Job name the queue reports while the batch runs.
    pub job_name: String,
    /// Real-time channel carrying progress lines.
    pub channel: String,
    pub list_method: String,
    pub batch_method: String,
    /// Argument name carrying the delimiter-joined ids.
    pub batch_arg: String,
    pub single_method: String,
    /// Argument name carrying the row id for `single_method`.
    #[serde(default = "default_single_arg")]
    pub single_arg: String,
    /// Used instead of `single_method` for rows that are already synced.
    #[serde(default)]
    pub resync_method: Option<String>,
    #[serde(default)]
    pub merge_check_method: Option<String>,
}

fn default_single_arg() -> String {
    "product".into()
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn require(value: &str, key: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{key} must be non-empty")));
    }
    Ok(())
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.max_batch_size == 0 {
        return Err(ConfigError::Invalid("app.max_batch_size must be > 0".into()));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0".into()));
    }

    require(&cfg.host.base_url, "host.base_url")?;
    if reqwest::Url::parse(&cfg.host.base_url).is_err() {
        return Err(ConfigError::Invalid("host.base_url must be an absolute URL".into()));
    }
    require(&cfg.host.api_key, "host.api_key")?;
    require(&cfg.host.api_secret, "host.api_secret")?;

    for action in ActionKind::all() {
        let a = cfg.actions.get(action);
        let key = |field: &str| format!("actions.{}.{}", action.as_str(), field);
        require(&a.job_name, &key("job_name"))?;
        require(&a.channel, &key("channel"))?;
        require(&a.list_method, &key("list_method"))?;
        require(&a.batch_method, &key("batch_method"))?;
        require(&a.batch_arg, &key("batch_arg"))?;
        require(&a.single_method, &key("single_method"))?;
        require(&a.single_arg, &key("single_arg"))?;
        if let Some(m) = &a.resync_method {
            require(m, &key("resync_method"))?;
        }
        if let Some(m) = &a.merge_check_method {
            require(m, &key("merge_check_method"))?;
        }
    }

    Ok(())
}

/// Returns a complete example configuration.
pub fn example() -> &'static str {
    r#"app:
  max_batch_size: 50
  poll_interval_ms: 2000
  lookback_years: 2
  preflight_failure: proceed

host:
  base_url: "https://erp.example.com/"
  api_key: "YOUR_API_KEY"
  api_secret: "YOUR_API_SECRET"

actions:
  sync:
    job_name: "shopify.job.sync.selected.products"
    channel: "shopify.key.sync.selected.products"
    list_method: "ecommerce_integrations.shopify.page.shopify_import_products.shopify_import_products.get_shopify_products"
    batch_method: "ecommerce_integrations.shopify.page.shopify_import_products.shopify_import_products.import_selected_products"
    batch_arg: "products"
    single_method: "ecommerce_integrations.shopify.page.shopify_import_products.shopify_import_products.sync_product"
    resync_method: "ecommerce_integrations.shopify.page.shopify_import_products.shopify_import_products.resync_product"
  rename:
    job_name: "shopify.job.rename.selected_products"
    channel: "shopify.key.rename.selected.products"
    list_method: "ecommerce_integrations.shopify.page.shopify_import_products.shopify_import_products.get_shopify_products"
    batch_method: "ecommerce_integrations.ecommerce_integrations.page.shopify_item_code_rename.rename_products.rename"
    batch_arg: "products"
    single_method: "ecommerce_integrations.ecommerce_integrations.page.shopify_item_code_rename.rename_products.rename"
    single_arg: "products"
  reconcile:
    job_name: "shopify.job.reconcile.selected_products"
    channel: "shopify.key.reconcile.selected.products"
    list_method: "ecommerce_integrations.ecommerce_integrations.page.shopify_item_code_reconciliation.shopify_item_code_reconciliation.get_unreconciled_items"
    batch_method: "ecommerce_integrations.ecommerce_integrations.page.shopify_item_code_reconciliation.shopify_item_code_reconciliation.reconcile_multiple"
    batch_arg: "comma_delimited_products"
    single_method: "ecommerce_integrations.ecommerce_integrations.page.shopify_item_code_reconciliation.shopify_item_code_reconciliation.reconcile"
    merge_check_method: "ecommerce_integrations.ecommerce_integrations.page.shopify_item_code_reconciliation.shopify_item_code_reconciliation.get_merge_required_items"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_cfg() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_cfg();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.preflight_failure, PreflightPolicy::Proceed);
        assert!(cfg.actions.reconcile.merge_check_method.is_some());
        assert!(cfg.actions.sync.merge_check_method.is_none());
        assert_eq!(cfg.actions.sync.single_arg, "product");
        assert_eq!(cfg.actions.rename.single_arg, "products");
        assert!(cfg.actions.sync.resync_method.is_some());
        assert!(cfg.actions.reconcile.resync_method.is_none());
    }

    #[test]
    fn defaults_when_optional_keys_missing() {
        let trimmed = example()
            .replace("  lookback_years: 2\n", "")
            .replace("  preflight_failure: proceed\n", "");
        let cfg: Config = serde_yaml::from_str(&trimmed).unwrap();
        assert_eq!(cfg.app.lookback_years, 2);
        assert_eq!(cfg.app.preflight_failure, PreflightPolicy::Proceed);
    }

    #[test]
    fn invalid_app_values() {
        let mut cfg = example_cfg();
        cfg.app.max_batch_size = 0;
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("max_batch_size")), _ => panic!("wrong error") }

        let mut cfg = example_cfg();
        cfg.app.poll_interval_ms = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_host() {
        let mut cfg = example_cfg();
        cfg.host.base_url = "not a url".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("host.base_url")), _ => panic!("wrong error") }

        let mut cfg = example_cfg();
        cfg.host.api_secret = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("host.api_secret")), _ => panic!("wrong error") }
    }

    #[test]
    fn invalid_action_fields_name_the_key() {
        let mut cfg = example_cfg();
        cfg.actions.rename.channel = "".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert_eq!(msg, "actions.rename.channel must be non-empty"), _ => panic!("wrong error") }

        let mut cfg = example_cfg();
        cfg.actions.reconcile.merge_check_method = Some("".into());
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.actions.sync.resync_method = Some(" ".into());
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert_eq!(msg, "actions.sync.resync_method must be non-empty"), _ => panic!("wrong error") }
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.max_batch_size, 50);
        assert_eq!(cfg.actions.get(ActionKind::Sync).batch_arg, "products");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let td = tempdir().unwrap();
        let err = load(Some(&td.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
