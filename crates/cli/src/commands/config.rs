use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use shopdesk_core::config::AppConfig;
use toml::Value;

use crate::commands::{load_config, CommandResult};

/// One effective setting, with the env var that can override it.
struct Setting {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(&config) {
        let source = field_source(
            setting.key,
            setting.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(setting.key, &setting.value, source));
    }

    CommandResult::success("config", lines.join("\n"))
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };

    vec![
        setting("database.url", &["SHOPDESK_DATABASE_URL"], config.database.url.clone()),
        setting(
            "database.max_connections",
            &["SHOPDESK_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        setting(
            "database.timeout_secs",
            &["SHOPDESK_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        setting("llm.provider", &["SHOPDESK_LLM_PROVIDER"], format!("{:?}", config.llm.provider)),
        setting("llm.model", &["SHOPDESK_LLM_MODEL"], config.llm.model.clone()),
        setting(
            "llm.base_url",
            &["SHOPDESK_LLM_BASE_URL"],
            config.llm_base_url().unwrap_or_else(|| "<unset>".to_string()),
        ),
        setting("llm.api_key", &["SHOPDESK_LLM_API_KEY", "OPENAI_API_KEY"], api_key.to_string()),
        setting(
            "llm.timeout_secs",
            &["SHOPDESK_LLM_TIMEOUT_SECS"],
            config.llm.timeout_secs.to_string(),
        ),
        setting(
            "llm.max_retries",
            &["SHOPDESK_LLM_MAX_RETRIES"],
            config.llm.max_retries.to_string(),
        ),
        setting(
            "server.bind_address",
            &["SHOPDESK_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        setting("server.port", &["SHOPDESK_SERVER_PORT"], config.server.port.to_string()),
        setting(
            "server.graceful_shutdown_secs",
            &["SHOPDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs.to_string(),
        ),
        setting(
            "chat.max_message_chars",
            &["SHOPDESK_CHAT_MAX_MESSAGE_CHARS"],
            config.chat.max_message_chars.to_string(),
        ),
        setting(
            "chat.context_window",
            &["SHOPDESK_CHAT_CONTEXT_WINDOW"],
            config.chat.context_window.to_string(),
        ),
        setting(
            "logging.level",
            &["SHOPDESK_LOGGING_LEVEL", "SHOPDESK_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        setting(
            "logging.format",
            &["SHOPDESK_LOGGING_FORMAT", "SHOPDESK_LOG_FORMAT"],
            format!("{:?}", config.logging.format),
        ),
    ]
}

fn setting(key: &'static str, env_keys: &'static [&'static str], value: String) -> Setting {
    Setting { key, env_keys, value }
}

fn detect_config_path() -> Option<PathBuf> {
    ["shopdesk.toml", "config/shopdesk.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use toml::Value;

    use super::{contains_path, field_source, render_line};

    #[test]
    fn nested_keys_resolve_against_the_file() {
        let doc: Value = "[llm]\nmodel = \"gpt-4o-mini\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.base_url"));
        assert!(!contains_path(&doc, "server.port"));
    }

    #[test]
    fn file_source_names_the_file() {
        let doc: Value = "[chat]\ncontext_window = 8\n".parse().expect("toml");

        let source = field_source(
            "chat.context_window",
            &["SHOPDESK_TEST_UNSET_CONTEXT_WINDOW"],
            Some(&doc),
            Some(Path::new("config/shopdesk.toml")),
        );
        assert_eq!(source, "file (config/shopdesk.toml)");

        let source =
            field_source("chat.max_message_chars", &["SHOPDESK_TEST_UNSET_MAX"], Some(&doc), None);
        assert_eq!(source, "default");
    }

    #[test]
    fn rendered_line_lists_value_and_source() {
        assert_eq!(
            render_line("llm.api_key", "<redacted>", "env (OPENAI_API_KEY)".to_string()),
            "- llm.api_key = <redacted> (source: env (OPENAI_API_KEY))"
        );
    }
}
