use std::net::SocketAddr;

/// Configuration for the chat-session front end, resolved from the
/// environment. The API key has no embedded fallback; the process refuses
/// to start without one.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: String,
    pub model_name: String,
    pub temperature: f32,
    pub gemini_base_url: String,
    pub mcp_server_url: String,
    pub listen: SocketAddr,
    pub max_tool_iterations: usize,
    pub session_idle_secs: u64,
}

/// Configuration for the tool-execution back end.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub database_url: Option<String>,
    pub listen: SocketAddr,
}

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MCP_SERVER_URL: &str = "http://localhost:5003";
pub const DEFAULT_CHAT_LISTEN: &str = "127.0.0.1:5004";
pub const DEFAULT_TOOLS_LISTEN: &str = "127.0.0.1:5003";
pub const DEFAULT_MAX_TOOL_ITERATIONS: usize = 8;
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 3600;

impl ChatConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_key = lookup("GEMINI_API_KEY")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow::anyhow!("GEMINI_API_KEY is not set"))?;
        let model_name = lookup("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.into());
        let temperature = match lookup("MODEL_TEMPERATURE") {
            Some(v) => v.parse()?,
            None => DEFAULT_TEMPERATURE,
        };
        let gemini_base_url =
            lookup("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.into());
        let mcp_server_url =
            lookup("MCP_SERVER_URL").unwrap_or_else(|| DEFAULT_MCP_SERVER_URL.into());
        let listen = lookup("CHAT_LISTEN")
            .unwrap_or_else(|| DEFAULT_CHAT_LISTEN.into())
            .parse()?;
        let max_tool_iterations = match lookup("MAX_TOOL_ITERATIONS") {
            Some(v) => v.parse()?,
            None => DEFAULT_MAX_TOOL_ITERATIONS,
        };
        let session_idle_secs = match lookup("SESSION_IDLE_SECS") {
            Some(v) => v.parse()?,
            None => DEFAULT_SESSION_IDLE_SECS,
        };
        Ok(Self {
            api_key,
            model_name,
            temperature,
            gemini_base_url,
            mcp_server_url,
            listen,
            max_tool_iterations,
            session_idle_secs,
        })
    }
}

impl ToolsConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL");
        let listen = lookup("TOOLS_LISTEN")
            .unwrap_or_else(|| DEFAULT_TOOLS_LISTEN.into())
            .parse()?;
        Ok(Self { database_url, listen })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn chat_config_defaults() {
        let cfg = ChatConfig::from_lookup(env(&[("GEMINI_API_KEY", "k-123")])).unwrap();
        assert_eq!(cfg.api_key, "k-123");
        assert_eq!(cfg.model_name, DEFAULT_MODEL);
        assert_eq!(cfg.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(cfg.mcp_server_url, DEFAULT_MCP_SERVER_URL);
        assert_eq!(cfg.max_tool_iterations, DEFAULT_MAX_TOOL_ITERATIONS);
        assert_eq!(cfg.session_idle_secs, DEFAULT_SESSION_IDLE_SECS);
    }

    #[test]
    fn chat_config_requires_api_key() {
        assert!(ChatConfig::from_lookup(env(&[])).is_err());
        assert!(ChatConfig::from_lookup(env(&[("GEMINI_API_KEY", "")])).is_err());
    }

    #[test]
    fn chat_config_overrides() {
        let cfg = ChatConfig::from_lookup(env(&[
            ("GEMINI_API_KEY", "k"),
            ("MODEL_NAME", "gemini-2.5-pro"),
            ("MODEL_TEMPERATURE", "0.2"),
            ("MCP_SERVER_URL", "http://tools:9000"),
            ("CHAT_LISTEN", "0.0.0.0:8080"),
            ("MAX_TOOL_ITERATIONS", "3"),
            ("SESSION_IDLE_SECS", "0"),
        ]))
        .unwrap();
        assert_eq!(cfg.model_name, "gemini-2.5-pro");
        assert_eq!(cfg.temperature, 0.2);
        assert_eq!(cfg.mcp_server_url, "http://tools:9000");
        assert_eq!(cfg.listen.port(), 8080);
        assert_eq!(cfg.max_tool_iterations, 3);
        assert_eq!(cfg.session_idle_secs, 0);
    }

    #[test]
    fn tools_config_defaults_and_overrides() {
        let cfg = ToolsConfig::from_lookup(env(&[])).unwrap();
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.listen.port(), 5003);

        let cfg = ToolsConfig::from_lookup(env(&[
            ("DATABASE_URL", "sqlite:///tmp/hr.db"),
            ("TOOLS_LISTEN", "0.0.0.0:6000"),
        ]))
        .unwrap();
        assert_eq!(cfg.database_url.as_deref(), Some("sqlite:///tmp/hr.db"));
        assert_eq!(cfg.listen.port(), 6000);
    }
}
