use std::collections::HashMap;
use std::sync::OnceLock;

/// Process-wide message catalogue, loaded on first use.
static LOCALIZER: OnceLock<Localizer> = OnceLock::new();

fn localizer() -> &'static Localizer {
    LOCALIZER.get_or_init(Localizer::new)
}

/// Loads the catalogue eagerly; later calls are no-ops.
pub fn init() {
    localizer();
}

/// Get a message by key
pub fn t(key: &str) -> String {
    localizer().get(key)
}

/// Get a message by key, substituting `{$name}` placeholders
pub fn t_with_args(key: &str, args: &[(&str, &dyn std::fmt::Display)]) -> String {
    localizer().get_with_args(key, args)
}

#[derive(Debug)]
pub struct Localizer {
    messages: HashMap<String, String>,
}

impl Localizer {
    fn new() -> Self {
        Self::from_source(include_str!("../locales/en.ftl"))
    }

    /// Parses `key = value` lines; blank lines and `#` comments are ignored.
    pub fn from_source(content: &str) -> Self {
        let mut messages = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once(" = ") {
                messages.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { messages }
    }

    pub fn get(&self, key: &str) -> String {
        self.messages.get(key).cloned().unwrap_or_else(|| {
            tracing::warn!("Missing message key: {key}");
            format!("MISSING: {key}")
        })
    }

    pub fn get_with_args(&self, key: &str, args: &[(&str, &dyn std::fmt::Display)]) -> String {
        let mut message = self.get(key);
        for (var_name, value) in args {
            let placeholder = format!("{{${var_name}}}");
            message = message.replace(&placeholder, &format!("{value}"));
        }
        message
    }
}

#[macro_export]
macro_rules! t {
    ($key:expr) => {
        $crate::i18n::t($key)
    };
}

#[macro_export]
macro_rules! t_args {
    ($key:expr, $($name:expr => $value:expr),* $(,)?) => {{
        let args: &[(&str, &dyn std::fmt::Display)] = &[
            $(
                ($name, &$value),
            )*
        ];
        $crate::i18n::t_with_args($key, args)
    }};
}
