//! Internationalization (i18n) module
//!
//! Detects the UI language for CLI messages. Supports English and Chinese Simplified.
//! Note: Log messages remain in English for consistency.

use std::sync::OnceLock;

/// Supported languages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    ChineseSimplified,
}

impl Language {
    /// Locale name of the matching `locales/*.yml` file
    pub fn locale(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::ChineseSimplified => "zh-CN",
        }
    }

    /// Map a BCP 47 / POSIX locale string to a supported language
    pub fn from_locale(locale: &str) -> Self {
        let locale = locale.to_lowercase();
        if locale.starts_with("zh") || locale.contains("hans") {
            Language::ChineseSimplified
        } else {
            Language::English
        }
    }
}

/// Global language instance
static LANGUAGE: OnceLock<Language> = OnceLock::new();

/// Current language based on the system locale
pub fn get_language() -> Language {
    *LANGUAGE.get_or_init(detect_language)
}

/// Detect system language, preferring the `LANG` family of variables over the OS setting
fn detect_language() -> Language {
    let from_env = ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty() && value != "C" && value != "POSIX");

    match from_env.or_else(sys_locale::get_locale) {
        Some(locale) => Language::from_locale(&locale),
        None => Language::English,
    }
}

/// Set the translation locale for `t!` lookups
pub fn init_locale() {
    rust_i18n::set_locale(get_language().locale());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_locale() {
        assert_eq!(Language::from_locale("zh_CN.UTF-8"), Language::ChineseSimplified);
        assert_eq!(Language::from_locale("zh-Hans-CN"), Language::ChineseSimplified);
        assert_eq!(Language::from_locale("en_US.UTF-8"), Language::English);
        assert_eq!(Language::from_locale("de-DE"), Language::English);
        assert_eq!(Language::ChineseSimplified.locale(), "zh-CN");
    }
}
