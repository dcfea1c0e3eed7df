//! Language registry: the finite set of languages this host supports.
//!
//! The registry is built from [`Config::languages`] and owned by the resource
//! manager. Display metadata comes from a built-in table of known codes;
//! codes outside the table are listed under their own code.

use crate::config::Config;

/// Metadata for a supported language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageConfig {
    /// BCP 47 tag as used in resource paths (e.g. "en", "zh-CN")
    pub code: String,

    /// English name of the language (e.g. "Japanese")
    pub name: String,

    /// Native name of the language (e.g. "日本語")
    pub native_name: String,

    /// Whether this is the reference language other key sets are diffed against
    pub is_reference: bool,

    /// Disabled languages stay listed but are never loaded or preloaded
    pub enabled: bool,
}

pub struct LanguageRegistry {
    languages: Vec<LanguageConfig>,
}

impl LanguageRegistry {
    /// Registry for every language in `config.languages`, in configured order.
    pub fn from_config(config: &Config) -> Self {
        let languages = config
            .languages
            .iter()
            .map(|code| {
                let (name, native_name) = known_names(code)
                    .map(|(name, native)| (name.to_string(), native.to_string()))
                    .unwrap_or_else(|| (code.clone(), code.clone()));
                LanguageConfig {
                    code: code.clone(),
                    name,
                    native_name,
                    is_reference: *code == config.reference_language,
                    enabled: !config.disabled_languages.contains(code),
                }
            })
            .collect();

        Self { languages }
    }

    pub fn get_by_code(&self, code: &str) -> Option<&LanguageConfig> {
        self.languages.iter().find(|lang| lang.code == code)
    }

    pub fn list_enabled(&self) -> Vec<&LanguageConfig> {
        self.languages.iter().filter(|lang| lang.enabled).collect()
    }

    /// Codes of enabled languages, in configured order.
    pub fn enabled_codes(&self) -> Vec<String> {
        self.list_enabled()
            .into_iter()
            .map(|lang| lang.code.clone())
            .collect()
    }

    pub fn list_all(&self) -> Vec<&LanguageConfig> {
        self.languages.iter().collect()
    }

    /// The reference language, if it is part of the supported set.
    pub fn reference(&self) -> Option<&LanguageConfig> {
        self.languages.iter().find(|lang| lang.is_reference)
    }

    /// Check if a language code is supported and enabled.
    pub fn is_enabled(&self, code: &str) -> bool {
        self.get_by_code(code)
            .map(|lang| lang.enabled)
            .unwrap_or(false)
    }

    /// Match a system locale such as `ja_JP.UTF-8` or `zh-Hant-TW` to a
    /// supported code.
    ///
    /// An exact (case-insensitive) match wins; otherwise the primary subtag is
    /// compared, preferring the first configured language that shares it.
    pub fn match_locale(&self, locale: &str) -> Option<&LanguageConfig> {
        let normalized = normalize_locale(locale);
        if normalized.is_empty() {
            return None;
        }

        let enabled = self.list_enabled();
        if let Some(exact) = enabled
            .iter()
            .copied()
            .find(|lang| lang.code.eq_ignore_ascii_case(&normalized))
        {
            return Some(exact);
        }

        let primary = primary_subtag(&normalized);
        enabled
            .into_iter()
            .find(|lang| primary_subtag(&lang.code).eq_ignore_ascii_case(primary))
    }
}

/// Strip encoding and modifier suffixes and use `-` as the separator.
fn normalize_locale(locale: &str) -> String {
    locale
        .split(['.', '@'])
        .next()
        .unwrap_or_default()
        .trim()
        .replace('_', "-")
}

fn primary_subtag(tag: &str) -> &str {
    tag.split('-').next().unwrap_or(tag)
}

fn known_names(code: &str) -> Option<(&'static str, &'static str)> {
    let names = match code {
        "en" => ("English", "English"),
        "zh-CN" => ("Chinese (Simplified)", "简体中文"),
        "zh-TW" => ("Chinese (Traditional)", "繁體中文"),
        "ja" => ("Japanese", "日本語"),
        "ko" => ("Korean", "한국어"),
        "fr" => ("French", "Français"),
        "de" => ("German", "Deutsch"),
        "es" => ("Spanish", "Español"),
        "ru" => ("Russian", "Русский"),
        "pt-BR" => ("Portuguese (Brazil)", "Português (Brasil)"),
        _ => return None,
    };
    Some(names)
}
