//! 多语言文案
//!
//! 每个语言一个 JSON 文件（`translations/zh-CN.json`），支持嵌套命名空间。
//! 占位符为 `{0}`、`{1}`……，括号内带空格的写法按原文保留。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::utils::arr_get;

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Translator {
    default_locale: String,
    catalogs: HashMap<String, Value>,
}

impl Translator {
    pub fn new(default_locale: impl Into<String>, catalogs: HashMap<String, Value>) -> Self {
        Self {
            default_locale: default_locale.into(),
            catalogs,
        }
    }

    /// 读取目录下所有 `*.json`，文件名即语言代码
    pub fn load(dir: &Path, default_locale: &str) -> Result<Self, TranslationError> {
        let io_err = |source| TranslationError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut catalogs = HashMap::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(locale) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };

            let raw = std::fs::read_to_string(&path).map_err(|source| TranslationError::Io {
                path: path.clone(),
                source,
            })?;
            let catalog: Value = serde_json::from_str(&raw)
                .map_err(|source| TranslationError::Parse { path: path.clone(), source })?;
            tracing::debug!("Loaded translations for {}", locale);
            catalogs.insert(locale, catalog);
        }

        Ok(Self::new(default_locale, catalogs))
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn has_locale(&self, locale: &str) -> bool {
        self.catalogs.contains_key(locale)
    }

    pub fn locales(&self) -> Vec<&str> {
        let mut locales: Vec<&str> = self.catalogs.keys().map(String::as_str).collect();
        locales.sort_unstable();
        locales
    }

    /// 找不到时依次回退到默认语言和原文
    pub fn translate<S: AsRef<str>>(&self, locale: &str, source: &str, values: &[S]) -> String {
        let template = self
            .lookup(locale, source)
            .or_else(|| self.lookup(&self.default_locale, source))
            .unwrap_or(source);
        substitute(template, values)
    }

    fn lookup(&self, locale: &str, key: &str) -> Option<&str> {
        let catalog = self.catalogs.get(locale)?;
        arr_get(catalog, key).and_then(Value::as_str)
    }
}

/// 替换 `{n}` 占位符；只认括号内纯数字，越界下标保留原文
pub fn substitute<S: AsRef<str>>(template: &str, values: &[S]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let inner = &after[..close];
            if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let index: usize = inner.parse().ok()?;
            values.get(index).map(|v| (v.as_ref(), close))
        });

        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
