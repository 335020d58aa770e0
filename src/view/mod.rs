//! 模板渲染
//!
//! 模板函数通过闭包拿到 [`ViewContext`]，不依赖全局状态：
//! `base_url(path?)`、`version()`、`t(source, values?)`。
//! `t` 从渲染上下文的 `locale` 变量取当前语言。

use std::path::Path;
use std::sync::Arc;

use minijinja::{Environment, State, Value as TemplateValue};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::i18n::Translator;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
    #[error("view variable cannot be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct ViewContext {
    pub base_url: String,
    pub version: String,
    pub translator: Arc<Translator>,
}

impl ViewContext {
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            format!("{}/", base)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

/// 模板变量
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ViewVars(Map<String, Value>);

impl ViewVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<(), ViewError> {
        self.0.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

pub struct View {
    env: Environment<'static>,
    context: Arc<ViewContext>,
}

impl View {
    pub fn new(templates_dir: &Path, context: ViewContext) -> Self {
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(templates_dir));
        Self::with_env(env, context)
    }

    pub fn with_env(mut env: Environment<'static>, context: ViewContext) -> Self {
        let context = Arc::new(context);
        register_helpers(&mut env, &context);
        Self { env, context }
    }

    pub fn context(&self) -> &ViewContext {
        &self.context
    }

    pub fn render(&self, template: &str, vars: &ViewVars) -> Result<String, ViewError> {
        let template = self.env.get_template(template)?;
        Ok(template.render(vars)?)
    }
}

fn register_helpers(env: &mut Environment<'static>, context: &Arc<ViewContext>) {
    let ctx = context.clone();
    env.add_function("base_url", move |path: Option<String>| -> String {
        ctx.url(path.as_deref().unwrap_or(""))
    });

    let ctx = context.clone();
    env.add_function("version", move || -> String { ctx.version.clone() });

    let ctx = context.clone();
    env.add_function(
        "t",
        move |state: &State, source: String, values: Option<Vec<TemplateValue>>| -> String {
            let locale = state
                .lookup("locale")
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_else(|| ctx.translator.default_locale().to_string());
            let values: Vec<String> = values
                .unwrap_or_default()
                .iter()
                .map(|v| v.to_string())
                .collect();
            ctx.translator.translate(&locale, &source, &values)
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn view(templates: &[(&'static str, &'static str)]) -> View {
        let mut env = Environment::new();
        for (name, source) in templates {
            env.add_template(*name, *source).unwrap();
        }
        let translator = Translator::new(
            "en",
            HashMap::from([
                ("en".to_string(), json!({"greet": "Hello {0}, meet {1}"})),
                ("zh-CN".to_string(), json!({"greet": "嗨！{0}. 你见到{1}了吗？"})),
            ]),
        );
        View::with_env(
            env,
            ViewContext {
                base_url: "https://example.com/app/".into(),
                version: "1.2.3".into(),
                translator: Arc::new(translator),
            },
        )
    }

    #[test]
    fn test_helpers() {
        let view = view(&[(
            "page.txt",
            "{{ base_url() }}|{{ base_url('articles/1') }}|{{ version() }}|{{ t('greet', [name, 'B']) }}",
        )]);

        let mut vars = ViewVars::new();
        vars.assign("name", "A").unwrap();
        let out = view.render("page.txt", &vars).unwrap();
        assert_eq!(
            out,
            "https://example.com/app/|https://example.com/app/articles/1|1.2.3|Hello A, meet B"
        );

        vars.assign("locale", "zh-CN").unwrap();
        let out = view.render("page.txt", &vars).unwrap();
        assert!(out.ends_with("嗨！A. 你见到B了吗？"));
    }

    #[test]
    fn test_autoescape() {
        let view = view(&[("x.html", "<p>{{ body }}</p>")]);
        let mut vars = ViewVars::new();
        vars.assign("body", "<script>").unwrap();
        assert_eq!(view.render("x.html", &vars).unwrap(), "<p>&lt;script&gt;</p>");
    }

    #[test]
    fn test_missing_template() {
        let view = view(&[]);
        assert!(matches!(
            view.render("nope.html", &ViewVars::new()),
            Err(ViewError::Template(_))
        ));
    }

    #[test]
    fn test_url_join() {
        let ctx = ViewContext {
            base_url: "/".into(),
            version: String::new(),
            translator: Arc::new(Translator::default()),
        };
        assert_eq!(ctx.url(""), "/");
        assert_eq!(ctx.url("/articles"), "/articles");
    }
}
