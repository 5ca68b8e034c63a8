//! Tera template engine wrapper.
//!
//! Provides the built-in templates and optional overrides from a directory.

use std::path::Path;
use std::sync::Arc;

use tera::{Context, Tera};
use tracing::{debug, info};

use crate::error::StackError;

use super::builtin::BUILTIN_TEMPLATES;

/// Template engine for rendering configuration files.
///
/// Wraps Tera and provides a simplified interface for template operations.
#[derive(Clone)]
pub struct TemplateEngine {
    tera: Arc<Tera>,
}

impl TemplateEngine {
    /// Engine with only the built-in templates.
    pub fn builtin() -> Result<Self, StackError> {
        let mut tera = Tera::default();
        Self::add_builtins(&mut tera)?;
        Ok(Self {
            tera: Arc::new(tera),
        })
    }

    /// Load `*.tera` files from `template_dir` recursively.
    ///
    /// A file named like a built-in template (e.g. `nginx/vhost.conf.tera`)
    /// replaces it; built-ins without an override stay available.
    pub fn with_overrides(template_dir: &Path) -> Result<Self, StackError> {
        let pattern = template_dir.join("**/*.tera");
        let pattern_str = pattern.to_string_lossy();

        debug!(pattern = %pattern_str, "Loading templates");

        let mut tera = Tera::new(&pattern_str).map_err(|e| StackError::Template {
            message: format!(
                "Failed to load templates from '{}': {}",
                template_dir.display(),
                e
            ),
        })?;

        let overridden: Vec<String> = tera.get_template_names().map(str::to_string).collect();
        for (name, source) in BUILTIN_TEMPLATES {
            if !overridden.iter().any(|n| n == name) {
                add_raw(&mut tera, name, source)?;
            }
        }

        info!(
            directory = %template_dir.display(),
            count = overridden.len(),
            "Template overrides loaded"
        );

        Ok(Self {
            tera: Arc::new(tera),
        })
    }

    fn add_builtins(tera: &mut Tera) -> Result<(), StackError> {
        for (name, source) in BUILTIN_TEMPLATES {
            add_raw(tera, name, source)?;
        }
        Ok(())
    }

    /// Render a template with the given context.
    ///
    /// # Arguments
    ///
    /// * `template_name` - Name of the template (e.g., "nginx/vhost.conf.tera")
    /// * `context` - JSON value containing template variables
    pub fn render(
        &self,
        template_name: &str,
        context: &serde_json::Value,
    ) -> Result<String, StackError> {
        let tera_context = Context::from_serialize(context).map_err(|e| StackError::Template {
            message: format!("Invalid template context: {}", e),
        })?;

        self.tera
            .render(template_name, &tera_context)
            .map_err(|e| StackError::Template {
                message: format!("Failed to render template '{}': {}", template_name, e),
            })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }
}

fn add_raw(tera: &mut Tera, name: &str, source: &str) -> Result<(), StackError> {
    tera.add_raw_template(name, source)
        .map_err(|e| StackError::Template {
            message: format!("Invalid built-in template '{}': {}", name, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::VHOST_TEMPLATE;
    use std::fs;

    fn vhost_context() -> serde_json::Value {
        serde_json::json!({
            "hostname": "blog.test",
            "document_root": "/var/www/blog",
            "php_version": "8.3",
            "php_socket": "/run/php/php8.3-fpm.sock",
        })
    }

    #[test]
    fn test_builtin_vhost_renders() {
        let engine = TemplateEngine::builtin().unwrap();
        assert!(engine.has_template(VHOST_TEMPLATE));

        let rendered = engine.render(VHOST_TEMPLATE, &vhost_context()).unwrap();
        assert!(rendered.contains("server_name blog.test;"));
        assert!(rendered.contains("root /var/www/blog;"));
        assert!(rendered.contains("fastcgi_pass unix:/run/php/php8.3-fpm.sock;"));
        assert!(rendered.contains("try_files $uri $uri/ /index.php?$query_string;"));
        assert!(rendered.contains("/var/log/nginx/blog.test_error.log"));
        assert!(rendered.starts_with("# php-version: 8.3\n"));
    }

    #[test]
    fn test_override_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nginx")).unwrap();
        fs::write(
            dir.path().join("nginx/vhost.conf.tera"),
            "server { server_name {{ hostname }}; }\n",
        )
        .unwrap();

        let engine = TemplateEngine::with_overrides(dir.path()).unwrap();
        let rendered = engine.render(VHOST_TEMPLATE, &vhost_context()).unwrap();
        assert_eq!(rendered, "server { server_name blog.test; }\n");
    }

    #[test]
    fn test_empty_override_directory_keeps_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let engine = TemplateEngine::with_overrides(dir.path()).unwrap();
        assert!(engine.has_template(VHOST_TEMPLATE));
    }

    #[test]
    fn test_missing_template() {
        let engine = TemplateEngine::builtin().unwrap();
        let result = engine.render("nonexistent.tera", &serde_json::json!({}));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_variable_is_error() {
        let engine = TemplateEngine::builtin().unwrap();
        let result = engine.render(VHOST_TEMPLATE, &serde_json::json!({ "hostname": "a.test" }));
        assert!(matches!(result, Err(StackError::Template { .. })));
    }
}
