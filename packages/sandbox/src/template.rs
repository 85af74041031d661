// ABOUTME: Code template resolution and rendering
// ABOUTME: Substitutes the single {{ question }} placeholder with caller-supplied code

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{Result, SandboxError};

/// Name of the built-in passthrough template
pub const DEFAULT_TEMPLATE: &str = "default";

const DEFAULT_TEMPLATE_SOURCE: &str = include_str!("../templates/default.tmpl");

/// Resolves template names to source text and renders code into them.
///
/// The built-in `default` template is embedded; additional templates are
/// loaded as `<dir>/<name>.tmpl`. An on-disk `default.tmpl` overrides the
/// embedded one.
pub struct TemplateStore {
    dir: Option<PathBuf>,
}

impl TemplateStore {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Render the named template with the caller's code.
    pub fn render(&self, name: &str, code: &str) -> Result<String> {
        let source = self.load(name)?;
        Ok(substitute(&source, code))
    }

    fn load(&self, name: &str) -> Result<String> {
        // Template names are bare names, never paths
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(SandboxError::TemplateNotFound(name.to_string()));
        }

        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{}.tmpl", name));
            if path.is_file() {
                debug!("Loading template {} from {}", name, path.display());
                return Ok(fs::read_to_string(path)?);
            }
        }

        if name == DEFAULT_TEMPLATE {
            return Ok(DEFAULT_TEMPLATE_SOURCE.to_string());
        }

        Err(SandboxError::TemplateNotFound(name.to_string()))
    }
}

/// Replace the single substitution point, spaced or tight.
fn substitute(template: &str, code: &str) -> String {
    template
        .replace("{{ question }}", code)
        .replace("{{question}}", code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_template_is_passthrough() {
        let store = TemplateStore::new(None);
        let rendered = store.render(DEFAULT_TEMPLATE, "print('hi')").unwrap();
        assert_eq!(rendered, "print('hi')\n");
    }

    #[test]
    fn test_unknown_template_errors() {
        let store = TemplateStore::new(None);
        let err = store.render("nope", "print('hi')").unwrap_err();
        assert!(matches!(err, SandboxError::TemplateNotFound(_)));
    }

    #[test]
    fn test_path_like_names_rejected() {
        let store = TemplateStore::new(Some(PathBuf::from("/tmp")));
        for name in ["../default", "a/b", "a\\b", ""] {
            let err = store.render(name, "code").unwrap_err();
            assert!(matches!(err, SandboxError::TemplateNotFound(_)));
        }
    }

    #[test]
    fn test_on_disk_template() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("wrap.tmpl")).unwrap();
        writeln!(file, "import sys\n{{{{ question }}}}\nsys.exit(0)").unwrap();

        let store = TemplateStore::new(Some(dir.path().to_path_buf()));
        let rendered = store.render("wrap", "print('x')").unwrap();
        assert_eq!(rendered, "import sys\nprint('x')\nsys.exit(0)\n");
    }

    #[test]
    fn test_tight_placeholder_also_substituted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tight.tmpl"), "{{question}}").unwrap();

        let store = TemplateStore::new(Some(dir.path().to_path_buf()));
        assert_eq!(store.render("tight", "1 + 1").unwrap(), "1 + 1");
    }
}
