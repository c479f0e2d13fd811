//! ES module loading for archive actions.
//!
//! Archives may contain an entry module with relative imports, so they are
//! loaded through the module graph instead of `execute_script`. The loader
//! serves files from the working directory plus one synthetic wrapper
//! module that publishes the entry binding on `globalThis`, covering both
//! export styles the supervisor accepts: a named export from the entry
//! module, or a plain global assigned at module scope.

use std::path::Path;

use deno_core::ModuleLoadOptions;
use deno_core::ModuleLoadReferrer;
use deno_core::ModuleLoadResponse;
use deno_core::ModuleLoader;
use deno_core::ModuleSource;
use deno_core::ModuleSourceCode;
use deno_core::ModuleSpecifier;
use deno_core::ModuleType;
use deno_core::ResolutionKind;
use deno_core::resolve_import;
use deno_error::JsErrorBox;

use crate::materialize::ENTRY_FILE;

/// File name (never written to disk) behind the wrapper module specifier.
const WRAPPER_FILE: &str = "__husk_entry.js";

pub struct ActionEsmLoader {
    wrapper_specifier: ModuleSpecifier,
    wrapper_source: String,
}

impl ActionEsmLoader {
    /// Build a loader rooted at the working directory, wrapping the entry
    /// module so that `globalThis.__huskEntry` ends up holding whatever the
    /// given entry name resolves to.
    pub fn new(workdir: &Path, entry_name: &str) -> Result<Self, String> {
        let workdir = workdir
            .canonicalize()
            .map_err(|err| format!("invalid working directory: {err}"))?;
        let entry_specifier = ModuleSpecifier::from_file_path(workdir.join(ENTRY_FILE))
            .map_err(|_| "invalid entry module path".to_string())?;
        let wrapper_specifier = ModuleSpecifier::from_file_path(workdir.join(WRAPPER_FILE))
            .map_err(|_| "invalid entry wrapper path".to_string())?;
        let wrapper_source = wrapper_source(&entry_specifier, entry_name);
        Ok(Self {
            wrapper_specifier,
            wrapper_source,
        })
    }

    pub fn wrapper_specifier(&self) -> &ModuleSpecifier {
        &self.wrapper_specifier
    }

    fn load_source(&self, specifier: &ModuleSpecifier) -> Result<ModuleSource, JsErrorBox> {
        if specifier == &self.wrapper_specifier {
            return Ok(ModuleSource::new(
                ModuleType::JavaScript,
                ModuleSourceCode::String(self.wrapper_source.clone().into()),
                specifier,
                None,
            ));
        }
        let path = specifier
            .to_file_path()
            .map_err(|_| JsErrorBox::generic("Only file:// URLs are supported"))?;
        let text = std::fs::read_to_string(&path).map_err(JsErrorBox::from_err)?;
        Ok(ModuleSource::new(
            ModuleType::JavaScript,
            ModuleSourceCode::String(text.into()),
            specifier,
            None,
        ))
    }
}

impl ModuleLoader for ActionEsmLoader {
    fn resolve(
        &self,
        specifier: &str,
        referrer: &str,
        _kind: ResolutionKind,
    ) -> Result<ModuleSpecifier, JsErrorBox> {
        let resolved = resolve_import(specifier, referrer).map_err(JsErrorBox::from_err)?;
        if resolved.scheme() == "file" {
            return Ok(resolved);
        }
        Err(JsErrorBox::generic(format!(
            "unsupported module scheme: {resolved}"
        )))
    }

    fn load(
        &self,
        module_specifier: &ModuleSpecifier,
        _maybe_referrer: Option<&ModuleLoadReferrer>,
        _options: ModuleLoadOptions,
    ) -> ModuleLoadResponse {
        ModuleLoadResponse::Sync(self.load_source(module_specifier))
    }
}

fn wrapper_source(entry: &ModuleSpecifier, entry_name: &str) -> String {
    let name = js_string_literal(entry_name);
    format!(
        "import * as __huskMain from \"{entry}\";\n\
         const __huskName = {name};\n\
         globalThis.__huskEntry = __huskMain[__huskName] !== undefined\n\
           ? __huskMain[__huskName]\n\
           : globalThis[__huskName];\n"
    )
}

/// JSON-escape a name for embedding in generated script text.
pub(crate) fn js_string_literal(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"main\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapper_embeds_quoted_entry_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = ActionEsmLoader::new(dir.path(), "handler").expect("loader");
        assert!(loader.wrapper_source.contains("const __huskName = \"handler\";"));
        assert!(loader.wrapper_source.contains(ENTRY_FILE));
    }

    #[test]
    fn relative_imports_resolve_inside_the_workdir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = ActionEsmLoader::new(dir.path(), "main").expect("loader");
        let entry = ModuleSpecifier::from_file_path(
            dir.path().canonicalize().expect("canon").join(ENTRY_FILE),
        )
        .expect("specifier");

        let resolved = loader
            .resolve("./lib/util.js", entry.as_str(), ResolutionKind::Import)
            .expect("resolve");
        assert!(resolved.as_str().ends_with("/lib/util.js"));
    }

    #[test]
    fn non_file_schemes_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = ActionEsmLoader::new(dir.path(), "main").expect("loader");
        let err = loader
            .resolve(
                "https://example.com/mod.js",
                "file:///work/main__.js",
                ResolutionKind::Import,
            )
            .expect_err("must fail");
        assert!(err.to_string().contains("unsupported module scheme"));
    }

    #[test]
    fn names_with_quotes_stay_escaped() {
        assert_eq!(js_string_literal("ma\"in"), "\"ma\\\"in\"");
    }
}
