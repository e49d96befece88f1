//! Default content for documents that do not exist yet.

use crate::DocumentType;
use rust_embed::Embed;

/// Supplies the initial content written when a document is missing.
///
/// Any `Fn(DocumentType) -> String` closure is a provider too, which keeps
/// test doubles short:
///
/// ```
/// use membank::{DocumentType, TemplateProvider};
/// let blank = |document: DocumentType| format!("# {}\n", document.title());
/// assert_eq!(blank.template(DocumentType::Backlog), "# Backlog\n");
/// ```
pub trait TemplateProvider: Send + Sync {
    fn template(&self, document: DocumentType) -> String;
}

impl<F> TemplateProvider for F
where
    F: Fn(DocumentType) -> String + Send + Sync,
{
    fn template(&self, document: DocumentType) -> String {
        self(document)
    }
}

/// Templates embedded into the binary at compile time, laid out exactly like
/// a memory bank (`core/projectbrief.md`, `progress.md`, ...).
#[derive(Embed)]
#[folder = "../../assets/templates/"]
pub struct BuiltinTemplates;

impl TemplateProvider for BuiltinTemplates {
    fn template(&self, document: DocumentType) -> String {
        match Self::get(document.relative_path()) {
            Some(file) => String::from_utf8_lossy(&file.data).into_owned(),
            None => {
                tracing::debug!(%document, "No builtin template, using a bare heading");
                format!("# {}\n", document.title())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_document_has_a_builtin_template() {
        for document in DocumentType::ALL {
            assert!(BuiltinTemplates::get(document.relative_path()).is_some(), "{document}");
        }
    }

    #[test]
    fn builtin_templates_start_with_the_title() {
        for document in DocumentType::ALL {
            let template = BuiltinTemplates.template(document);
            assert!(template.starts_with(&format!("# {}", document.title())), "{document}");
        }
    }
}
