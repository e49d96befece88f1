use derive_more::Display;
use serde::Serialize;
use std::path::Path;

/// The four folders documents are grouped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    #[display("core")]
    Core,
    #[display("systemPatterns")]
    SystemPatterns,
    #[display("techContext")]
    TechContext,
    #[display("progress")]
    Progress,
}
impl Category {
    pub const ALL: [Category; 4] = [Self::Core, Self::SystemPatterns, Self::TechContext, Self::Progress];

    /// Folder name, relative to the memory bank root.
    pub fn folder(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::SystemPatterns => "systemPatterns",
            Self::TechContext => "techContext",
            Self::Progress => "progress",
        }
    }
}

/// One of the fixed documents making up a memory bank.
///
/// The order of declaration is the order documents are loaded and listed in.
/// Paths are part of the on-disk format and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentType {
    #[display("project brief")]
    ProjectBrief,
    #[display("product context")]
    ProductContext,
    #[display("active context")]
    ActiveContext,
    #[display("architecture")]
    Architecture,
    #[display("design patterns")]
    DesignPatterns,
    #[display("conventions")]
    Conventions,
    #[display("tech stack")]
    TechStack,
    #[display("dependencies")]
    Dependencies,
    #[display("environment")]
    Environment,
    #[display("milestones")]
    Milestones,
    #[display("backlog")]
    Backlog,
    #[display("known issues")]
    KnownIssues,
    // Legacy root-level files, kept for banks created before the folders existed.
    #[display("system patterns")]
    SystemPatterns,
    #[display("tech context")]
    TechContext,
    #[display("progress")]
    Progress,
}

impl DocumentType {
    pub const ALL: [DocumentType; 15] = [
        Self::ProjectBrief,
        Self::ProductContext,
        Self::ActiveContext,
        Self::Architecture,
        Self::DesignPatterns,
        Self::Conventions,
        Self::TechStack,
        Self::Dependencies,
        Self::Environment,
        Self::Milestones,
        Self::Backlog,
        Self::KnownIssues,
        Self::SystemPatterns,
        Self::TechContext,
        Self::Progress,
    ];

    /// Canonical path relative to the memory bank root, always `/`-separated.
    pub fn relative_path(self) -> &'static str {
        match self {
            Self::ProjectBrief => "core/projectbrief.md",
            Self::ProductContext => "core/productContext.md",
            Self::ActiveContext => "core/activeContext.md",
            Self::Architecture => "systemPatterns/architecture.md",
            Self::DesignPatterns => "systemPatterns/patterns.md",
            Self::Conventions => "systemPatterns/conventions.md",
            Self::TechStack => "techContext/stack.md",
            Self::Dependencies => "techContext/dependencies.md",
            Self::Environment => "techContext/environment.md",
            Self::Milestones => "progress/milestones.md",
            Self::Backlog => "progress/backlog.md",
            Self::KnownIssues => "progress/issues.md",
            Self::SystemPatterns => "systemPatterns.md",
            Self::TechContext => "techContext.md",
            Self::Progress => "progress.md",
        }
    }

    /// `None` for the legacy root-level documents.
    pub fn category(self) -> Option<Category> {
        match self {
            Self::ProjectBrief | Self::ProductContext | Self::ActiveContext => Some(Category::Core),
            Self::Architecture | Self::DesignPatterns | Self::Conventions => Some(Category::SystemPatterns),
            Self::TechStack | Self::Dependencies | Self::Environment => Some(Category::TechContext),
            Self::Milestones | Self::Backlog | Self::KnownIssues => Some(Category::Progress),
            Self::SystemPatterns | Self::TechContext | Self::Progress => None,
        }
    }

    /// Human-readable heading, e.g. `Project Brief`.
    pub fn title(self) -> &'static str {
        match self {
            Self::ProjectBrief => "Project Brief",
            Self::ProductContext => "Product Context",
            Self::ActiveContext => "Active Context",
            Self::Architecture => "Architecture",
            Self::DesignPatterns => "Design Patterns",
            Self::Conventions => "Conventions",
            Self::TechStack => "Tech Stack",
            Self::Dependencies => "Dependencies",
            Self::Environment => "Environment",
            Self::Milestones => "Milestones",
            Self::Backlog => "Backlog",
            Self::KnownIssues => "Known Issues",
            Self::SystemPatterns => "System Patterns",
            Self::TechContext => "Tech Context",
            Self::Progress => "Progress",
        }
    }

    /// Reverse lookup from a root-relative path.
    pub fn from_relative_path(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        Self::ALL.into_iter().find(|document| Path::new(document.relative_path()) == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[test]
    fn paths_are_unique() {
        let paths: HashSet<_> = DocumentType::ALL.iter().map(|d| d.relative_path()).collect();
        assert_eq!(paths.len(), DocumentType::ALL.len());
    }

    #[test]
    fn all_is_in_declaration_order() {
        let mut sorted = DocumentType::ALL;
        sorted.sort();
        assert_eq!(sorted, DocumentType::ALL);
    }

    #[test]
    fn categorized_documents_live_in_their_folder() {
        for document in DocumentType::ALL {
            let path = Path::new(document.relative_path());
            match document.category() {
                Some(category) => assert_eq!(path.parent(), Some(Path::new(category.folder()))),
                None => assert_eq!(path.parent(), Some(Path::new(""))),
            }
        }
    }

    #[rstest]
    #[case(DocumentType::ProjectBrief, "core/projectbrief.md")]
    #[case(DocumentType::DesignPatterns, "systemPatterns/patterns.md")]
    #[case(DocumentType::TechStack, "techContext/stack.md")]
    #[case(DocumentType::KnownIssues, "progress/issues.md")]
    #[case(DocumentType::Progress, "progress.md")]
    fn on_disk_layout(#[case] document: DocumentType, #[case] path: &str) {
        assert_eq!(document.relative_path(), path);
        assert_eq!(DocumentType::from_relative_path(path), Some(document));
    }

    #[test]
    fn unknown_paths_have_no_document() {
        assert_eq!(DocumentType::from_relative_path("core/notes.md"), None);
        assert_eq!(DocumentType::from_relative_path("projectbrief.md"), None);
    }
}
