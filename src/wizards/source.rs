//! Source-type descriptors for the generic ingestion wizard.
//!
//! One wizard implementation serves every knowledge-source type; the
//! per-type differences (validation rule, accepted file types, caps) live
//! in this descriptor table.

use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use super::{KnowledgeSource, WizardError};
use crate::chatbots::ingestion::{MAX_AUDIO_BYTES, MAX_TRAINING_FILES};

/// The knowledge-source types an ingestion wizard can collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Files,
    Links,
    Text,
    Audio,
    Youtube,
    CustomWebsite,
    Shopify,
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "files" => Ok(SourceKind::Files),
            "links" => Ok(SourceKind::Links),
            "text" => Ok(SourceKind::Text),
            "audio" => Ok(SourceKind::Audio),
            "youtube" => Ok(SourceKind::Youtube),
            "custom-website" | "custom_website" => Ok(SourceKind::CustomWebsite),
            "shopify" => Ok(SourceKind::Shopify),
            other => Err(format!("unknown source type '{}'", other)),
        }
    }
}

/// Static description of one source type's rules.
#[derive(Debug)]
pub struct SourceDescriptor {
    pub kind: SourceKind,
    pub label: &'static str,
    /// Accepted file extensions; empty when the type takes no files
    pub accepted_extensions: &'static [&'static str],
    /// Maximum collected items per submission (0 = collects nothing)
    pub max_items: usize,
    /// Per-file size cap, when one applies client-side
    pub max_bytes: Option<u64>,
}

static DESCRIPTORS: &[SourceDescriptor] = &[
    SourceDescriptor {
        kind: SourceKind::Files,
        label: "document",
        accepted_extensions: &["pdf", "txt", "md", "docx", "csv"],
        max_items: MAX_TRAINING_FILES,
        max_bytes: None,
    },
    SourceDescriptor {
        kind: SourceKind::Links,
        label: "link",
        accepted_extensions: &[],
        max_items: 25,
        max_bytes: None,
    },
    SourceDescriptor {
        kind: SourceKind::Text,
        label: "text snippet",
        accepted_extensions: &[],
        max_items: 1,
        max_bytes: None,
    },
    SourceDescriptor {
        kind: SourceKind::Audio,
        label: "audio file",
        accepted_extensions: &["mp3", "wav", "m4a", "ogg"],
        max_items: 1,
        max_bytes: Some(MAX_AUDIO_BYTES),
    },
    SourceDescriptor {
        kind: SourceKind::Youtube,
        label: "YouTube link",
        accepted_extensions: &[],
        max_items: 1,
        max_bytes: None,
    },
    SourceDescriptor {
        kind: SourceKind::CustomWebsite,
        label: "website",
        accepted_extensions: &[],
        max_items: 1,
        max_bytes: None,
    },
    SourceDescriptor {
        kind: SourceKind::Shopify,
        label: "Shopify store",
        accepted_extensions: &[],
        max_items: 0,
        max_bytes: None,
    },
];

/// Resolve the descriptor for a source type.
pub fn descriptor_for(kind: SourceKind) -> &'static SourceDescriptor {
    DESCRIPTORS
        .iter()
        .find(|d| d.kind == kind)
        .expect("every source kind has a descriptor")
}

impl SourceDescriptor {
    /// Validate one collected input against this type's rules. Runs before
    /// any network call.
    pub fn validate(&self, source: &KnowledgeSource) -> Result<(), WizardError> {
        match (self.kind, source) {
            (SourceKind::Files | SourceKind::Audio, KnowledgeSource::File(file)) => {
                let extension = file
                    .name
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_ascii_lowercase())
                    .unwrap_or_default();
                if !self.accepted_extensions.is_empty()
                    && !self.accepted_extensions.contains(&extension.as_str())
                {
                    return Err(WizardError::InvalidInput(format!(
                        "'{}' is not an accepted {} type ({})",
                        file.name,
                        self.label,
                        self.accepted_extensions.join(", ")
                    )));
                }
                if let Some(cap) = self.max_bytes
                    && file.size() > cap
                {
                    return Err(WizardError::InvalidInput(format!(
                        "'{}' exceeds the {}MB limit",
                        file.name,
                        cap / (1024 * 1024)
                    )));
                }
                if file.bytes.is_empty() {
                    return Err(WizardError::InvalidInput(format!(
                        "File '{}' is empty",
                        file.name
                    )));
                }
                Ok(())
            }
            (
                SourceKind::Links | SourceKind::Youtube | SourceKind::CustomWebsite,
                KnowledgeSource::Url(raw),
            ) => {
                let url = Url::parse(raw)
                    .map_err(|_| WizardError::InvalidInput("Enter a valid URL".to_string()))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(WizardError::InvalidInput(
                        "Only http and https URLs are supported".to_string(),
                    ));
                }
                Ok(())
            }
            (SourceKind::Text, KnowledgeSource::Text { title, content }) => {
                if title.trim().is_empty() || content.trim().is_empty() {
                    return Err(WizardError::InvalidInput(
                        "Both a title and content are required".to_string(),
                    ));
                }
                Ok(())
            }
            (SourceKind::Shopify, _) => Err(WizardError::InvalidInput(
                "The Shopify wizard collects no inputs".to_string(),
            )),
            _ => Err(WizardError::InvalidInput(format!(
                "This wizard only accepts a {}",
                self.label
            ))),
        }
    }
}
