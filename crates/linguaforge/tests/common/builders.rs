//! Builders for provisioning requests.

#![allow(dead_code)]

use std::path::Path;

use linguaforge::conversion::ConversionOptions;
use linguaforge::db::records::{FileRole, LanguagePair, ProjectStatus};
use linguaforge::provision::ProvisionRequest;
use linguaforge::storage::AssetDescriptor;

pub struct RequestBuilder {
    request: ProvisionRequest,
}

impl RequestBuilder {
    pub fn new(project_name: &str) -> Self {
        Self {
            request: ProvisionRequest {
                project_name: project_name.to_string(),
                folder_name: None,
                owner_id: "owner-1".to_string(),
                client_id: None,
                project_type: "translation".to_string(),
                status: ProjectStatus::Active,
                notes: None,
                subjects: vec![],
                language_pairs: vec![],
                assets: vec![],
                conversion: ConversionOptions::default(),
            },
        }
    }

    pub fn folder(mut self, folder_name: &str) -> Self {
        self.request.folder_name = Some(folder_name.to_string());
        self
    }

    pub fn owner(mut self, owner_id: &str) -> Self {
        self.request.owner_id = owner_id.to_string();
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.request.subjects.push(subject.to_string());
        self
    }

    pub fn pair(mut self, source: &str, target: &str) -> Self {
        self.request.language_pairs.push(LanguagePair::new(source, target));
        self
    }

    pub fn asset(mut self, draft_id: &str, source_path: &Path, role: FileRole) -> Self {
        let name = source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(draft_id)
            .to_string();
        let extension = source_path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        self.request.assets.push(AssetDescriptor {
            draft_id: draft_id.to_string(),
            source_path: source_path.to_path_buf(),
            name,
            extension,
            role,
        });
        self
    }

    /// Adds an asset with an explicit display name.
    pub fn named_asset(mut self, draft_id: &str, source_path: &Path, name: &str, role: FileRole) -> Self {
        self = self.asset(draft_id, source_path, role);
        if let Some(last) = self.request.assets.last_mut() {
            last.name = name.to_string();
        }
        self
    }

    pub fn build(self) -> ProvisionRequest {
        self.request
    }
}
