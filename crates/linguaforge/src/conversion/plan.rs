//! Turns ingested processable files into conversion tasks.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::records::{
    FileRole, LanguagePair, NewArtifact, NewJob, ProjectBundle, ProjectFileBundle, WorkStatus,
    XLIFF_ARTIFACT, XLIFF_CONVERSION_JOB,
};
use crate::sanitize::stored_path;
use crate::storage::scaffold::TRANSLATIONS_DIR;
use crate::storage::IngestedAsset;

use super::command::XliffVersion;

fn default_true() -> bool {
    true
}

/// Converter flags shared by every task of a provisioning request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOptions {
    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub xliff_version: Option<XliffVersion>,
    #[serde(default = "default_true")]
    pub paragraph: bool,
    #[serde(default = "default_true")]
    pub embed: bool,
    /// Explicit `-type` value; the converter detects the format when absent.
    #[serde(default)]
    pub format: Option<String>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            xliff_version: None,
            paragraph: true,
            embed: true,
            format: None,
        }
    }
}

/// One source file converted for one language pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionTask {
    /// Same as `artifact_id`.
    pub task_id: Uuid,
    pub draft_id: String,
    pub project_id: Uuid,
    pub file_id: Uuid,
    pub artifact_id: Uuid,
    pub job_type: String,
    pub source_lang: String,
    pub target_lang: String,
    pub source_path: PathBuf,
    pub xliff_rel_path: String,
    pub xliff_abs_path: PathBuf,
    pub xliff_version: XliffVersion,
    pub paragraph: bool,
    pub embed: bool,
    pub format: Option<String>,
}

impl ConversionTask {
    pub fn language_pair(&self) -> LanguagePair {
        LanguagePair::new(self.source_lang.clone(), self.target_lang.clone())
    }

    pub fn new_artifact(&self) -> NewArtifact {
        NewArtifact {
            artifact_id: self.artifact_id,
            project_id: self.project_id,
            file_id: self.file_id,
            artifact_type: XLIFF_ARTIFACT.to_string(),
            source_lang: Some(self.source_lang.clone()),
            target_lang: Some(self.target_lang.clone()),
            rel_path: Some(self.xliff_rel_path.clone()),
            status: WorkStatus::Pending,
        }
    }

    pub fn new_job(&self) -> NewJob {
        NewJob {
            artifact_id: self.artifact_id,
            job_type: self.job_type.clone(),
            project_id: self.project_id,
            status: WorkStatus::Pending,
        }
    }
}

/// Stable artifact id for a file converted into a pair.
pub fn artifact_id_for(file_id: Uuid, pair: &LanguagePair) -> Uuid {
    let name = format!("{}\u{1f}{}", pair.source_lang, pair.target_lang);
    Uuid::new_v5(&file_id, name.as_bytes())
}

/// Builds one task per processable asset and requested pair.
///
/// Pairs missing from the bundle are skipped with a warning, duplicates are
/// planned once. Output lands in `Translations/{src}_{tgt}/{stem}.xlf`; when
/// two processable files share a stem the extension is kept in the name.
pub fn plan_conversions(
    bundle: &ProjectBundle,
    project_dir: &Path,
    assets: &[IngestedAsset],
    pairs: &[LanguagePair],
    options: &ConversionOptions,
) -> Vec<ConversionTask> {
    let usable = usable_pairs(bundle, pairs);

    let processable: Vec<&IngestedAsset> = assets
        .iter()
        .filter(|a| a.role == FileRole::Processable)
        .collect();
    let stems = StemCounts::new(processable.iter().map(|a| a.filename.as_str()));

    let mut builder = TaskBuilder::new(bundle, project_dir, options);
    for asset in processable {
        let output_name = stems.output_name(&asset.filename);
        for pair in &usable {
            builder.push(
                asset.file_id,
                &asset.draft_id,
                asset.stored_abs_path.clone(),
                pair,
                &output_name,
                None,
            );
        }
    }
    builder.finish()
}

/// Rebuilds the plan of a stored project from its bundle.
///
/// Every processable file is planned for its own pairs, or for the project
/// pairs when it has none. An artifact that already records a path keeps
/// it. `only` restricts the plan to the listed files. Draft ids are the
/// file ids.
pub fn plan_for_bundle(
    bundle: &ProjectBundle,
    project_dir: &Path,
    only: Option<&[Uuid]>,
    options: &ConversionOptions,
) -> Vec<ConversionTask> {
    let processable: Vec<&ProjectFileBundle> = bundle
        .files
        .iter()
        .filter(|f| f.link.role == FileRole::Processable)
        .collect();
    // Stem collisions are judged against every processable file, not only
    // the selected ones, so names stay stable across partial rebuilds.
    let stems = StemCounts::new(processable.iter().map(|f| f.link.filename.as_str()));

    let mut builder = TaskBuilder::new(bundle, project_dir, options);
    for file in &processable {
        builder.reserve_existing(file);
    }

    for file in &processable {
        let file_id = file.info.file_id;
        if only.is_some_and(|ids| !ids.contains(&file_id)) {
            continue;
        }

        let requested = if file.language_pairs.is_empty() {
            bundle.language_pairs.as_slice()
        } else {
            file.language_pairs.as_slice()
        };
        let output_name = stems.output_name(&file.link.filename);
        let source_path = stored_path(project_dir, &file.link.stored_at);
        let draft_id = file_id.to_string();

        for pair in usable_pairs(bundle, requested) {
            let existing = file
                .artifacts
                .iter()
                .find(|a| a.artifact_id == artifact_id_for(file_id, &pair))
                .and_then(|a| a.rel_path.clone());
            builder.push(
                file_id,
                &draft_id,
                source_path.clone(),
                &pair,
                &output_name,
                existing,
            );
        }
    }
    builder.finish()
}

/// Normalized, de-duplicated pairs that belong to the project.
fn usable_pairs(bundle: &ProjectBundle, pairs: &[LanguagePair]) -> Vec<LanguagePair> {
    let mut seen = BTreeSet::new();
    LanguagePair::normalize_all(pairs)
        .into_iter()
        .filter(|pair| {
            if !bundle.has_language_pair(pair) {
                tracing::warn!(pair = %pair, "Skipping language pair not in project");
                return false;
            }
            seen.insert(pair.clone())
        })
        .collect()
}

struct StemCounts(HashMap<String, usize>);

impl StemCounts {
    fn new<'a>(filenames: impl Iterator<Item = &'a str>) -> Self {
        let mut counts = HashMap::new();
        for filename in filenames {
            *counts.entry(file_stem(filename).to_string()).or_default() += 1;
        }
        Self(counts)
    }

    fn output_name(&self, filename: &str) -> String {
        let stem = file_stem(filename);
        if self.0.get(stem).copied().unwrap_or(0) > 1 {
            format!("{filename}.xlf")
        } else {
            format!("{stem}.xlf")
        }
    }
}

fn file_stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
}

/// Collects tasks and refuses to plan two artifacts onto one output path.
struct TaskBuilder<'a> {
    bundle: &'a ProjectBundle,
    project_dir: &'a Path,
    options: &'a ConversionOptions,
    version: XliffVersion,
    /// Output path to the artifact that owns it.
    taken: HashMap<String, Uuid>,
    tasks: Vec<ConversionTask>,
}

impl<'a> TaskBuilder<'a> {
    fn new(bundle: &'a ProjectBundle, project_dir: &'a Path, options: &'a ConversionOptions) -> Self {
        Self {
            bundle,
            project_dir,
            options,
            version: options.xliff_version.unwrap_or_default(),
            taken: HashMap::new(),
            tasks: Vec::new(),
        }
    }

    fn reserve_existing(&mut self, file: &ProjectFileBundle) {
        for artifact in &file.artifacts {
            if let Some(ref rel_path) = artifact.rel_path {
                self.taken.insert(rel_path.clone(), artifact.artifact_id);
            }
        }
    }

    fn push(
        &mut self,
        file_id: Uuid,
        draft_id: &str,
        source_path: PathBuf,
        pair: &LanguagePair,
        output_name: &str,
        existing_rel_path: Option<String>,
    ) {
        let artifact_id = artifact_id_for(file_id, pair);
        let xliff_rel_path = existing_rel_path.unwrap_or_else(|| {
            format!("{TRANSLATIONS_DIR}/{}/{output_name}", pair.dir_name())
        });

        match self.taken.get(&xliff_rel_path) {
            Some(owner) if *owner != artifact_id => {
                tracing::warn!(
                    path = %xliff_rel_path,
                    pair = %pair,
                    "Skipping conversion whose output path is already planned"
                );
                return;
            }
            _ => {
                self.taken.insert(xliff_rel_path.clone(), artifact_id);
            }
        }

        self.tasks.push(ConversionTask {
            task_id: artifact_id,
            draft_id: draft_id.to_string(),
            project_id: self.bundle.project.project_id,
            file_id,
            artifact_id,
            job_type: XLIFF_CONVERSION_JOB.to_string(),
            source_lang: pair.source_lang.clone(),
            target_lang: pair.target_lang.clone(),
            source_path,
            xliff_abs_path: stored_path(self.project_dir, &xliff_rel_path),
            xliff_rel_path,
            xliff_version: self.version,
            paragraph: self.options.paragraph,
            embed: self.options.embed,
            format: self.options.format.clone(),
        });
    }

    fn finish(self) -> Vec<ConversionTask> {
        self.tasks
    }
}

/// Distinct `{src}_{tgt}` folder names, sorted.
pub fn pair_directories(pairs: &[LanguagePair]) -> Vec<String> {
    pairs
        .iter()
        .map(LanguagePair::dir_name)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
