//! Test harness for isolated provisioning and conversion runs.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use linguaforge::config::Settings;
use linguaforge::conversion::{ConversionRunner, ConverterSettings};
use linguaforge::db::{Database, ProjectStore};
use linguaforge::provision::ProvisioningOrchestrator;

/// Writes the `-xliff` target and prints a progress line.
pub const CONVERTER_OK: &str = r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-xliff" ]; then out="$2"; fi
  shift
done
echo "Converting to $out"
printf '<xliff version="2.1"/>' > "$out""#;

pub const CONVERTER_MISSING_SRC_LANG: &str = r#"echo "Missing -srcLang parameter" >&2
exit 1"#;

pub const CONVERTER_CRASH: &str = r#"echo "Exception in thread main java.lang.NullPointerException" >&2
exit 2"#;

pub const CONVERTER_SLOW: &str = r#"echo "started"
sleep 30"#;

pub const VALIDATOR_OK: &str = r#"echo "XLIFF file is valid""#;

/// Test harness providing an isolated app folder, store and orchestrator.
pub struct TestHarness {
    temp_dir: TempDir,
    pub settings: Settings,
    pub staging_dir: PathBuf,
    pub bin_dir: PathBuf,
    pub store: ProjectStore,
}

impl TestHarness {
    /// Creates a harness backed by a database file inside the app folder.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let settings = Settings::with_app_folder(temp_dir.path().join("app"));
        let staging_dir = temp_dir.path().join("staging");
        let bin_dir = temp_dir.path().join("bin");
        std::fs::create_dir_all(&staging_dir).expect("Failed to create staging dir");
        std::fs::create_dir_all(&bin_dir).expect("Failed to create bin dir");

        let db = Database::open(&settings.database_path()).expect("Failed to open database");

        Self {
            temp_dir,
            settings,
            staging_dir,
            bin_dir,
            store: ProjectStore::new(db),
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.settings.projects_dir()
    }

    pub fn orchestrator(&self) -> ProvisioningOrchestrator {
        ProvisioningOrchestrator::from_settings(self.store.clone(), &self.settings)
    }

    /// Writes a file into the staging folder.
    pub fn stage(&self, filename: &str, content: &[u8]) -> PathBuf {
        let path = self.staging_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write staged file");
        path
    }

    /// Lists every path under the projects folder, relative to it.
    pub fn project_tree(&self) -> Vec<String> {
        let root = self.projects_dir();
        let mut entries = Vec::new();
        collect(&root, &root, &mut entries);
        entries.sort();
        entries
    }

    pub async fn count(&self, table: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        self.store
            .database()
            .with_conn(move |conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
            .await
            .expect("count query failed")
    }

    /// Writes an executable shell script into the harness bin folder.
    #[cfg(unix)]
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.bin_dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to chmod script");
        path
    }

    #[cfg(unix)]
    pub fn runner(&self, converter_body: &str, validator_body: Option<&str>) -> ConversionRunner {
        let converter_program = self.script("convert.sh", converter_body);
        let validator_program = validator_body.map(|body| self.script("xliffchecker.sh", body));
        ConversionRunner::new(ConverterSettings {
            converter_program,
            validate_output: validator_program.is_some(),
            validator_program,
            catalog: None,
        })
    }
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
        if path.is_dir() {
            collect(root, &path, out);
        }
    }
}
