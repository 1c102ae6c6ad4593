//! Node.js project detection from `package.json`, lock files, and tool probes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ContextError;
use crate::process::{self, PROBE_TIMEOUT};

/// Framework inferred from the project's dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    NextJs,
    React,
    NestJs,
    Express,
    Vanilla,
    Unknown,
}

impl Framework {
    pub fn display_name(&self) -> &'static str {
        match self {
            Framework::NextJs => "Next.js",
            Framework::React => "React.js",
            Framework::NestJs => "NestJS",
            Framework::Express => "Express.js",
            Framework::Vanilla => "Vanilla Node.js",
            Framework::Unknown => "Unknown framework",
        }
    }
}

/// Package manager used for install commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
}

impl PackageManager {
    /// Lock files in detection order.
    const LOCK_FILES: [(&'static str, PackageManager); 3] = [
        ("pnpm-lock.yaml", PackageManager::Pnpm),
        ("yarn.lock", PackageManager::Yarn),
        ("package-lock.json", PackageManager::Npm),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
        }
    }

    /// `npm install <pkg>` or `<pm> add <pkg>`.
    pub fn install_command(&self, package: &str) -> String {
        match self {
            PackageManager::Npm => format!("npm install {package}"),
            other => format!("{} add {package}", other.as_str()),
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the project the assistant is helping with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectContext {
    pub name: Option<String>,
    pub version: Option<String>,
    pub framework: Framework,
    pub package_manager: PackageManager,
    pub node_version: String,
    pub has_typescript: bool,
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
    pub project_path: PathBuf,
}

impl ProjectContext {
    /// Context used when detection fails.
    pub fn unknown(project_path: impl Into<PathBuf>) -> Self {
        Self {
            name: None,
            version: None,
            framework: Framework::Unknown,
            package_manager: PackageManager::Npm,
            node_version: "unknown".to_string(),
            has_typescript: false,
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
            project_path: project_path.into(),
        }
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.dependencies.contains_key(name) || self.dev_dependencies.contains_key(name)
    }

    /// Multi-line summary shown before the chat starts.
    pub fn summary(&self) -> String {
        format!(
            "Project Context:\n\
             • Framework: {}\n\
             • Package Manager: {}\n\
             • Node Version: {}\n\
             • TypeScript: {}\n\
             • Dependencies: {} production, {} development\n\
             • Project Path: {}",
            self.framework.display_name(),
            self.package_manager,
            self.node_version,
            if self.has_typescript { "Yes" } else { "No" },
            self.dependencies.len(),
            self.dev_dependencies.len(),
            self.project_path.display(),
        )
    }

    /// Structural problems worth warning about.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.node_version == "unknown" {
            issues.push("Could not detect Node.js version".to_string());
        }
        if self.name.is_none() {
            issues.push("package.json is missing a name field".to_string());
        }
        if self.version.is_none() {
            issues.push("package.json is missing a version field".to_string());
        }
        if self.framework == Framework::NestJs && !self.dependencies.contains_key("@nestjs/core")
        {
            issues.push(
                "NestJS framework detected but @nestjs/core is not in dependencies".to_string(),
            );
        }
        if self.has_typescript && !self.has_package("typescript") {
            issues.push("TypeScript detected but typescript is not installed".to_string());
        }
        issues
    }
}

/// Reports installed tool versions.
#[async_trait]
pub trait ToolProbe: Send + Sync {
    /// Trimmed `--version` output, or `None` if the tool is unavailable.
    async fn version(&self, program: &str) -> Option<String>;
}

/// Probes tools by running them.
pub struct SystemProbe;

#[async_trait]
impl ToolProbe for SystemProbe {
    async fn version(&self, program: &str) -> Option<String> {
        match process::run(program, &["--version"], None, PROBE_TIMEOUT).await {
            Ok(output) => Some(output.stdout),
            Err(e) => {
                debug!(program, error = %e, "tool probe failed");
                None
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageJson {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, String>,
}

/// Detect the project rooted at `path`.
pub async fn detect_context(
    path: &Path,
    probe: &dyn ToolProbe,
) -> Result<ProjectContext, ContextError> {
    let package_json_path = path.join("package.json");
    let contents = match tokio::fs::read_to_string(&package_json_path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ContextError::NoPackageJson(path.to_path_buf()));
        }
        Err(e) => return Err(ContextError::Io(e)),
    };
    let package: PackageJson = serde_json::from_str(&contents)?;

    let framework = detect_framework(&package);
    let has_typescript = detect_typescript(&package, path).await;
    let package_manager = detect_package_manager(path, probe).await;
    let node_version = probe
        .version("node")
        .await
        .unwrap_or_else(|| "unknown".to_string());

    debug!(?framework, %package_manager, %node_version, has_typescript, "project detected");

    Ok(ProjectContext {
        name: package.name,
        version: package.version,
        framework,
        package_manager,
        node_version,
        has_typescript,
        dependencies: package.dependencies,
        dev_dependencies: package.dev_dependencies,
        project_path: path.to_path_buf(),
    })
}

fn has_dependency(package: &PackageJson, name: &str) -> bool {
    package.dependencies.contains_key(name) || package.dev_dependencies.contains_key(name)
}

/// Next.js before React since Next projects also depend on React.
fn detect_framework(package: &PackageJson) -> Framework {
    if has_dependency(package, "next") {
        Framework::NextJs
    } else if has_dependency(package, "react") {
        Framework::React
    } else if has_dependency(package, "@nestjs/core") || has_dependency(package, "@nestjs/common")
    {
        Framework::NestJs
    } else if has_dependency(package, "express") {
        Framework::Express
    } else {
        Framework::Vanilla
    }
}

async fn detect_typescript(package: &PackageJson, path: &Path) -> bool {
    if has_dependency(package, "typescript") || has_dependency(package, "@types/node") {
        return true;
    }
    tokio::fs::try_exists(path.join("tsconfig.json"))
        .await
        .unwrap_or(false)
}

async fn detect_package_manager(path: &Path, probe: &dyn ToolProbe) -> PackageManager {
    for (file, manager) in PackageManager::LOCK_FILES {
        if tokio::fs::try_exists(path.join(file)).await.unwrap_or(false) {
            return manager;
        }
    }

    for manager in [PackageManager::Pnpm, PackageManager::Yarn, PackageManager::Npm] {
        if probe.version(manager.as_str()).await.is_some() {
            return manager;
        }
    }

    PackageManager::Npm
}
