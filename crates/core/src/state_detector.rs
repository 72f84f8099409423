//! Pure analysis from filesystem state to [`ProjectAnalysis`]. Never mutates.

use std::path::Path;
use std::time::Instant;

use gitup_config::SecurityLevel;
use serde::{Deserialize, Serialize};

use crate::vcs::VcsAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectLifecycleState {
    VirginDirectory,
    FreshRepo,
    ExperiencedRepo,
    HostedRepo,
    MatureRepo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupComplexity {
    Minimal,
    Standard,
    Migration,
    EnterpriseSetup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectAnalysis {
    pub state: ProjectLifecycleState,
    pub risk_tier: RiskTier,
    pub setup_complexity: SetupComplexity,
    pub has_vcs: bool,
    pub has_ignore_file: bool,
    pub has_hosted_remote: bool,
    pub has_ci_workflows: bool,
    pub commit_count: u64,
    pub days_since_creation: u64,
    pub file_count: usize,
    pub potential_secrets: usize,
    pub sensitive_files: usize,
    pub large_files: usize,
    pub recommended_security_level: SecurityLevel,
    pub recommended_templates: Vec<String>,
    pub setup_warnings: Vec<String>,
    pub analysis_duration_ms: u64,
}

const SKIP_DIRS: &[&str] = &[
    ".git", ".gitup", "node_modules", ".venv", "venv", "__pycache__", ".pytest_cache",
    ".mypy_cache", "build", "dist", "target", ".gradle", ".idea",
];

const LARGE_FILE_BYTES: u64 = 10 * 1024 * 1024;

pub fn analyze(root: &Path, vcs: &dyn VcsAdapter) -> ProjectAnalysis {
    let start = Instant::now();

    let has_vcs = vcs.is_repository(root);
    let has_ignore_file = root.join(".gitignore").exists();
    let has_hosted_remote = has_vcs && vcs.has_hosted_remote(root);
    let has_ci_workflows = has_vcs && vcs.has_ci_workflows(root);
    let commit_count = if has_vcs { vcs.commit_count(root).unwrap_or(0) } else { 0 };
    let days_since_creation = if has_vcs {
        vcs.first_commit_unix_time(root)
            .map(|ts| days_since(ts))
            .unwrap_or(0)
    } else {
        0
    };

    let (file_count, potential_secrets, sensitive_files, large_files) = scan_files(root);

    let state = classify_state(has_vcs, has_ignore_file, has_hosted_remote, has_ci_workflows);
    let risk_tier = assess_risk_tier(
        commit_count,
        days_since_creation,
        potential_secrets,
        sensitive_files,
        large_files,
    );
    let setup_complexity = determine_setup_complexity(state, risk_tier, commit_count);
    let recommended_security_level = match risk_tier {
        RiskTier::High => SecurityLevel::Strict,
        RiskTier::Medium => SecurityLevel::Moderate,
        RiskTier::Low => SecurityLevel::Relaxed,
    };
    let recommended_templates = recommend_templates(root);
    let setup_warnings = generate_warnings(risk_tier, potential_secrets, sensitive_files, large_files);

    ProjectAnalysis {
        state,
        risk_tier,
        setup_complexity,
        has_vcs,
        has_ignore_file,
        has_hosted_remote,
        has_ci_workflows,
        commit_count,
        days_since_creation,
        file_count,
        potential_secrets,
        sensitive_files,
        large_files,
        recommended_security_level,
        recommended_templates,
        setup_warnings,
        analysis_duration_ms: start.elapsed().as_millis() as u64,
    }
}

fn days_since(unix_time: i64) -> u64 {
    let now = chrono::Utc::now().timestamp();
    ((now - unix_time).max(0) / 86_400) as u64
}

fn classify_state(
    has_vcs: bool,
    has_ignore: bool,
    has_hosted_remote: bool,
    has_ci: bool,
) -> ProjectLifecycleState {
    if !has_vcs {
        return ProjectLifecycleState::VirginDirectory;
    }
    if has_ci {
        return ProjectLifecycleState::MatureRepo;
    }
    if has_hosted_remote {
        return ProjectLifecycleState::HostedRepo;
    }
    if has_ignore {
        return ProjectLifecycleState::ExperiencedRepo;
    }
    ProjectLifecycleState::FreshRepo
}

fn assess_risk_tier(
    commit_count: u64,
    days_since_creation: u64,
    potential_secrets: usize,
    sensitive_files: usize,
    large_files: usize,
) -> RiskTier {
    let mut score = 0i64;
    if commit_count > 100 {
        score += 3;
    } else if commit_count > 20 {
        score += 2;
    } else if commit_count > 5 {
        score += 1;
    }
    if days_since_creation > 365 {
        score += 2;
    } else if days_since_creation > 90 {
        score += 1;
    }
    score += 2 * potential_secrets as i64;
    score += sensitive_files as i64;
    score += large_files as i64;

    if score >= 8 {
        RiskTier::High
    } else if score >= 3 {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

fn determine_setup_complexity(
    state: ProjectLifecycleState,
    risk_tier: RiskTier,
    commit_count: u64,
) -> SetupComplexity {
    if state == ProjectLifecycleState::VirginDirectory {
        return SetupComplexity::Minimal;
    }
    if risk_tier == RiskTier::High || commit_count > 50 {
        return SetupComplexity::EnterpriseSetup;
    }
    if risk_tier == RiskTier::Medium || commit_count > 10 {
        return SetupComplexity::Migration;
    }
    SetupComplexity::Standard
}

fn recommend_templates(root: &Path) -> Vec<String> {
    const WEB_KEYWORDS: &[&str] = &["flask", "django", "fastapi", "express", "react", "next"];

    if root.join("package.json").exists() {
        let content = std::fs::read_to_string(root.join("package.json")).unwrap_or_default();
        if root.join("public").is_dir() && content.to_lowercase().contains("react") {
            return vec!["react-app".to_string()];
        }
        return vec!["node-web".to_string()];
    }
    if root.join("requirements.txt").exists()
        || root.join("setup.py").exists()
        || root.join("pyproject.toml").exists()
    {
        let manifest = ["requirements.txt", "setup.py", "pyproject.toml"]
            .iter()
            .filter_map(|f| std::fs::read_to_string(root.join(f)).ok())
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase();
        if WEB_KEYWORDS.iter().any(|kw| manifest.contains(kw)) {
            return vec!["python-web".to_string()];
        }
        if root.join("notebooks").is_dir() || manifest.contains("pandas") || manifest.contains("numpy") {
            return vec!["python-data".to_string()];
        }
        return vec!["python-cli".to_string()];
    }
    if root.join("Cargo.toml").exists() {
        return vec!["rust-cli".to_string()];
    }
    if root.join("go.mod").exists() {
        return vec!["go-cli".to_string()];
    }
    if root.join("pom.xml").exists() {
        return vec!["java-web".to_string()];
    }
    if root.join("README.md").exists() {
        return vec!["docs".to_string()];
    }
    vec!["generic".to_string()]
}

fn generate_warnings(
    risk_tier: RiskTier,
    potential_secrets: usize,
    sensitive_files: usize,
    large_files: usize,
) -> Vec<String> {
    let mut warnings = Vec::new();
    if risk_tier > RiskTier::Low {
        warnings.push(format!("project risk tier is {risk_tier:?}; review recommended before committing"));
    }
    if potential_secrets > 0 {
        warnings.push(format!("{potential_secrets} file(s) look like potential secrets"));
    }
    if sensitive_files > 0 {
        warnings.push(format!("{sensitive_files} sensitive configuration file(s) found"));
    }
    if large_files > 0 {
        warnings.push(format!("{large_files} file(s) exceed the large-file threshold"));
    }
    warnings
}

/// Walks the tree once, pruning vendored directories, and tallies the counts the
/// risk-tier formula needs. This is a cheap pre-pass distinct from the full risk
/// scan: it only inspects names/sizes, never content.
fn scan_files(root: &Path) -> (usize, usize, usize, usize) {
    let mut file_count = 0usize;
    let mut potential_secrets = 0usize;
    let mut sensitive_files = 0usize;
    let mut large_files = 0usize;

    for entry in walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            e.file_name()
                .to_str()
                .map(|name| !SKIP_DIRS.contains(&name))
                .unwrap_or(true)
        })
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        file_count += 1;
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.contains("secret") || name.ends_with(".env") || name.ends_with(".key") || name.ends_with(".pem") {
            potential_secrets += 1;
        } else if name.contains("config") && (name.ends_with(".json") || name.ends_with(".yaml") || name.ends_with(".yml")) {
            sensitive_files += 1;
        }
        if let Ok(meta) = entry.metadata() {
            if meta.len() > LARGE_FILE_BYTES {
                large_files += 1;
            }
        }
    }
    (file_count, potential_secrets, sensitive_files, large_files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::GitAdapter;

    #[test]
    fn virgin_directory_is_relaxed() {
        let dir = tempfile::tempdir().unwrap();
        let analysis = analyze(dir.path(), &GitAdapter);
        assert_eq!(analysis.state, ProjectLifecycleState::VirginDirectory);
        assert_eq!(analysis.recommended_security_level, SecurityLevel::Relaxed);
        assert_eq!(analysis.setup_complexity, SetupComplexity::Minimal);
    }

    #[test]
    fn risk_score_thresholds() {
        assert_eq!(assess_risk_tier(0, 0, 0, 0, 0), RiskTier::Low);
        assert_eq!(assess_risk_tier(10, 0, 1, 0, 0), RiskTier::Medium);
        assert_eq!(assess_risk_tier(150, 400, 2, 2, 2), RiskTier::High);
    }

    #[test]
    fn secret_looking_file_counts_as_potential_secret() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "API_KEY=x").unwrap();
        let (_, secrets, _, _) = scan_files(dir.path());
        assert_eq!(secrets, 1);
    }
}
