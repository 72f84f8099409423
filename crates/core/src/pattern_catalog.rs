//! Declarative pattern tables consumed by the risk detector. Embedded as
//! compiled-in data (not a class hierarchy), per the Design Notes' recommendation
//! that the catalog be versionable, overlay-able data rather than behavior.

use crate::risk::SecurityRiskType;

pub struct PatternEntry {
    pub glob: &'static str,
    pub risk_type: SecurityRiskType,
}

/// One entry per `(glob, category)` pair. Globs are matched with shell-style
/// semantics (`glob::Pattern`) against the project-relative path.
pub fn catalog() -> Vec<PatternEntry> {
    use SecurityRiskType::*;
    let table: &[(&str, SecurityRiskType)] = &[
        // secrets
        ("*.key", SecretFile),
        ("*.pem", SecretFile),
        ("*.p12", SecretFile),
        ("*.pfx", SecretFile),
        ("*.jks", SecretFile),
        ("*.keystore", SecretFile),
        ("*.crt", SecretFile),
        ("secrets.*", SecretFile),
        ("*secret*", SecretFile),
        ("*password*", SecretFile),
        ("*credential*", SecretFile),
        ("*.env", SecretFile),
        (".env*", SecretFile),
        ("config/secrets.*", SecretFile),
        ("auth.*", SecretFile),
        // sensitive configuration
        ("config.json", SensitiveConfig),
        ("settings.json", SensitiveConfig),
        ("database.json", SensitiveConfig),
        ("*.conf", SensitiveConfig),
        ("*.cfg", SensitiveConfig),
        ("*.ini", SensitiveConfig),
        ("*.properties", SensitiveConfig),
        ("web.config", SensitiveConfig),
        ("app.config", SensitiveConfig),
        ("appsettings.json", SensitiveConfig),
        ("connection.json", SensitiveConfig),
        ("datasource.*", SensitiveConfig),
        // large binaries
        ("*.exe", LargeBinary),
        ("*.dll", LargeBinary),
        ("*.so", LargeBinary),
        ("*.dylib", LargeBinary),
        ("*.bin", LargeBinary),
        ("*.iso", LargeBinary),
        ("*.img", LargeBinary),
        ("*.dmg", LargeBinary),
        ("*.zip", LargeBinary),
        ("*.rar", LargeBinary),
        // databases
        ("*.db", DatabaseFile),
        ("*.sqlite", DatabaseFile),
        ("*.sqlite3", DatabaseFile),
        ("*.mdb", DatabaseFile),
        ("*.accdb", DatabaseFile),
        ("*.dump", DatabaseFile),
        ("*.sql", DatabaseFile),
        ("data/*.db", DatabaseFile),
        ("database.*", DatabaseFile),
        // backups
        ("*.backup", BackupFile),
        ("*.bak", BackupFile),
        ("*.old", BackupFile),
        ("*.orig", BackupFile),
        ("*~", BackupFile),
        ("*.swp", BackupFile),
        ("*.swo", BackupFile),
        ("backup/*", BackupFile),
        ("backups/*", BackupFile),
        // logs
        ("*.log", LogFile),
        ("logs/*", LogFile),
        ("log/*", LogFile),
        ("error.log", LogFile),
        ("debug.log", LogFile),
        ("access.log", LogFile),
        ("application.log", LogFile),
        ("audit.log", LogFile),
        // temporary / ide
        ("temp/*", TemporaryFile),
        ("tmp/*", TemporaryFile),
        ("*.tmp", TemporaryFile),
        ("*.temp", TemporaryFile),
        (".DS_Store", TemporaryFile),
        ("Thumbs.db", TemporaryFile),
        ("desktop.ini", TemporaryFile),
        ("*.cache", TemporaryFile),
        (".vscode/settings.json", IdeConfig),
        (".idea/*", IdeConfig),
        ("*.iml", IdeConfig),
        (".eclipse/*", IdeConfig),
        (".settings/*", IdeConfig),
        ("*.sublime-*", IdeConfig),
    ];
    table
        .iter()
        .map(|(glob, risk_type)| PatternEntry {
            glob,
            risk_type: *risk_type,
        })
        .collect()
}

pub struct CredentialPattern {
    pub name: &'static str,
    pub regex: &'static str,
    pub is_api_key: bool,
}

/// Content regexes, applied only to text files under the 1 MiB scan cap. Each is
/// case-insensitive and anchored to a `key = value` / `key: value` shape with a
/// value-length floor: 16 for key-like tokens, 8 for passwords.
pub fn credential_patterns() -> Vec<CredentialPattern> {
    vec![
        CredentialPattern {
            name: "api_key",
            regex: r#"(?i)api[_-]?key\s*[:=]\s*['"]?[a-zA-Z0-9_\-]{16,}['"]?"#,
            is_api_key: true,
        },
        CredentialPattern {
            name: "secret_key",
            regex: r#"(?i)secret[_-]?key\s*[:=]\s*['"]?[a-zA-Z0-9_\-]{16,}['"]?"#,
            is_api_key: false,
        },
        CredentialPattern {
            name: "access_token",
            regex: r#"(?i)access[_-]?token\s*[:=]\s*['"]?[a-zA-Z0-9_\-\.]{16,}['"]?"#,
            is_api_key: true,
        },
        CredentialPattern {
            name: "password",
            regex: r#"(?i)(password|passwd|pwd)\s*[:=]\s*['"]?.{8,}['"]?"#,
            is_api_key: false,
        },
        CredentialPattern {
            name: "database_url",
            regex: r#"(?i)(database_url|db_url)\s*[:=]\s*['"]?[a-zA-Z][a-zA-Z0-9+.\-]*://\S+['"]?"#,
            is_api_key: false,
        },
        CredentialPattern {
            name: "private_key",
            regex: r"-----BEGIN [A-Z ]*PRIVATE KEY-----",
            is_api_key: false,
        },
    ]
}

/// Ecosystem-specific credential key names, appended to the base catalog when the
/// project's manifest indicates that ecosystem. Grounded on the same
/// manifest-sniffing `state_detector::recommend_templates` uses.
pub fn manifest_credential_patterns(root: &std::path::Path) -> Vec<CredentialPattern> {
    let mut extra = Vec::new();
    if root.join("package.json").exists() {
        extra.push(CredentialPattern {
            name: "node_session_secret",
            regex: r#"(?i)(session[_-]?secret|jwt[_-]?secret|cookie[_-]?secret)\s*[:=]\s*['"]?[a-zA-Z0-9_\-]{16,}['"]?"#,
            is_api_key: false,
        });
    }
    if root.join("requirements.txt").exists()
        || root.join("setup.py").exists()
        || root.join("pyproject.toml").exists()
    {
        extra.push(CredentialPattern {
            name: "django_secret_key",
            regex: r#"(?i)(django[_-]?secret[_-]?key|secret_key)\s*[:=]\s*['"]?[a-zA-Z0-9_\-]{16,}['"]?"#,
            is_api_key: false,
        });
    }
    extra
}

/// Suspicious symlink-target substrings, checked against the textual link target
/// only — never the target's content.
pub fn suspicious_symlink_targets() -> Vec<&'static str> {
    vec![
        "*.env*",
        "*.secret*",
        "*.key*",
        "*.credential*",
        "*password*",
        "*config/secret*",
        "*private*",
    ]
}

/// Default global exceptions seeded on first project-store initialization.
pub fn default_global_exceptions() -> Vec<String> {
    [
        "*codebase.txt",
        "*backup.py",
        "*.bak",
        "*_backup.*",
        "docs/*.md",
        "*.readme",
        "changelog.*",
        "*.example",
        "template.*",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Blocking thresholds per security level, §4.4.
pub fn blocking_thresholds(level: gitup_config::SecurityLevel) -> &'static [crate::risk::SecurityRiskLevel] {
    use crate::risk::SecurityRiskLevel::*;
    use gitup_config::SecurityLevel::*;
    match level {
        Strict => &[Critical, High, Medium],
        Moderate => &[Critical],
        Relaxed => &[Critical],
    }
}

pub const LARGE_FILE_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_SCAN_SIZE_BYTES: u64 = 100 * 1024 * 1024;
pub const MAX_CONTENT_SCAN_BYTES: u64 = 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_non_empty_and_has_secret_entries() {
        let c = catalog();
        assert!(c.len() > 40);
        assert!(c.iter().any(|e| e.glob == "*.env"));
    }

    #[test]
    fn manifest_patterns_are_empty_without_a_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(manifest_credential_patterns(dir.path()).is_empty());
    }

    #[test]
    fn node_manifest_adds_session_secret_pattern() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let extra = manifest_credential_patterns(dir.path());
        assert!(extra.iter().any(|p| p.name == "node_session_secret"));
    }

    #[test]
    fn blocking_thresholds_match_spec() {
        assert_eq!(
            blocking_thresholds(gitup_config::SecurityLevel::Strict).len(),
            3
        );
        assert_eq!(
            blocking_thresholds(gitup_config::SecurityLevel::Moderate),
            &[crate::risk::SecurityRiskLevel::Critical]
        );
    }
}
