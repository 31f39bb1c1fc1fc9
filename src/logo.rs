//! Picks a distribution icon for an ISO by fuzzy-matching its name.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::{debug, trace, warn};

use self::fuzzy::partial_ratio;

pub mod fuzzy;

/// Key of the generic icon, used when nothing matches.
pub const DEFAULT_KEY: &str = "iso";

/// Keys that would match nearly every ISO name.
const EXCLUDED_KEYS: [&str; 2] = ["iso", "linux"];

/// A score must be strictly above this to count as a match.
pub const MATCH_THRESHOLD: u8 = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogoEntry {
    pub key: String,
    pub icon: PathBuf,
}

/// Read-only catalog of known distribution keys and their icons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoCatalog {
    entries: BTreeMap<String, PathBuf>,
    default: LogoEntry,
}

impl LogoCatalog {
    /// Load every `*.png` in `dir`, keyed by file stem.
    ///
    /// A missing or unreadable directory yields a catalog that only holds the
    /// default entry.
    pub fn load(dir: &Path) -> Self {
        let entries = match fs::read_dir(dir) {
            Ok(rd) => rd
                .filter_map(|r| r.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().map(|e| e == "png").unwrap_or(false))
                .filter_map(|p| {
                    let key = p.file_stem()?.to_string_lossy().into_owned();
                    Some((key, p))
                })
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!(?dir, "Could not read icon directory: {e}");
                vec![]
            }
        };

        let catalog = Self::from_entries(entries);
        debug!(count = catalog.entries.len(), "Loaded logo catalog");
        catalog
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        let entries: BTreeMap<String, PathBuf> = entries.into_iter().collect();
        let default = LogoEntry {
            key: DEFAULT_KEY.to_owned(),
            icon: entries.get(DEFAULT_KEY).cloned().unwrap_or_default(),
        };
        Self { entries, default }
    }

    pub fn default_entry(&self) -> &LogoEntry {
        &self.default
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry whose key best matches `candidate`, or the default entry.
    pub fn best_match(&self, candidate: &str) -> LogoEntry {
        self.try_match(candidate)
            .unwrap_or_else(|| self.default.clone())
    }

    /// Like [Self::best_match], but `None` instead of the default entry.
    ///
    /// The highest score wins. On an exact tie the longer key wins, and on a
    /// tie in length the alphabetically first key.
    pub fn try_match(&self, candidate: &str) -> Option<LogoEntry> {
        let candidate = candidate.to_lowercase();
        let mut best: Option<(u8, &String, &PathBuf)> = None;

        for (key, icon) in &self.entries {
            if EXCLUDED_KEYS.contains(&key.as_str()) {
                continue;
            }
            let score = partial_ratio(key, &candidate);
            trace!(key, score, "Scored logo key");
            if score <= MATCH_THRESHOLD {
                continue;
            }
            let better = match best {
                None => true,
                Some((s, k, _)) => score > s || (score == s && key.len() > k.len()),
            };
            if better {
                best = Some((score, key, icon));
            }
        }

        best.map(|(_, key, icon)| LogoEntry {
            key: key.clone(),
            icon: icon.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;

    fn catalog() -> LogoCatalog {
        LogoCatalog::from_entries(
            [
                "iso",
                "linux",
                "ubuntu",
                "debian",
                "fedora",
                "mint",
                "linuxmint",
                "archlinux",
            ]
            .into_iter()
            .map(|k| (k.to_owned(), PathBuf::from(format!("/icons/{k}.png")))),
        )
    }

    #[test_case("ubuntu-22.04-desktop", "ubuntu")]
    #[test_case("Fedora-Workstation-Live-x86_64-39", "fedora"; "mixed case")]
    #[test_case("debain-12", "debian"; "typo")]
    #[test_case("linuxmint-21.2-cinnamon-64bit.iso", "linuxmint"; "embedded shorter key")]
    fn matches_known_distribution(candidate: &str, expected: &str) {
        assert_eq!(catalog().best_match(candidate).key, expected);
    }

    #[test]
    fn tie_prefers_longer_key_even_when_sorted_later() {
        let c = LogoCatalog::from_entries(
            ["abc", "zabc"].map(|k| (k.to_owned(), PathBuf::from(format!("/icons/{k}.png")))),
        );

        assert_eq!(partial_ratio("abc", "zabc-1.0"), 100);
        assert_eq!(partial_ratio("zabc", "zabc-1.0"), 100);
        assert_eq!(c.best_match("zabc-1.0").key, "zabc");
    }

    #[test]
    fn key_cut_off_at_the_start_does_not_match() {
        let c = LogoCatalog::from_entries(
            ["iso", "mint"].map(|k| (k.to_owned(), PathBuf::from(format!("/icons/{k}.png")))),
        );

        assert_eq!(c.try_match("minimal-x.iso"), None);
    }

    #[test]
    fn unknown_name_gets_default() {
        let c = catalog();
        let entry = c.best_match("random-name-xyz");
        assert_eq!(&entry, c.default_entry());
        assert_eq!(entry.icon, PathBuf::from("/icons/iso.png"));
        assert_eq!(c.try_match("random-name-xyz"), None);
    }

    #[test]
    fn generic_keys_never_match() {
        let c = LogoCatalog::from_entries([
            ("iso".to_owned(), PathBuf::from("/icons/iso.png")),
            ("linux".to_owned(), PathBuf::from("/icons/linux.png")),
        ]);
        assert_eq!(c.try_match("linux.iso"), None);
    }

    #[test]
    fn matching_is_deterministic() {
        let c = catalog();
        let first = c.best_match("ubuntu-mate-22.04");
        for _ in 0..10 {
            assert_eq!(c.best_match("ubuntu-mate-22.04"), first);
        }
    }

    #[test]
    fn load_reads_png_stems() {
        let dir = TempDir::new().unwrap();
        File::create(dir.path().join("debian.png")).unwrap();
        File::create(dir.path().join("iso.png")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();

        let c = LogoCatalog::load(dir.path());

        assert_eq!(c.len(), 2);
        assert_eq!(c.best_match("debian-12.2.0-amd64").key, "debian");
        assert_eq!(c.default_entry().icon, dir.path().join("iso.png"));
    }

    #[test]
    fn missing_directory_gives_empty_catalog() {
        let c = LogoCatalog::load(Path::new("/definitely/not/here"));
        assert!(c.is_empty());
        assert_eq!(c.best_match("ubuntu").key, DEFAULT_KEY);
    }
}
