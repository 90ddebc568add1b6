use std::fs;
use std::io::Write;
use std::path::Path;

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Derive a stable client id from an email address, used as `Task.client_id`.
///
/// Example: "sarah.chen@acme.com" → "sarah-chen-acme-com"
pub fn person_id_from_email(email: &str) -> String {
    slugify(&email.to_lowercase())
}

/// Stable hex-encoded SHA-256 hash of a serializable value, used for
/// `requirements_hash` and `room_eval_hash` (SPEC_FULL.md §3). Serializes
/// through `serde_json::to_vec` so field order never affects the hash —
/// `serde_json`'s map representation is insertion-order, so callers must
/// build the hashed value with a canonical field order (a plain struct, not
/// a `HashMap`) for the hash to be stable across process runs.
pub fn stable_hash<T: serde::Serialize>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

/// Write `contents` to `path` atomically: write to a sibling temp file in the
/// same directory, fsync, then rename over the target. POSIX rename is atomic,
/// so a reader never observes a partially-written file (SPEC_FULL.md §4.7).
pub fn atomic_write_str(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let tmp_name = format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("state"),
        std::process::id()
    );
    let tmp_path = dir.join(tmp_name);
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Convert a display name to a URL-safe kebab-case slug. Accented letters are
/// decomposed to their base form first (NFKD) so e.g. "café" slugs to "cafe"
/// rather than dropping the accented letter as punctuation.
///
/// Example: "Acme Corp" → "acme-corp"
pub fn slugify(name: &str) -> String {
    name.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Acme Corp"), "acme-corp");
    }

    #[test]
    fn test_slugify_multi_word() {
        assert_eq!(slugify("Q2 Platform Migration"), "q2-platform-migration");
    }

    #[test]
    fn test_slugify_preserves_hyphens() {
        assert_eq!(slugify("Bring-a-Trailer"), "bring-a-trailer");
    }

    #[test]
    fn test_slugify_special_chars() {
        assert_eq!(slugify("Weekly Sync — Team Alpha"), "weekly-sync-team-alpha");
    }

    #[test]
    fn test_slugify_single_word() {
        assert_eq!(slugify("simple"), "simple");
    }

    #[test]
    fn test_slugify_normalizes_accented_letters() {
        assert_eq!(slugify("Café Société"), "cafe-societe");
    }

    // Person helper tests (I51)

    #[test]
    fn test_person_id_from_email() {
        assert_eq!(person_id_from_email("sarah.chen@acme.com"), "sarah-chen-acme-com");
        assert_eq!(person_id_from_email("JOE@BIGCORP.IO"), "joe-bigcorp-io");
    }

    #[test]
    fn test_stable_hash_is_deterministic() {
        #[derive(serde::Serialize)]
        struct Sample {
            a: u32,
            b: String,
        }
        let h1 = stable_hash(&Sample { a: 1, b: "x".into() });
        let h2 = stable_hash(&Sample { a: 1, b: "x".into() });
        let h3 = stable_hash(&Sample { a: 2, b: "x".into() });
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_atomic_write_str_replaces_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        atomic_write_str(&path, "{\"a\":1}").expect("write");
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":1}");
        atomic_write_str(&path, "{\"a\":2}").expect("overwrite");
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"a\":2}");
    }
}
