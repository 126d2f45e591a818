//! Vimeo credential presence check against the work directory's `.env` file.
//!
//! The orchestrator never reads the secret values into its own configuration and
//! never writes the file. It only decides whether Setup needs to prompt for them.

use std::path::Path;

pub const ENV_FILE: &str = ".env";

pub const REQUIRED_CREDENTIALS: [&str; 3] = [
    "VIMEO_CLIENT_ID",
    "VIMEO_CLIENT_SECRET",
    "VIMEO_ACCESS_TOKEN",
];

/// Returns the credentials that are absent or empty in `env_file`.
///
/// An unreadable or missing file reports every credential as missing.
pub fn missing_credentials(env_file: &Path) -> Vec<&'static str> {
    let Ok(iter) = dotenvy::from_path_iter(env_file) else {
        return REQUIRED_CREDENTIALS.to_vec();
    };

    let present: Vec<(String, String)> = iter.filter_map(|item| item.ok()).collect();
    REQUIRED_CREDENTIALS
        .iter()
        .copied()
        .filter(|name| {
            !present
                .iter()
                .any(|(k, v)| k == name && !v.trim().is_empty())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_reports_all() {
        let dir = tempdir().unwrap();
        let missing = missing_credentials(&dir.path().join(ENV_FILE));
        assert_eq!(missing.len(), 3);
    }

    #[test]
    fn test_complete_file_reports_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(ENV_FILE);
        std::fs::write(
            &path,
            "# comment\nVIMEO_CLIENT_ID=\"abc\"\nVIMEO_CLIENT_SECRET=def\nVIMEO_ACCESS_TOKEN='ghi'\n",
        )
        .unwrap();
        assert!(missing_credentials(&path).is_empty());
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(ENV_FILE);
        std::fs::write(
            &path,
            "VIMEO_CLIENT_ID=abc\nVIMEO_CLIENT_SECRET=\nVIMEO_ACCESS_TOKEN=ghi\n",
        )
        .unwrap();
        assert_eq!(missing_credentials(&path), vec!["VIMEO_CLIENT_SECRET"]);
    }
}
