//! Startup configuration: defaults and the packaged root-server list.

use std::net::Ipv4Addr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 53;
pub const DEFAULT_WORKERS: usize = 10;
pub const METRICS_PORT: u16 = 8000;
pub const ROOT_SERVERS_FILE: &str = "root_servers.json";

#[derive(Debug, Deserialize)]
struct RootServerFile {
    servers: Vec<Ipv4Addr>,
}

/// Loads the root nameserver addresses. The server cannot start without
/// them, so any failure here is fatal.
pub fn load_root_servers(path: &Path) -> Result<Vec<Ipv4Addr>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("root server file {} not found", path.display()))?;
    let parsed: RootServerFile = serde_json::from_str(&content)
        .with_context(|| format!("root server file {} is not valid", path.display()))?;
    anyhow::ensure!(
        !parsed.servers.is_empty(),
        "root server file {} lists no servers",
        path.display()
    );
    Ok(parsed.servers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct TempFile(PathBuf);

    impl TempFile {
        fn with_content(name: &str, content: &str) -> Self {
            let path = std::env::temp_dir().join(format!("recursor-{}-{name}", std::process::id()));
            std::fs::write(&path, content).unwrap();
            Self(path)
        }
    }

    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn test_load_root_servers() {
        let file = TempFile::with_content(
            "roots.json",
            r#"{"servers": ["198.41.0.4", "199.7.83.42"]}"#,
        );
        let servers = load_root_servers(&file.0).unwrap();
        assert_eq!(
            servers,
            vec![Ipv4Addr::new(198, 41, 0, 4), Ipv4Addr::new(199, 7, 83, 42)]
        );
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_root_servers(Path::new("/nonexistent/root_servers.json")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_empty_server_list_is_an_error() {
        let file = TempFile::with_content("empty.json", r#"{"servers": []}"#);
        assert!(load_root_servers(&file.0).is_err());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let file = TempFile::with_content("bad.json", "not json");
        assert!(load_root_servers(&file.0).is_err());
    }
}
