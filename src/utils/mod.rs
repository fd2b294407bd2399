pub mod logging;
pub(crate) mod progress_bar_builder;

pub use logging::init_logging;

/// Replaces characters that are unsafe in file names (`lcl|NC_000908.2`
/// becomes `lcl_NC_000908.2`).
pub fn safe_file_name(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();

    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("lcl|NC_000908.2_prot_1"), "lcl_NC_000908.2_prot_1");
        assert_eq!(safe_file_name("a/b c"), "a_b_c");
        assert_eq!(safe_file_name(""), "unnamed");
    }

    #[test]
    fn test_init_logging_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = init_logging(Some(&dir.path().join("logs"))).unwrap().unwrap();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("webblast_"));
    }
}
