pub mod local;
pub mod memory;

/// Normalise a logical blob path: forward slashes, no leading slash, no `..`
fn clean_path(path: &str) -> Option<String> {
    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();

    if segments.is_empty() || segments.contains(&"..") {
        return None;
    }

    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::clean_path;

    #[test]
    fn clean_path_normalises_separators() {
        assert_eq!(clean_path("/images//a.png").as_deref(), Some("images/a.png"));
        assert_eq!(clean_path("images\\b.png").as_deref(), Some("images/b.png"));
        assert_eq!(clean_path("./images/c.png").as_deref(), Some("images/c.png"));
    }

    #[test]
    fn clean_path_rejects_escapes_and_empty() {
        assert!(clean_path("../etc/passwd").is_none());
        assert!(clean_path("images/../../x").is_none());
        assert!(clean_path("").is_none());
        assert!(clean_path("/").is_none());
    }
}
