use std::{
    fmt::Write as _,
    io,
    path::{Path, PathBuf},
};

/// A command-line flag, rendered as `name` or `name="value"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag<'a> {
    pub name: &'a str,
    pub value: Option<&'a str>,
}

impl<'a> Flag<'a> {
    pub fn bare(name: &'a str) -> Self {
        Self { name, value: None }
    }

    pub fn with(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            value: Some(value),
        }
    }
}

/// Whether `command` already carries `name`, as `name`, `name=..` or `name ..`.
pub fn has_flag(command: &str, name: &str) -> bool {
    command.split_whitespace().any(|token| {
        token == name
            || token
                .strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('='))
    })
}

/// Appends every flag the command does not already carry.
pub fn merge_flags(command: &str, flags: &[Flag<'_>]) -> String {
    let mut merged = command.trim().to_string();
    for flag in flags {
        if has_flag(&merged, flag.name) {
            continue;
        }
        if !merged.is_empty() {
            merged.push(' ');
        }
        match flag.value.filter(|v| !v.is_empty()) {
            Some(value) => {
                let _ = write!(merged, "{}=\"{}\"", flag.name, value);
            }
            None => merged.push_str(flag.name),
        }
    }
    merged
}

/// Replaces the value of `name` with `***` for display.
pub fn mask_flag(command: &str, name: &str) -> String {
    command
        .split(' ')
        .map(|token| match token.strip_prefix(name) {
            Some(rest) if rest.starts_with('=') => format!("{name}=***"),
            _ => token.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Wraps a path containing spaces in double quotes.
pub fn quote_if_spaced(path: &Path) -> String {
    let shown = path.display().to_string();
    if shown.contains(' ') {
        format!("\"{shown}\"")
    } else {
        shown
    }
}

/// Depth-first search for the first file named `name`, entries visited in name order.
pub fn find_file(root: &Path, name: &str) -> io::Result<Option<PathBuf>> {
    if !root.is_dir() {
        return Ok(None);
    }
    let mut entries = std::fs::read_dir(root)?
        .filter_map(Result::ok)
        .collect::<Vec<_>>();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let kind = entry.file_type()?;
        if kind.is_dir() {
            if let Some(found) = find_file(&path, name)? {
                return Ok(Some(found));
            }
        } else if entry.file_name() == name {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

#[cfg(unix)]
pub async fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
pub async fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

fn escape_property(raw: &str, key: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' | '#' | '!' if key => {
                out.push('\\');
                out.push(c);
            }
            ' ' if key || i == 0 => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
    out
}

/// Renders `key=value` lines in Java properties syntax.
pub fn render_properties(pairs: &[(&str, String)]) -> String {
    pairs.iter().fold(String::new(), |mut out, (k, v)| {
        let _ = writeln!(out, "{}={}", escape_property(k, true), escape_property(v, false));
        out
    })
}

/// Writes a properties file, creating parent directories.
pub async fn write_properties(path: &Path, pairs: &[(&str, String)]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, render_properties(pairs)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_skips_flags_already_present() {
        let cmd = merge_flags(
            "-retry=2 -apiKey=\"custom\"",
            &[Flag::with("-apiKey", "k-1"), Flag::with("-serverUrl", "https://srv")],
        );
        assert_eq!(cmd, "-retry=2 -apiKey=\"custom\" -serverUrl=\"https://srv\"");
    }

    #[test]
    fn merge_orders_and_renders_bare_flags() {
        let cmd = merge_flags(
            "/opt/runner/relayc",
            &[
                Flag::bare("-noSplash"),
                Flag::with("-runMode", "console"),
                Flag::with("-projectPath", "/w/p/a.prj"),
            ],
        );
        assert_eq!(
            cmd,
            "/opt/runner/relayc -noSplash -runMode=\"console\" -projectPath=\"/w/p/a.prj\""
        );
    }

    #[test]
    fn flag_prefix_is_not_a_match() {
        assert!(!has_flag("-apiKeyOnPremise=\"x\"", "-apiKey"));
        assert!(has_flag("run -apiKey \"x\"", "-apiKey"));
        let cmd = merge_flags("-apiKeyOnPremise=\"x\"", &[Flag::with("-apiKey", "y")]);
        assert_eq!(cmd, "-apiKeyOnPremise=\"x\" -apiKey=\"y\"");
    }

    #[test]
    fn mask_hides_value() {
        let shown = mask_flag("run -apiKey=\"secret\" -x", "-apiKey");
        assert_eq!(shown, "run -apiKey=*** -x");
    }

    #[test]
    fn quotes_paths_with_spaces() {
        assert_eq!(quote_if_spaced(Path::new("/opt/My Runner/relayc")), "\"/opt/My Runner/relayc\"");
        assert_eq!(quote_if_spaced(Path::new("/opt/relayc")), "/opt/relayc");
    }

    #[test]
    fn find_file_walks_depth_first() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/bin");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(nested.join("relayc"), "").unwrap();
        std::fs::write(dir.path().join("b/relayc"), "").unwrap();

        let found = find_file(dir.path(), "relayc").unwrap().unwrap();
        assert_eq!(found, nested.join("relayc"));
        assert!(find_file(dir.path(), "missing").unwrap().is_none());
        assert!(find_file(&dir.path().join("nope"), "relayc").unwrap().is_none());
    }

    #[test]
    fn properties_escape_keys_and_values() {
        let text = render_properties(&[
            ("integration.team", r#"{"id":"7"}"#.to_string()),
            ("path", "C:\\work".to_string()),
        ]);
        assert_eq!(text, "integration.team={\"id\":\"7\"}\npath=C:\\\\work\n");
    }
}
