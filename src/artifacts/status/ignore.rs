//! `.gitignore` rules
//!
//! Only the root `.gitignore` is read. Supported syntax: blank lines and `#`
//! comments are skipped, `*` and `?` match within one path component, `**`
//! matches across components, a trailing `/` restricts the rule to directories,
//! a leading or inner `/` anchors it to the repository root and `!` negates.
//! The last matching rule wins. `.git` is always ignored.

use anyhow::Context;
use regex::Regex;
use std::path::Path;

pub const IGNORE_FILE_NAME: &str = ".gitignore";
const GIT_DIR_NAME: &str = ".git";

#[derive(Debug, Clone)]
struct IgnorePattern {
    regex: Regex,
    negated: bool,
    directory_only: bool,
    /// Unanchored rules match the basename at any depth
    anchored: bool,
}

impl IgnorePattern {
    fn try_parse(line: &str) -> anyhow::Result<Option<Self>> {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let (negated, line) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line.strip_prefix('\\').unwrap_or(line)),
        };
        let (directory_only, line) = match line.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let anchored = line.contains('/');
        let line = line.strip_prefix('/').unwrap_or(line);

        if line.is_empty() {
            return Ok(None);
        }

        let regex = Regex::new(&glob_to_regex(line))
            .with_context(|| format!("invalid ignore pattern '{line}'"))?;

        Ok(Some(IgnorePattern {
            regex,
            negated,
            directory_only,
            anchored,
        }))
    }

    fn matches(&self, path: &str, is_dir: bool) -> bool {
        if self.directory_only && !is_dir {
            return false;
        }

        if self.anchored {
            self.regex.is_match(path)
        } else {
            let basename = path.rsplit('/').next().unwrap_or(path);
            self.regex.is_match(basename)
        }
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut regex = String::from("^");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                // `**/` also matches zero directories
                if chars.peek() == Some(&'/') {
                    chars.next();
                    regex.push_str("(?:.*/)?");
                } else {
                    regex.push_str(".*");
                }
            }
            '*' => regex.push_str("[^/]*"),
            '?' => regex.push_str("[^/]"),
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex.push('$');

    regex
}

/// Parsed ignore rules of a working tree
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreRules {
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let patterns = content
            .lines()
            .map(IgnorePattern::try_parse)
            .collect::<anyhow::Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();

        Ok(IgnoreRules { patterns })
    }

    /// Rules from `<root>/.gitignore`; a missing file means no rules
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(root.join(IGNORE_FILE_NAME)) {
            Ok(content) => Self::parse(&content),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(error).context("failed to read .gitignore"),
        }
    }

    /// Whether a path relative to the root is ignored, directly or through an
    /// ignored parent directory
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let components = path
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>();

        if components.iter().any(|component| component == GIT_DIR_NAME) {
            return true;
        }

        let mut prefix = String::new();
        for (i, component) in components.iter().enumerate() {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(component);

            let is_last = i + 1 == components.len();
            if self.matches(&prefix, if is_last { is_dir } else { true }) {
                return true;
            }
        }

        false
    }

    fn matches(&self, path: &str, is_dir: bool) -> bool {
        self.patterns
            .iter()
            .rev()
            .find(|pattern| pattern.matches(path, is_dir))
            .is_some_and(|pattern| !pattern.negated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const RULES: &str = "\
# build output
target/
*.log
!keep.log
/root-only.txt
docs/*.tmp
**/cache
";

    #[rstest]
    #[case("debug.log", false, true)]
    #[case("nested/dir/trace.log", false, true)]
    #[case("keep.log", false, false)]
    #[case("target", true, true)]
    #[case("target/release/bin", false, true)]
    #[case("target", false, false)]
    #[case("root-only.txt", false, true)]
    #[case("sub/root-only.txt", false, false)]
    #[case("docs/a.tmp", false, true)]
    #[case("docs/deeper/a.tmp", false, false)]
    #[case("x/y/cache", true, true)]
    #[case("cache", true, true)]
    #[case("src/main.rs", false, false)]
    #[case(".git/HEAD", false, true)]
    fn rules_match_like_git(#[case] path: &str, #[case] is_dir: bool, #[case] ignored: bool) {
        let rules = IgnoreRules::parse(RULES).unwrap();
        assert_eq!(rules.is_ignored(Path::new(path), is_dir), ignored, "{path}");
    }

    #[test]
    fn missing_file_ignores_nothing_but_git_dir() {
        let dir = assert_fs::TempDir::new().unwrap();
        let rules = IgnoreRules::load(dir.path()).unwrap();

        assert!(!rules.is_ignored(Path::new("anything"), false));
        assert!(rules.is_ignored(Path::new(".git"), true));
    }
}
