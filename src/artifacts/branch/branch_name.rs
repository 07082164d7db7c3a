use crate::artifacts::branch::{
    HEAD_REF_NAME, HEADS_PREFIX, INVALID_BRANCH_NAME_REGEX, REFS_PREFIX, REMOTES_PREFIX,
    TAGS_PREFIX,
};
use crate::artifacts::core::errors::BitError;
use anyhow::Context;
use derive_new::new;

/// Check a ref name (or one of its suffixes) against Git's `check-ref-format` rules
pub(crate) fn validate_name(name: &str, kind: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        return Err(BitError::InvalidName(format!("{kind} name cannot be empty")).into());
    }

    let re = regex::Regex::new(INVALID_BRANCH_NAME_REGEX)
        .with_context(|| format!("invalid ref name regex: {INVALID_BRANCH_NAME_REGEX}"))?;

    if re.is_match(name) {
        return Err(BitError::InvalidName(format!("'{name}' is not a valid {kind} name")).into());
    }

    Ok(())
}

/// Full reference name: `HEAD` or a path under `refs/`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord, new)]
pub struct SymRefName(String);

impl SymRefName {
    /// Parse a full ref name received from outside (wire, CLI)
    pub fn try_parse(name: &str) -> anyhow::Result<Self> {
        if name == HEAD_REF_NAME {
            return Ok(Self::head());
        }
        if !name.starts_with(REFS_PREFIX) {
            return Err(BitError::InvalidName(format!("'{name}' is not under {REFS_PREFIX}")).into());
        }
        validate_name(name, "ref")?;

        Ok(Self(name.to_string()))
    }

    pub fn head() -> Self {
        Self(HEAD_REF_NAME.to_string())
    }

    pub fn remote_tracking(remote: &str, branch: &BranchName) -> Self {
        Self(format!("{REMOTES_PREFIX}{remote}/{branch}"))
    }

    pub fn is_head(&self) -> bool {
        self.0 == HEAD_REF_NAME
    }

    pub fn is_branch(&self) -> bool {
        self.0.starts_with(HEADS_PREFIX)
    }

    pub fn is_tag(&self) -> bool {
        self.0.starts_with(TAGS_PREFIX)
    }

    pub fn as_ref_path(&self) -> &str {
        &self.0
    }

    /// Name without its namespace, e.g. `master` for `refs/heads/master`
    pub fn short_name(&self) -> &str {
        [HEADS_PREFIX, TAGS_PREFIX, REMOTES_PREFIX]
            .iter()
            .find_map(|prefix| self.0.strip_prefix(prefix))
            .unwrap_or(&self.0)
    }
}

impl std::fmt::Display for SymRefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BranchName(String);

impl BranchName {
    pub fn try_parse(name: String) -> anyhow::Result<Self> {
        validate_name(&name, "branch")?;
        if name == HEAD_REF_NAME {
            return Err(BitError::InvalidName("'HEAD' is not a valid branch name".into()).into());
        }

        Ok(Self(name))
    }

    pub fn try_parse_sym_ref_name(sym_ref_name: &SymRefName) -> anyhow::Result<Self> {
        let name = sym_ref_name
            .as_ref_path()
            .strip_prefix(HEADS_PREFIX)
            .ok_or_else(|| {
                BitError::InvalidName(format!("'{sym_ref_name}' is not a branch ref"))
            })?;

        Self::try_parse(name.to_string())
    }

    pub fn to_ref_name(&self) -> SymRefName {
        SymRefName(format!("{HEADS_PREFIX}{}", self.0))
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagName(String);

impl TagName {
    pub fn try_parse(name: String) -> anyhow::Result<Self> {
        validate_name(&name, "tag")?;
        Ok(Self(name))
    }

    pub fn to_ref_name(&self) -> SymRefName {
        SymRefName(format!("{TAGS_PREFIX}{}", self.0))
    }
}

impl AsRef<str> for TagName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TagName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
