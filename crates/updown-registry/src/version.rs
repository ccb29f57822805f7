//! Component version identifiers.
//!
//! Format `<prefix>-<name>-v<n>` where prefix is the component type's
//! wire prefix, `name` is kebab-case, and `n >= 1`. Generation and
//! parsing are total inverse functions; this format appears in stored
//! records and cross-references, so changing it is a breaking change.

use once_cell::sync::Lazy;
use regex::Regex;
use updown_core::ComponentType;

static VERSION_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(prob|entry|exit|sizing)-([a-z0-9]+(?:-[a-z0-9]+)*)-v([1-9][0-9]*)$")
        .expect("version id regex")
});

static KEBAB_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("kebab name regex"));

/// A parsed version identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVersionId {
    pub ctype: ComponentType,
    pub name: String,
    pub version: u32,
}

/// Generate the canonical version id for a component.
pub fn generate_version_id(ctype: ComponentType, name: &str, version: u32) -> String {
    format!("{}-{}-v{}", ctype.prefix(), name, version)
}

/// Parse a version id. Returns None for anything that does not match
/// the wire format exactly. Inverse of [`generate_version_id`].
pub fn parse_version_id(id: &str) -> Option<ParsedVersionId> {
    let caps = VERSION_ID.captures(id)?;
    let ctype = ComponentType::from_prefix(caps.get(1)?.as_str())?;
    let name = caps.get(2)?.as_str().to_string();
    let version: u32 = caps.get(3)?.as_str().parse().ok()?;
    Some(ParsedVersionId {
        ctype,
        name,
        version,
    })
}

/// True when `name` is valid kebab-case for a component name.
pub fn is_valid_component_name(name: &str) -> bool {
    KEBAB_NAME.is_match(name)
}
