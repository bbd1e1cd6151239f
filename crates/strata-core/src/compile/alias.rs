//! Column alias wire encoding.
//!
//! Every selected column is aliased `L<level>~~<sublevel>**<name>` so the
//! assembler can regroup a flat row into the requested nesting.

const LEVEL_PREFIX: char = 'L';
const SUBLEVEL_SEPARATOR: &str = "~~";
const NAME_SEPARATOR: &str = "**";

/// Decoded column alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnAlias<'a> {
    pub level: usize,
    pub sublevel: usize,
    pub name: &'a str,
}

pub fn encode_alias(level: usize, sublevel: usize, name: &str) -> String {
    format!(
        "{}{}{}{}{}{}",
        LEVEL_PREFIX, level, SUBLEVEL_SEPARATOR, sublevel, NAME_SEPARATOR, name
    )
}

pub fn decode_alias(alias: &str) -> Option<ColumnAlias<'_>> {
    let rest = alias.strip_prefix(LEVEL_PREFIX)?;
    let (level, rest) = rest.split_once(SUBLEVEL_SEPARATOR)?;
    let (sublevel, name) = rest.split_once(NAME_SEPARATOR)?;
    Some(ColumnAlias {
        level: level.parse().ok()?,
        sublevel: sublevel.parse().ok()?,
        name,
    })
}

/// Output name of an alias; labels that are not encoded pass through
pub fn strip_alias(alias: &str) -> &str {
    decode_alias(alias).map_or(alias, |a| a.name)
}
