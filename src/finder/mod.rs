//! Name and identifier lookups for platform resources.
//!
//! The selection functions are pure and operate on listed resources; the
//! async `resolve_*` and `find_*` wrappers fetch the lists first.

use tracing::debug;

use crate::compute::{
    AntiAffinityGroup, ApiError, ComputeApi, InstanceType, Named, ResourceKind, SecurityGroup,
    SshKey, Template,
};
use crate::error::DriverError;

/// Templates are only considered when their disk footprint is this many GiB.
const TEMPLATE_SIZE_GIB: u64 = 10;
/// Family searched when an instance type is given as a bare size.
const DEFAULT_FAMILY: &str = "standard";

/// Returns the first item whose name or id equals `name`.
#[must_use]
pub fn find_by_name<'a, T: Named>(items: &'a [T], name: &str) -> Option<&'a T> {
    items
        .iter()
        .find(|item| item.name() == name || item.id_string() == name)
}

/// Derives the short name of a template following the
/// `Linux <Family> <Version> ...` naming convention.
///
/// # Examples
///
/// ```
/// # use exomachine::finder::template_short_name;
/// assert_eq!(
///     template_short_name("Linux Ubuntu 24.04 LTS 64-bit").as_deref(),
///     Some("ubuntu-24.04")
/// );
/// assert_eq!(template_short_name("Windows Server 2022"), None);
/// ```
#[must_use]
pub fn template_short_name(name: &str) -> Option<String> {
    let rest = name.strip_prefix("Linux ")?;
    rest.char_indices()
        .skip(1)
        .filter(|&(_, ch)| ch == ' ')
        .find_map(|(pos, _)| {
            let (family, tail) = rest.split_at_checked(pos)?;
            let version = leading_version(tail.strip_prefix(' ')?)?;
            Some(format!(
                "{}-{version}",
                family.to_lowercase().replace(' ', "-")
            ))
        })
}

/// Returns the longest run of digits and dots at the start of `text` that
/// ends on a word boundary.
fn leading_version(text: &str) -> Option<&str> {
    let run = text
        .find(|ch: char| !(ch.is_ascii_digit() || ch == '.'))
        .unwrap_or(text.len());
    (1..=run).rev().find_map(|len| {
        let (version, tail) = text.split_at_checked(len)?;
        let at_boundary = is_word(version.chars().next_back()) != is_word(tail.chars().next());
        at_boundary.then_some(version)
    })
}

fn is_word(ch: Option<char>) -> bool {
    ch.is_some_and(|value| value.is_ascii_alphanumeric() || value == '_')
}

/// Selects the template matching `name` by full name or short name.
///
/// # Errors
///
/// Returns [`DriverError::ResourceNotFound`] when no 10 GiB template matches.
pub fn find_template<'a>(
    templates: &'a [Template],
    name: &str,
) -> Result<&'a Template, DriverError> {
    let wanted = name.to_lowercase();
    templates
        .iter()
        .filter(|template| {
            template
                .size
                .is_some_and(|size| size >> 30 == TEMPLATE_SIZE_GIB)
        })
        .find(|template| {
            template.name.to_lowercase() == wanted
                || template_short_name(&template.name).is_some_and(|short| short == wanted)
        })
        .ok_or_else(|| DriverError::ResourceNotFound {
            kind: ResourceKind::Template,
            name: name.to_owned(),
        })
}

/// Selects the instance type matching `key`.
///
/// `key` may be an id, a `family.size` composite key, or a bare size within
/// the `standard` family. Matching is case-insensitive.
///
/// # Errors
///
/// Returns [`DriverError::ResourceNotFound`] when nothing matches and
/// [`DriverError::AmbiguousResource`] when more than one type matches.
pub fn find_instance_type<'a>(
    types: &'a [InstanceType],
    key: &str,
) -> Result<&'a InstanceType, DriverError> {
    let wanted = key.trim().to_lowercase();
    let matches: Vec<&InstanceType> = types
        .iter()
        .filter(|candidate| {
            candidate.id.to_string() == wanted
                || candidate.composite_key().to_lowercase() == wanted
                || (!wanted.contains('.')
                    && candidate.family.eq_ignore_ascii_case(DEFAULT_FAMILY)
                    && candidate.size.to_lowercase() == wanted)
        })
        .collect();

    match matches.as_slice() {
        [] => Err(DriverError::ResourceNotFound {
            kind: ResourceKind::InstanceType,
            name: key.to_owned(),
        }),
        [single] => Ok(*single),
        many => Err(DriverError::AmbiguousResource {
            kind: ResourceKind::InstanceType,
            name: key.to_owned(),
            count: many.len(),
        }),
    }
}

/// Lists templates and selects the one matching `name`.
///
/// # Errors
///
/// Returns [`DriverError`] when listing fails or nothing matches.
pub async fn resolve_template<A: ComputeApi>(
    api: &A,
    name: &str,
) -> Result<Template, DriverError> {
    let templates = api.list_templates().await?;
    let template = find_template(&templates, name)?;
    debug!(template = %template.id, name = %template.name, "resolved template");
    Ok(template.clone())
}

/// Lists instance types and selects the one matching `key`.
///
/// # Errors
///
/// Returns [`DriverError`] when listing fails, nothing matches, or the key is
/// ambiguous.
pub async fn resolve_instance_type<A: ComputeApi>(
    api: &A,
    key: &str,
) -> Result<InstanceType, DriverError> {
    let types = api.list_instance_types().await?;
    let instance_type = find_instance_type(&types, key)?;
    debug!(
        instance_type = %instance_type.id,
        key = %instance_type.composite_key(),
        "resolved instance type"
    );
    Ok(instance_type.clone())
}

/// Looks up a security group by name or id.
///
/// # Errors
///
/// Returns [`DriverError::Api`] when listing fails.
pub async fn find_security_group<A: ComputeApi>(
    api: &A,
    name: &str,
) -> Result<Option<SecurityGroup>, DriverError> {
    let groups = api.list_security_groups().await?;
    Ok(find_by_name(&groups, name).cloned())
}

/// Looks up an anti-affinity group by name or id.
///
/// # Errors
///
/// Returns [`DriverError::Api`] when listing fails.
pub async fn find_anti_affinity_group<A: ComputeApi>(
    api: &A,
    name: &str,
) -> Result<Option<AntiAffinityGroup>, DriverError> {
    let groups = api.list_anti_affinity_groups().await?;
    Ok(find_by_name(&groups, name).cloned())
}

/// Looks up a registered SSH key by name.
///
/// # Errors
///
/// Returns [`DriverError::Api`] for failures other than a missing key.
pub async fn find_ssh_key<A: ComputeApi>(
    api: &A,
    name: &str,
) -> Result<Option<SshKey>, DriverError> {
    match api.get_ssh_key(name).await {
        Ok(key) => Ok(Some(key)),
        Err(ApiError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests;
