// src/identity.rs

//! Identifier resolution
//!
//! Turns a user-supplied token into exactly one holon:
//! 1. A token that parses as a UUID is a direct point lookup, never a search
//! 2. Otherwise an exact, case-sensitive name match wins
//! 3. Otherwise a case-insensitive substring match over name and description
//!
//! Several matches are handed to a [`DisambiguationPolicy`]; the resolver
//! itself never blocks on input.

use crate::db::models::{HolonQuery, HolonRecord};
use crate::error::{Error, Result};
use crate::kind::HolonKind;
use crate::manifest::Artifact;
use crate::policy::{Candidate, DisambiguationPolicy};
use crate::session::ActorId;
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

/// Restrictions applied while resolving
#[derive(Debug, Clone, Copy)]
pub struct ResolveScope {
    pub kind: HolonKind,
    /// Only holons created by this actor
    pub owner: Option<ActorId>,
    pub include_inactive: bool,
}

impl ResolveScope {
    /// Every holon of `kind`, active or not
    pub fn kind(kind: HolonKind) -> Self {
        Self {
            kind,
            owner: None,
            include_inactive: true,
        }
    }

    pub fn owned_by(mut self, owner: ActorId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn active_only(mut self) -> Self {
        self.include_inactive = false;
        self
    }

    fn query(&self) -> HolonQuery {
        HolonQuery {
            kind: Some(self.kind),
            created_by: self.owner,
            published: None,
            include_inactive: self.include_inactive,
        }
    }
}

/// Direct lookup of a holon id within `scope`
fn lookup(conn: &Connection, id: Uuid, scope: &ResolveScope) -> Result<Artifact> {
    let artifact = HolonRecord::find_by_id(conn, id)?
        .filter(|a| a.kind == scope.kind)
        .ok_or_else(|| Error::NotFound(format!("{} {}", scope.kind, id)))?;

    if let Some(owner) = scope.owner
        && artifact.created_by != owner
    {
        return Err(Error::PermissionDenied(format!(
            "{} '{}' was not created by the current avatar",
            scope.kind, artifact.name
        )));
    }
    Ok(artifact)
}

/// Case-insensitive substring match over name and description
fn matches_text(artifact: &Artifact, needle_lower: &str) -> bool {
    artifact.name.to_lowercase().contains(needle_lower)
        || artifact.description.to_lowercase().contains(needle_lower)
}

/// Free-text search within `scope`, ordered by name then id
pub fn search(conn: &Connection, text: &str, scope: &ResolveScope) -> Result<Vec<Artifact>> {
    let needle = text.trim().to_lowercase();
    let matches: Vec<Artifact> = HolonRecord::list(conn, &scope.query())?
        .into_iter()
        .filter(|a| matches_text(a, &needle))
        .collect();
    debug!("Search '{}' in {}: {} matches", text, scope.kind, matches.len());
    Ok(matches)
}

/// All holons a token could mean, ordered by name then id
///
/// A UUID yields at most one (or fails with NotFound/PermissionDenied).
pub fn find_matches(conn: &Connection, token: &str, scope: &ResolveScope) -> Result<Vec<Artifact>> {
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::InvalidInput(format!("empty {} identifier", scope.kind)));
    }

    if let Ok(id) = Uuid::parse_str(token) {
        return lookup(conn, id, scope).map(|a| vec![a]);
    }

    let all = HolonRecord::list(conn, &scope.query())?;
    let exact: Vec<Artifact> = all.iter().filter(|a| a.name == token).cloned().collect();
    if !exact.is_empty() {
        return Ok(exact);
    }

    let needle = token.to_lowercase();
    Ok(all.into_iter().filter(|a| matches_text(a, &needle)).collect())
}

/// Resolve a token to exactly one holon
pub fn resolve(
    conn: &Connection,
    token: &str,
    scope: &ResolveScope,
    policy: &DisambiguationPolicy,
) -> Result<Artifact> {
    let mut matches = find_matches(conn, token, scope)?;
    match matches.len() {
        0 => Err(Error::NotFound(format!("{} '{}'", scope.kind, token.trim()))),
        1 => Ok(matches.remove(0)),
        _ => {
            let candidates: Vec<Candidate> = matches.iter().map(Candidate::from).collect();
            let index = policy.select(token.trim(), &candidates)?;
            debug!(
                "'{}' disambiguated to {} ({})",
                token, matches[index].name, matches[index].id
            );
            Ok(matches.swap_remove(index))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::ErrorKind;

    fn seed(conn: &Connection, name: &str, description: &str, kind: HolonKind, owner: Uuid) -> Artifact {
        let artifact = Artifact::new(name, description, kind, owner, "tester");
        HolonRecord::save(conn, &artifact).unwrap();
        artifact
    }

    #[test]
    fn test_exact_name_beats_substring() {
        let conn = db::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let moon = seed(&conn, "Moon", "", HolonKind::CelestialBody, owner);
        seed(&conn, "MoonBase", "", HolonKind::CelestialBody, owner);

        let scope = ResolveScope::kind(HolonKind::CelestialBody);
        let found = resolve(&conn, "Moon", &scope, &DisambiguationPolicy::FailOnAmbiguity).unwrap();
        assert_eq!(found.id, moon.id);
    }

    #[test]
    fn test_substring_is_case_insensitive_over_description() {
        let conn = db::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let sun = seed(&conn, "Sol", "The central STAR", HolonKind::CelestialBody, owner);

        let scope = ResolveScope::kind(HolonKind::CelestialBody);
        let found = resolve(&conn, "star", &scope, &DisambiguationPolicy::FailOnAmbiguity).unwrap();
        assert_eq!(found.id, sun.id);
    }

    #[test]
    fn test_ambiguity_ordered_by_name() {
        let conn = db::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        seed(&conn, "Moonlight", "", HolonKind::CelestialBody, owner);
        let base = seed(&conn, "MoonBase", "", HolonKind::CelestialBody, owner);
        seed(&conn, "Sun", "", HolonKind::CelestialBody, owner);

        let scope = ResolveScope::kind(HolonKind::CelestialBody);
        assert_eq!(search(&conn, "Moon", &scope).unwrap().len(), 2);

        let err = resolve(&conn, "moon", &scope, &DisambiguationPolicy::FailOnAmbiguity).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousMatch);

        let first = resolve(&conn, "moon", &scope, &DisambiguationPolicy::SelectFirst).unwrap();
        assert_eq!(first.id, base.id);
    }

    #[test]
    fn test_uuid_token_never_searches_names() {
        let conn = db::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let ghost_id = Uuid::new_v4();
        // A holon whose *name* is a UUID string
        seed(&conn, &ghost_id.to_string(), "", HolonKind::Library, owner);

        let scope = ResolveScope::kind(HolonKind::Library);
        let err = resolve(
            &conn,
            &ghost_id.to_string(),
            &scope,
            &DisambiguationPolicy::SelectFirst,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_uuid_lookup_checks_owner_and_kind() {
        let conn = db::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let lib = seed(&conn, "MoonLib", "", HolonKind::Library, owner);

        let token = lib.id.to_string();
        let policy = DisambiguationPolicy::FailOnAmbiguity;
        assert_eq!(
            resolve(&conn, &token, &ResolveScope::kind(HolonKind::Library), &policy)
                .unwrap()
                .id,
            lib.id
        );
        assert_eq!(
            resolve(&conn, &token, &ResolveScope::kind(HolonKind::Runtime), &policy)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
        let scope = ResolveScope::kind(HolonKind::Library).owned_by(Uuid::new_v4());
        assert_eq!(
            resolve(&conn, &token, &scope, &policy).unwrap_err().kind(),
            ErrorKind::PermissionDenied
        );
    }

    #[test]
    fn test_owner_scope_filters_search() {
        let conn = db::open_in_memory().unwrap();
        let me = Uuid::new_v4();
        seed(&conn, "MoonA", "", HolonKind::Quest, me);
        seed(&conn, "MoonB", "", HolonKind::Quest, Uuid::new_v4());

        let scope = ResolveScope::kind(HolonKind::Quest).owned_by(me);
        let found = resolve(&conn, "moon", &scope, &DisambiguationPolicy::FailOnAmbiguity).unwrap();
        assert_eq!(found.name, "MoonA");
    }

    #[test]
    fn test_no_match_and_empty_token() {
        let conn = db::open_in_memory().unwrap();
        let scope = ResolveScope::kind(HolonKind::Zome);
        let policy = DisambiguationPolicy::FailOnAmbiguity;
        assert_eq!(
            resolve(&conn, "nothing", &scope, &policy).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            resolve(&conn, "  ", &scope, &policy).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }
}
