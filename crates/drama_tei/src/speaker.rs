//! Cast map and speaker identity resolution.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Minimum normalized similarity for a fuzzy speaker match.
pub const FUZZY_THRESHOLD: f64 = 0.8;

static ROLE_ID_FORBIDDEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9ÁÉÍÓÚÜÑáéíóúüñ_-]+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// Case-insensitive equality with the full declared name.
    Exact,
    /// Equality with the first comma segment, or its first or second word.
    Partial,
    /// Normalized Levenshtein similarity of at least [`FUZZY_THRESHOLD`].
    Fuzzy,
}

/// Rules tried in order; the first one that finds a member wins.
pub const MATCH_POLICY: &[MatchRule] = &[MatchRule::Exact, MatchRule::Partial, MatchRule::Fuzzy];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastMember {
    pub name: String,
    pub id: String,
}

/// Declared roles in declaration order.
#[derive(Debug, Clone, Default)]
pub struct CastMap {
    members: Vec<CastMember>,
}

impl CastMap {
    pub fn new() -> Self {
        CastMap::default()
    }

    /// Registers a role and returns its identifier. Declaring the same name
    /// twice returns the first identifier.
    pub fn declare(&mut self, name: &str) -> String {
        let name = name.trim();
        if let Some(member) = self.members.iter().find(|m| m.name == name) {
            return member.id.clone();
        }
        let base = role_id(name);
        let mut id = base.clone();
        let mut n = 2;
        while self.members.iter().any(|m| m.id == id) {
            id = format!("{}_{}", base, n);
            n += 1;
        }
        self.members.push(CastMember { name: name.to_string(), id: id.clone() });
        id
    }

    /// Registers a role under an explicit identifier.
    pub fn insert(&mut self, name: &str, id: &str) {
        self.members.push(CastMember { name: name.trim().to_string(), id: id.to_string() });
    }

    pub fn members(&self) -> &[CastMember] {
        &self.members
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn resolve(&self, speaker: &str) -> Option<&str> {
        let wanted = clean_speaker(speaker);
        if wanted.is_empty() {
            return None;
        }
        for rule in MATCH_POLICY {
            if let Some(member) = self.find(*rule, &wanted) {
                debug!(speaker, role = %member.id, ?rule, "speaker resolved");
                return Some(&member.id);
            }
        }
        debug!(speaker, "speaker not in cast list");
        None
    }

    fn find(&self, rule: MatchRule, wanted: &str) -> Option<&CastMember> {
        match rule {
            MatchRule::Exact => self.members.iter().find(|m| m.name.to_lowercase() == wanted),
            MatchRule::Partial => self.members.iter().find(|m| {
                let segment = first_segment(&m.name);
                let mut words = segment.split_whitespace();
                segment == wanted
                    || words.next() == Some(wanted)
                    || words.next() == Some(wanted)
            }),
            MatchRule::Fuzzy => {
                let mut best: Option<(&CastMember, f64)> = None;
                for member in &self.members {
                    let full = member.name.to_lowercase();
                    let score = strsim::normalized_levenshtein(wanted, &full)
                        .max(strsim::normalized_levenshtein(wanted, &first_segment(&member.name)));
                    // strictly greater keeps the earliest declaration on ties
                    if score >= FUZZY_THRESHOLD && best.is_none_or(|(_, s)| score > s) {
                        best = Some((member, score));
                    }
                }
                best.map(|(m, _)| m)
            }
        }
    }
}

/// Lowercased first comma-delimited segment of a declared name.
fn first_segment(name: &str) -> String {
    name.split(',').next().unwrap_or("").trim().to_lowercase()
}

fn clean_speaker(speaker: &str) -> String {
    speaker
        .trim()
        .trim_end_matches(['.', ':'])
        .trim()
        .to_lowercase()
}

/// Identifier derived from a declared role name.
pub fn role_id(name: &str) -> String {
    let id = ROLE_ID_FORBIDDEN.replace_all(name.trim(), "_");
    let id = id.trim_matches('_');
    if id.is_empty() { "personaje".to_string() } else { id.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carlos() -> CastMap {
        let mut cast = CastMap::new();
        cast.insert("Don Carlos, Príncipe", "don_carlos");
        cast
    }

    #[test]
    fn test_partial_matches_on_name_words() {
        let cast = carlos();
        assert_eq!(cast.resolve("CARLOS"), Some("don_carlos"));
        assert_eq!(cast.resolve("DON CARLOS"), Some("don_carlos"));
        assert_eq!(cast.resolve("Don Carlos."), Some("don_carlos"));
    }

    #[test]
    fn test_unknown_speaker() {
        assert_eq!(carlos().resolve("Mayordomo"), None);
        assert_eq!(carlos().resolve("  "), None);
    }

    #[test]
    fn test_exact_before_partial() {
        let mut cast = CastMap::new();
        cast.insert("Otavio, padre de Finea", "otavio");
        cast.insert("Finea", "finea");
        assert_eq!(cast.resolve("finea"), Some("finea"));
    }

    #[test]
    fn test_fuzzy_tolerates_typos() {
        let mut cast = CastMap::new();
        cast.insert("Liseo, caballero", "liseo");
        cast.insert("Laurencio", "laurencio");
        assert_eq!(cast.resolve("LAURENCO"), Some("laurencio"));
        assert_eq!(cast.resolve("LISEOS"), Some("liseo"));
        assert_eq!(cast.resolve("LEONOR"), None);
    }

    #[test]
    fn test_declare_generates_unique_ids() {
        let mut cast = CastMap::new();
        assert_eq!(cast.declare("Don Carlos, Príncipe"), "Don_Carlos_Príncipe");
        assert_eq!(cast.declare("Don Carlos, Príncipe"), "Don_Carlos_Príncipe");
        assert_eq!(cast.declare("Don Carlos; Príncipe"), "Don_Carlos_Príncipe_2");
        assert_eq!(cast.members().len(), 2);
    }
}
