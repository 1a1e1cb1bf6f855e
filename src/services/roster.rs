//! Parses the `**CHARACTERS:**` roster a generated plot opens with.
//!
//! The roster is the only place a character's gender is stated explicitly, and
//! its bullet order decides who the "main" male and female characters are.
//! Scripts frequently shorten the declared names (`DR. LIAM CHEN` becomes
//! `LIAM CHEN` or just `LIAM`), so every entry also registers a title-stripped
//! and a first-name variant for [`NameResolver`] to fall back on.

use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-*•]\s*(?P<name>.+?)\s*\((?P<gender>[^)]*)\)").expect("valid bullet pattern")
});

/// Honorifics that are dropped when deriving name variants.
const TITLES: &[&str] = &[
    "DR.", "DR", "MR.", "MR", "MRS.", "MRS", "MS.", "MS", "MISS", "NURSE", "OFFICER",
    "DETECTIVE", "PROFESSOR", "PROF.", "PROF", "CAPTAIN", "CAPT.", "AGENT", "SERGEANT",
    "SGT.", "SIR", "LADY", "LORD",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    /// Accepts exactly `male` or `female` in any case.
    pub fn parse_declared(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterGenderEntry {
    pub canonical_name: String,
    pub gender: Gender,
    pub variants: Vec<String>,
}

impl CharacterGenderEntry {
    fn new(declared: &str, gender: Gender) -> Self {
        let canonical_name = normalize_name(declared);
        let mut variants = Vec::new();
        if let Some(stripped) = strip_title(&canonical_name) {
            variants.push(stripped.to_string());
        }
        if let Some(first) = first_name(&canonical_name) {
            if first != canonical_name && !variants.iter().any(|v| v == first) {
                variants.push(first.to_string());
            }
        }
        Self {
            canonical_name,
            gender,
            variants,
        }
    }

    /// Whether a script cue refers to this roster entry for main-character
    /// purposes: the full name, its first token, the name without a leading
    /// title, or the first name behind that title.
    pub fn is_named_by(&self, script_name: &str) -> bool {
        let name = normalize_name(script_name);
        if name == self.canonical_name {
            return true;
        }
        if self.canonical_name.split(' ').next() == Some(name.as_str()) {
            return true;
        }
        if strip_title(&self.canonical_name) == Some(name.as_str()) {
            return true;
        }
        first_name(&self.canonical_name) == Some(name.as_str())
    }
}

/// The parsed roster: entries in declaration order plus the lookup tables
/// used for fuzzy gender resolution.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<CharacterGenderEntry>,
    canonical: HashMap<String, Gender>,
    title_stripped: HashMap<String, Gender>,
    first_names: HashMap<String, Gender>,
    ambiguous: HashSet<String>,
}

impl Roster {
    /// Extracts the roster from plot text. A plot without a roster, or with
    /// only malformed bullets, yields an empty roster.
    pub fn extract(plot: &str) -> Self {
        let mut roster = Roster::default();
        let mut in_section = false;

        for line in plot.lines() {
            let trimmed = line.trim();
            let bare = trimmed.trim_matches(|c| c == '*' || c == '#').trim();

            if !in_section {
                let upper = bare.to_ascii_uppercase();
                if upper.starts_with("CHARACTERS") && upper.len() <= "CHARACTERS:".len() + 1 {
                    in_section = true;
                }
                continue;
            }

            if bare.to_ascii_uppercase().starts_with("ACT ") {
                break;
            }

            let Some(caps) = BULLET_RE.captures(trimmed) else {
                continue;
            };
            let Some(gender) = Gender::parse_declared(&caps["gender"]) else {
                debug!("Skipping roster bullet with unsupported gender: {}", trimmed);
                continue;
            };
            let entry = CharacterGenderEntry::new(&caps["name"], gender);
            if entry.canonical_name.is_empty() || roster.canonical.contains_key(&entry.canonical_name)
            {
                continue;
            }
            roster.canonical.insert(entry.canonical_name.clone(), gender);
            roster.entries.push(entry);
        }

        roster.index_variants();
        roster
    }

    fn index_variants(&mut self) {
        for entry in &self.entries {
            if let Some(stripped) = strip_title(&entry.canonical_name) {
                register_variant(
                    &mut self.title_stripped,
                    &mut self.ambiguous,
                    &self.canonical,
                    stripped,
                    entry.gender,
                );
            }
            if let Some(first) = first_name(&entry.canonical_name) {
                if first != entry.canonical_name {
                    register_variant(
                        &mut self.first_names,
                        &mut self.ambiguous,
                        &self.canonical,
                        first,
                        entry.gender,
                    );
                }
            }
        }
    }

    pub fn entries(&self) -> &[CharacterGenderEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First male entry in declaration order.
    pub fn main_male(&self) -> Option<&CharacterGenderEntry> {
        self.entries.iter().find(|e| e.gender == Gender::Male)
    }

    /// First female entry in declaration order.
    pub fn main_female(&self) -> Option<&CharacterGenderEntry> {
        self.entries.iter().find(|e| e.gender == Gender::Female)
    }

    pub fn resolver(&self) -> NameResolver<'_> {
        NameResolver { roster: self }
    }
}

fn register_variant(
    table: &mut HashMap<String, Gender>,
    ambiguous: &mut HashSet<String>,
    canonical: &HashMap<String, Gender>,
    key: &str,
    gender: Gender,
) {
    if canonical.contains_key(key) || ambiguous.contains(key) {
        return;
    }
    match table.get(key) {
        None => {
            table.insert(key.to_string(), gender);
        }
        Some(existing) if *existing == gender => {}
        Some(_) => {
            warn!(
                "Roster variant '{}' is shared by characters of different genders; ignoring it",
                key
            );
            table.remove(key);
            ambiguous.insert(key.to_string());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    Exact,
    TitleStripped,
    FirstName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameMatch {
    pub gender: Gender,
    pub strategy: MatchStrategy,
}

/// Ranked lookup of a script cue against the roster.
pub struct NameResolver<'a> {
    roster: &'a Roster,
}

impl NameResolver<'_> {
    pub fn resolve(&self, script_name: &str) -> Option<NameMatch> {
        let name = normalize_name(script_name);
        if name.is_empty() {
            return None;
        }

        if let Some(g) = self.roster.canonical.get(&name) {
            return Some(NameMatch {
                gender: *g,
                strategy: MatchStrategy::Exact,
            });
        }

        let untitled = strip_title(&name).unwrap_or(&name);
        let by_title = self
            .roster
            .title_stripped
            .get(untitled)
            .or_else(|| self.roster.canonical.get(untitled));
        if let Some(g) = by_title {
            return Some(NameMatch {
                gender: *g,
                strategy: MatchStrategy::TitleStripped,
            });
        }

        let first = first_name(&name)?;
        self.roster.first_names.get(first).map(|g| NameMatch {
            gender: *g,
            strategy: MatchStrategy::FirstName,
        })
    }
}

/// Upper-cases and collapses internal whitespace.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

pub fn is_title(token: &str) -> bool {
    TITLES.contains(&token)
}

/// `DR. LIAM CHEN` -> `LIAM CHEN`. `None` when there is no leading title or
/// nothing follows it.
pub fn strip_title(name: &str) -> Option<&str> {
    let (head, rest) = name.split_once(' ')?;
    if is_title(head) && !rest.trim().is_empty() {
        Some(rest.trim())
    } else {
        None
    }
}

/// First name behind any leading title, `None` for a bare title.
pub fn first_name(name: &str) -> Option<&str> {
    let base = strip_title(name).unwrap_or(name);
    let first = base.split(' ').next()?;
    if first.is_empty() || is_title(first) {
        None
    } else {
        Some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLOT: &str = "\
**CHARACTERS:**
- John Taylor (male)
- Marry Thompson (female)
- Dr. Liam Chen (male)
- Dr. Rachel Lee (Female)
- Crowley Jenkins (male)
- The Stranger (unknown)
- Broken bullet without gender

**ACT ONE - SETUP**
John Taylor (male) arrives in town.
";

    #[test]
    fn test_extracts_entries_in_order() {
        let roster = Roster::extract(PLOT);
        let names: Vec<&str> = roster
            .entries()
            .iter()
            .map(|e| e.canonical_name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "JOHN TAYLOR",
                "MARRY THOMPSON",
                "DR. LIAM CHEN",
                "DR. RACHEL LEE",
                "CROWLEY JENKINS"
            ]
        );
        assert_eq!(roster.main_male().unwrap().canonical_name, "JOHN TAYLOR");
        assert_eq!(roster.main_female().unwrap().canonical_name, "MARRY THOMPSON");
    }

    #[test]
    fn test_variants_include_title_stripped_and_first_name() {
        let roster = Roster::extract(PLOT);
        let liam = &roster.entries()[2];
        assert_eq!(liam.variants, vec!["LIAM CHEN".to_string(), "LIAM".to_string()]);

        let resolver = roster.resolver();
        let gender = |name: &str| resolver.resolve(name).map(|m| m.gender);
        assert_eq!(gender("LIAM CHEN"), Some(Gender::Male));
        assert_eq!(gender("RACHEL"), Some(Gender::Female));
        assert_eq!(gender("CROWLEY"), Some(Gender::Male));
    }

    #[test]
    fn test_missing_roster_is_empty_not_error() {
        let roster = Roster::extract("**ACT ONE**\nNothing declared here.");
        assert!(roster.is_empty());
        assert!(roster.main_male().is_none());
        assert!(roster.resolver().resolve("JOHN").is_none());
    }

    #[test]
    fn test_resolver_strategies_are_ranked() {
        let roster = Roster::extract(PLOT);
        let resolver = roster.resolver();

        let exact = resolver.resolve("john taylor").unwrap();
        assert_eq!(exact.strategy, MatchStrategy::Exact);

        let untitled = resolver.resolve("RACHEL LEE").unwrap();
        assert_eq!(untitled.strategy, MatchStrategy::TitleStripped);
        assert_eq!(untitled.gender, Gender::Female);

        let first = resolver.resolve("CROWLEY").unwrap();
        assert_eq!(first.strategy, MatchStrategy::FirstName);

        let titled_short = resolver.resolve("DR. LIAM").unwrap();
        assert_eq!(titled_short.strategy, MatchStrategy::FirstName);
        assert_eq!(titled_short.gender, Gender::Male);

        assert!(resolver.resolve("MARILY").is_none());
    }

    #[test]
    fn test_conflicting_first_names_are_dropped() {
        let plot = "CHARACTERS:\n- Alex Moore (male)\n- Alex Rivera (female)\n- Alex (female)\n";
        let roster = Roster::extract(plot);
        let resolver = roster.resolver();

        // The bare name is declared outright, so it is never a conflict.
        assert_eq!(resolver.resolve("ALEX").unwrap().gender, Gender::Female);
        assert_eq!(
            resolver.resolve("ALEX MOORE").unwrap().strategy,
            MatchStrategy::Exact
        );

        let plot = "CHARACTERS:\n- Sam Moore (male)\n- Sam Rivera (female)\n";
        let roster = Roster::extract(plot);
        assert!(roster.resolver().resolve("SAM").is_none());
    }

    #[test]
    fn test_is_named_by_main_character_forms() {
        let roster = Roster::extract(PLOT);
        let liam = &roster.entries()[2];
        assert!(liam.is_named_by("DR. LIAM CHEN"));
        assert!(liam.is_named_by("LIAM CHEN"));
        assert!(liam.is_named_by("LIAM"));
        assert!(!liam.is_named_by("CHEN"));

        let john = &roster.entries()[0];
        assert!(john.is_named_by("JOHN"));
        assert!(!john.is_named_by("TAYLOR"));
    }
}
