//! Voice assignment: who speaks with which voice for one provider.

use crate::services::roster::{first_name, normalize_name, Gender, Roster};
use crate::services::tts::SpeechProvider;
use anyhow::{bail, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const FEMALE_NAMES: &[&str] = &[
    "SARAH", "EMILY", "EMMA", "ANNA", "LUCY", "OLIVIA", "AVA", "MIA", "SOPHIA", "ISABELLA",
    "CHARLOTTE", "RACHEL", "BELLA", "ELLI", "AMELIA", "GRACE", "ELLA", "LILY", "JESSICA",
    "JENNIFER", "LISA", "MICHELLE", "AMANDA", "STEPHANIE", "NICOLE", "HANNAH", "MADISON",
    "CHLOE",
];

const MALE_NAMES: &[&str] = &[
    "JOHN", "JACK", "JAMES", "MIKE", "MICHAEL", "MARCUS", "ADAM", "ANTONI", "ARNOLD", "HENRY",
    "WILLIAM", "LIAM", "NOAH", "SAM", "JOSH", "SCOTT", "DAVID", "ROBERT", "DANIEL", "MATTHEW",
    "JOSEPH", "ANDREW", "RYAN", "CHRISTOPHER", "BRIAN", "KEVIN", "THOMAS", "JASON", "BRANDON",
    "ERIC", "TYLER", "JUSTIN", "BENJAMIN", "JACOB", "ALEXANDER", "NATHAN", "JONATHAN", "LUKE",
    "MARK", "PAUL", "PETER", "STEVEN", "PATRICK", "SEAN", "KYLE", "DEREK", "CHAD", "TRAVIS",
    "CONNOR", "ETHAN", "OLIVER", "SEBASTIAN", "OWEN", "CALEB", "DYLAN", "LUCAS", "MASON",
    "LOGAN", "CARTER", "JACKSON", "HUNTER", "AARON", "GABRIEL", "JULIAN", "WYATT", "ISAAC",
    "CHARLES", "GEORGE", "FRANK", "RICHARD", "ANTHONY", "DONALD", "KENNETH", "GARY", "LARRY",
    "TERRY", "JERRY", "DENNIS", "WAYNE", "RANDY", "GREGORY", "RONALD", "TIMOTHY", "EDWARD",
    "JEFFREY", "LAWRENCE",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub id: String,
    pub rate: f32,
    pub pitch: f32,
}

impl VoiceProfile {
    pub fn plain(id: &str) -> Self {
        Self::with_prosody(id, 1.0, 0.0)
    }

    pub fn with_prosody(id: &str, rate: f32, pitch: f32) -> Self {
        Self {
            id: id.to_string(),
            rate,
            pitch,
        }
    }
}

/// The voices one provider offers for each role tier.
#[derive(Debug, Clone)]
pub struct VoiceCatalog {
    pub narrator: VoiceProfile,
    pub main_male: Option<VoiceProfile>,
    pub main_female: Option<VoiceProfile>,
    pub supporting_male: Vec<VoiceProfile>,
    pub supporting_female: Vec<VoiceProfile>,
}

impl VoiceCatalog {
    /// A catalog where every role uses the same voice.
    pub fn single(voice: VoiceProfile) -> Self {
        Self {
            narrator: voice.clone(),
            main_male: None,
            main_female: None,
            supporting_male: vec![voice.clone()],
            supporting_female: vec![voice],
        }
    }

    /// Whether `id` names one of this catalog's voices, ignoring case.
    pub fn knows(&self, id: &str) -> bool {
        std::iter::once(&self.narrator)
            .chain(self.main_male.iter())
            .chain(self.main_female.iter())
            .chain(self.supporting_male.iter())
            .chain(self.supporting_female.iter())
            .any(|v| v.id.eq_ignore_ascii_case(id.trim()))
    }

    fn validate(&self) -> Result<()> {
        if self.supporting_male.is_empty() || self.supporting_female.is_empty() {
            bail!("Voice catalog needs at least one supporting male and one supporting female voice");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoiceRole {
    Narrator,
    MainMale,
    MainFemale,
    Supporting,
    Override,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenderSource {
    Roster,
    NameTable,
    NamePattern,
    MainRole,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedVoice {
    pub voice: VoiceProfile,
    pub role: VoiceRole,
    pub gender: Gender,
    pub gender_source: GenderSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceAssignment {
    pub narrator: String,
    pub voices: BTreeMap<String, AssignedVoice>,
}

impl VoiceAssignment {
    pub fn get(&self, character: &str) -> Option<&AssignedVoice> {
        self.voices.get(character)
    }

    /// Voice for a character, or the narrator's voice for anyone not assigned.
    pub fn voice_for(&self, character: &str) -> Option<&VoiceProfile> {
        self.voices
            .get(character)
            .or_else(|| self.voices.get(&self.narrator))
            .map(|a| &a.voice)
    }
}

/// Gender from the static first-name tables or the trailing `A` pattern.
pub fn guess_gender(name: &str) -> (Gender, GenderSource) {
    let name = normalize_name(name);
    let Some(first) = first_name(&name) else {
        return (Gender::Unknown, GenderSource::None);
    };
    if FEMALE_NAMES.contains(&first) {
        (Gender::Female, GenderSource::NameTable)
    } else if MALE_NAMES.contains(&first) {
        (Gender::Male, GenderSource::NameTable)
    } else if first.len() > 1 && first.ends_with('A') {
        (Gender::Female, GenderSource::NamePattern)
    } else {
        (Gender::Unknown, GenderSource::None)
    }
}

pub struct VoiceResolver<'a> {
    roster: &'a Roster,
    overrides: HashMap<String, String>,
    narrator_name: String,
}

impl<'a> VoiceResolver<'a> {
    pub fn new(
        roster: &'a Roster,
        overrides: &BTreeMap<String, String>,
        narrator_name: &str,
    ) -> Self {
        let overrides = overrides
            .iter()
            .map(|(name, voice)| (normalize_name(name), voice.clone()))
            .collect();
        Self {
            roster,
            overrides,
            narrator_name: narrator_name.to_string(),
        }
    }

    fn override_for(&self, name: &str, accepts: &dyn Fn(&str) -> bool) -> Option<VoiceProfile> {
        let id = self.overrides.get(&normalize_name(name))?;
        if accepts(id) {
            Some(VoiceProfile::plain(id))
        } else {
            warn!("Voice override {} for {} does not exist on this provider, ignoring it", id, name);
            None
        }
    }

    fn gender_of(&self, name: &str) -> (Gender, GenderSource) {
        if let Some(hit) = self.roster.resolver().resolve(name) {
            return (hit.gender, GenderSource::Roster);
        }
        guess_gender(name)
    }

    /// Assigns voices to `characters`, given in order of first appearance.
    /// The narrator is always included. Every override is taken as is.
    pub fn assign(&self, characters: &[String], catalog: &VoiceCatalog) -> Result<VoiceAssignment> {
        self.assign_checked(characters, catalog, &|_| true)
    }

    /// Like [`assign`](Self::assign) against a provider's own catalog, keeping
    /// only the overrides that provider can speak with.
    pub fn assign_for(
        &self,
        characters: &[String],
        provider: &dyn SpeechProvider,
    ) -> Result<VoiceAssignment> {
        let catalog = provider.catalog();
        self.assign_checked(characters, &catalog, &|id| provider.accepts_voice(id))
    }

    fn assign_checked(
        &self,
        characters: &[String],
        catalog: &VoiceCatalog,
        accepts: &dyn Fn(&str) -> bool,
    ) -> Result<VoiceAssignment> {
        catalog.validate()?;

        let mut voices = BTreeMap::new();
        let narrator = match self.override_for(&self.narrator_name, accepts) {
            Some(voice) => AssignedVoice {
                voice,
                role: VoiceRole::Override,
                gender: Gender::Unknown,
                gender_source: GenderSource::None,
            },
            None => AssignedVoice {
                voice: catalog.narrator.clone(),
                role: VoiceRole::Narrator,
                gender: Gender::Unknown,
                gender_source: GenderSource::None,
            },
        };
        voices.insert(self.narrator_name.clone(), narrator);

        let main_male = self.roster.main_male();
        let main_female = self.roster.main_female();
        let mut main_male_taken = false;
        let mut main_female_taken = false;

        let unknown_pool: Vec<&VoiceProfile> = catalog
            .supporting_female
            .iter()
            .chain(catalog.supporting_male.iter())
            .collect();
        let (mut male_idx, mut female_idx, mut unknown_idx) = (0usize, 0usize, 0usize);

        for name in characters {
            if voices.contains_key(name) || name.eq_ignore_ascii_case(&self.narrator_name) {
                continue;
            }

            let is_main_male = main_male.is_some_and(|e| e.is_named_by(name));
            let is_main_female = main_female.is_some_and(|e| e.is_named_by(name));

            let (gender, gender_source) = if is_main_male {
                (Gender::Male, GenderSource::MainRole)
            } else if is_main_female {
                (Gender::Female, GenderSource::MainRole)
            } else {
                self.gender_of(name)
            };

            let assigned = if is_main_male && !main_male_taken && catalog.main_male.is_some() {
                main_male_taken = true;
                catalog.main_male.clone().map(|voice| (voice, VoiceRole::MainMale))
            } else if is_main_female && !main_female_taken && catalog.main_female.is_some() {
                main_female_taken = true;
                catalog
                    .main_female
                    .clone()
                    .map(|voice| (voice, VoiceRole::MainFemale))
            } else {
                None
            };

            let (voice, role) = match assigned {
                Some(hit) => hit,
                None => {
                    let voice = match gender {
                        Gender::Male => {
                            let v = &catalog.supporting_male[male_idx % catalog.supporting_male.len()];
                            male_idx += 1;
                            v.clone()
                        }
                        Gender::Female => {
                            let v = &catalog.supporting_female
                                [female_idx % catalog.supporting_female.len()];
                            female_idx += 1;
                            v.clone()
                        }
                        Gender::Unknown => {
                            warn!("Could not determine gender for {}, using shared pool", name);
                            let v = unknown_pool[unknown_idx % unknown_pool.len()];
                            unknown_idx += 1;
                            v.clone()
                        }
                    };
                    (voice, VoiceRole::Supporting)
                }
            };

            let entry = match self.override_for(name, accepts) {
                Some(voice) => AssignedVoice {
                    voice,
                    role: VoiceRole::Override,
                    gender,
                    gender_source,
                },
                None => AssignedVoice {
                    voice,
                    role,
                    gender,
                    gender_source,
                },
            };
            debug!(
                "{} -> {} ({:?}, {})",
                name,
                entry.voice.id,
                entry.role,
                entry.gender.as_str()
            );
            voices.insert(name.clone(), entry);
        }

        Ok(VoiceAssignment {
            narrator: self.narrator_name.clone(),
            voices,
        })
    }
}
