//! Screenplay tokenizer.
//!
//! Generated scripts are plain text: bolded `**ACT ONE**` markers, ALL-CAPS
//! character cues, and free lines of narration or dialogue between them. A
//! single forward pass turns that into ordered [`ScriptElement`]s.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

pub const NARRATOR: &str = "NARRATOR";

/// Cue lines are short; anything this long or longer is prose.
const MAX_CUE_CHARS: usize = 50;

static ACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^ACT\s+(ONE|TWO|THREE|III|II|I|1|2|3)\b(?:\s*[-:–—].*)?$")
        .expect("valid act pattern")
});

static CUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[A-Z][A-Z .]*?[A-Z.])\s*(?:\((?P<note>[^)]*)\))?\s*:?$")
        .expect("valid cue pattern")
});

static SCENE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:INT\.|EXT\.|INT\./EXT\.|INT/EXT\.?|I/E\.?|FADE IN|FADE OUT|FADE TO|CUT TO|DISSOLVE TO|SMASH CUT|MATCH CUT)")
        .expect("valid scene heading pattern")
});

static TRANSITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:FADE IN|FADE OUT|FADE TO|CUT TO|DISSOLVE TO|SMASH CUT|MATCH CUT)")
        .expect("valid transition pattern")
});

static FULL_PARENTHETICAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(.*\)$").expect("valid parenthetical pattern"));

static INLINE_PARENTHETICAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("valid parenthetical pattern"));

const QUOTES: &[char] = &['"', '\'', '“', '”', '‘', '’'];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Act {
    #[default]
    One,
    Two,
    Three,
}

impl Act {
    pub const ALL: [Act; 3] = [Act::One, Act::Two, Act::Three];

    fn from_marker(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "ONE" | "I" | "1" => Some(Act::One),
            "TWO" | "II" | "2" => Some(Act::Two),
            "THREE" | "III" | "3" => Some(Act::Three),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Act::One => "ONE",
            Act::Two => "TWO",
            Act::Three => "THREE",
        }
    }

    /// Directory name for this act's clips, e.g. `voice-act-one`.
    pub fn folder_name(&self) -> String {
        format!("voice-act-{}", self.label().to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementKind {
    Narration,
    Dialogue,
    SceneHeading,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptElement {
    pub character: String,
    pub text: String,
    pub kind: ElementKind,
    pub act: Act,
    pub sequence: usize,
}

/// What a single trimmed, non-empty screenplay line is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    ActMarker(Act),
    CharacterCue { name: String, note: Option<String> },
    SceneHeading { transition: bool },
    PlainText,
}

pub fn classify_line(line: &str) -> LineKind {
    let line = line.trim();
    let bolded = line.starts_with('*') || line.starts_with('#');
    let bare = line.trim_matches(|c| c == '*' || c == '#').trim();

    if let Some(caps) = ACT_RE.captures(bare) {
        let shouted = bare == bare.to_uppercase();
        if bolded || shouted {
            if let Some(act) = Act::from_marker(&caps[1]) {
                return LineKind::ActMarker(act);
            }
        }
    }

    if SCENE_RE.is_match(bare) {
        return LineKind::SceneHeading {
            transition: TRANSITION_RE.is_match(bare),
        };
    }

    if bare.chars().count() < MAX_CUE_CHARS {
        if let Some(caps) = CUE_RE.captures(bare) {
            let name = caps["name"].split_whitespace().collect::<Vec<_>>().join(" ");
            let note = caps.name("note").map(|m| m.as_str().trim().to_string());
            return LineKind::CharacterCue { name, note };
        }
    }

    LineKind::PlainText
}

#[derive(Debug, Clone)]
pub struct TokenizerOptions {
    pub narrator_name: String,
    pub skip_scene_headings: bool,
    pub skip_transitions: bool,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            narrator_name: NARRATOR.to_string(),
            skip_scene_headings: false,
            skip_transitions: false,
        }
    }
}

struct Tokenizer<'o> {
    options: &'o TokenizerOptions,
    act: Act,
    character: Option<String>,
    narration: Vec<String>,
    dialogue: Vec<String>,
    next_sequence: usize,
    elements: Vec<ScriptElement>,
}

impl<'o> Tokenizer<'o> {
    fn new(options: &'o TokenizerOptions) -> Self {
        Self {
            options,
            act: Act::default(),
            character: None,
            narration: Vec::new(),
            dialogue: Vec::new(),
            next_sequence: 0,
            elements: Vec::new(),
        }
    }

    fn emit(&mut self, character: String, text: String, kind: ElementKind) {
        self.elements.push(ScriptElement {
            character,
            text,
            kind,
            act: self.act,
            sequence: self.next_sequence,
        });
        self.next_sequence += 1;
    }

    fn flush_narration(&mut self) {
        if self.narration.is_empty() {
            return;
        }
        let text = self.narration.join(" ");
        self.narration.clear();
        self.emit(self.options.narrator_name.clone(), text, ElementKind::Narration);
    }

    fn flush_dialogue(&mut self) {
        if self.dialogue.is_empty() {
            return;
        }
        let text = self.dialogue.join(" ");
        self.dialogue.clear();
        if let Some(character) = self.character.clone() {
            self.emit(character, text, ElementKind::Dialogue);
        }
    }

    fn flush_all(&mut self) {
        self.flush_narration();
        self.flush_dialogue();
    }

    fn feed(&mut self, line: &str) {
        match classify_line(line) {
            LineKind::ActMarker(act) => {
                self.flush_all();
                self.character = None;
                self.act = act;
            }
            LineKind::CharacterCue { name, .. } => {
                self.flush_all();
                if name.eq_ignore_ascii_case(&self.options.narrator_name) {
                    self.character = None;
                } else {
                    self.character = Some(name);
                }
            }
            // A heading inside a speech is dropped and the speaker keeps talking.
            LineKind::SceneHeading { .. } if self.character.is_some() => {}
            LineKind::SceneHeading { transition } => {
                self.flush_narration();
                let suppressed = if transition {
                    self.options.skip_transitions
                } else {
                    self.options.skip_scene_headings
                };
                if !suppressed {
                    let heading = line.trim().trim_matches('*').trim().to_string();
                    self.emit(
                        self.options.narrator_name.clone(),
                        heading,
                        ElementKind::SceneHeading,
                    );
                }
            }
            LineKind::PlainText => {
                if self.character.is_some() {
                    if let Some(clean) = clean_dialogue_line(line) {
                        self.dialogue.push(clean);
                    }
                } else {
                    self.narration.push(line.trim().to_string());
                }
            }
        }
        debug_assert!(self.narration.is_empty() || self.dialogue.is_empty());
    }

    fn finish(mut self) -> Vec<ScriptElement> {
        self.flush_all();
        self.elements
    }
}

/// Tokenizes a whole screenplay. Never fails: text without any recognizable
/// structure comes back as narration.
pub fn tokenize(script: &str, options: &TokenizerOptions) -> Vec<ScriptElement> {
    let mut tokenizer = Tokenizer::new(options);
    for line in script.lines() {
        if line.trim().is_empty() {
            continue;
        }
        tokenizer.feed(line);
    }
    tokenizer.finish()
}

/// Removes stage directions and wrapping quotes from one dialogue line.
/// Returns `None` when nothing speakable is left.
pub fn clean_dialogue_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if FULL_PARENTHETICAL_RE.is_match(trimmed) {
        return None;
    }
    let without_parens = INLINE_PARENTHETICAL_RE.replace_all(trimmed, " ");
    let unquoted = without_parens.trim().trim_matches(QUOTES);
    let clean = unquoted.split_whitespace().collect::<Vec<_>>().join(" ");
    if clean.is_empty() {
        None
    } else {
        Some(clean)
    }
}

/// Speaking characters in order of first appearance, narrator excluded.
pub fn distinct_characters(elements: &[ScriptElement], narrator: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for element in elements {
        if element.kind != ElementKind::Dialogue
            || element.character.eq_ignore_ascii_case(narrator)
        {
            continue;
        }
        if seen.insert(element.character.clone()) {
            ordered.push(element.character.clone());
        }
    }
    ordered
}

pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    if s.starts_with("```") {
        let body = s.trim_start_matches("```");
        let body = match body.find('\n') {
            Some(idx) if !body[..idx].trim().contains(' ') => &body[idx + 1..],
            _ => body,
        };
        body.trim_end_matches("```").trim().to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(script: &str) -> Vec<ScriptElement> {
        tokenize(script, &TokenizerOptions::default())
    }

    #[test]
    fn test_two_act_scenario() {
        let script = "**ACT ONE**\nNARRATOR\nRain falls.\n\nSARAH (female)\nI'm leaving.\n\n**ACT TWO**\nNARRATOR\nDoor opens.";
        let elements = run(script);
        assert_eq!(
            elements,
            vec![
                ScriptElement {
                    character: "NARRATOR".to_string(),
                    text: "Rain falls.".to_string(),
                    kind: ElementKind::Narration,
                    act: Act::One,
                    sequence: 0,
                },
                ScriptElement {
                    character: "SARAH".to_string(),
                    text: "I'm leaving.".to_string(),
                    kind: ElementKind::Dialogue,
                    act: Act::One,
                    sequence: 1,
                },
                ScriptElement {
                    character: "NARRATOR".to_string(),
                    text: "Door opens.".to_string(),
                    kind: ElementKind::Narration,
                    act: Act::Two,
                    sequence: 2,
                },
            ]
        );
    }

    #[test]
    fn test_inline_parenthetical_is_removed() {
        let elements = run("JOHN\n(whispering) I know the truth.");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].text, "I know the truth.");
        assert_eq!(elements[0].kind, ElementKind::Dialogue);
    }

    #[test]
    fn test_whole_line_parenthetical_and_quotes_dropped() {
        let elements = run("MARCUS REED\n(beat)\n\"Sarah! I found something.\"\nYou need to see this.");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].character, "MARCUS REED");
        assert_eq!(elements[0].text, "Sarah! I found something. You need to see this.");
    }

    #[test]
    fn test_gender_marker_excluded_from_cue_name() {
        for (line, expected) in [
            ("JOHN (male)", "JOHN"),
            ("DR. RACHEL LEE (female)", "DR. RACHEL LEE"),
            ("NARRATOR (V.O.)", "NARRATOR"),
            ("SARAH:", "SARAH"),
        ] {
            match classify_line(line) {
                LineKind::CharacterCue { name, .. } => assert_eq!(name, expected),
                other => panic!("{} classified as {:?}", line, other),
            }
        }
    }

    #[test]
    fn test_classifier_variants() {
        assert_eq!(classify_line("**ACT THREE**"), LineKind::ActMarker(Act::Three));
        assert_eq!(
            classify_line("**ACT TWO - CONFRONTATION**"),
            LineKind::ActMarker(Act::Two)
        );
        assert_eq!(classify_line("Act two begins here."), LineKind::PlainText);
        assert_eq!(
            classify_line("INT. WAREHOUSE - NIGHT"),
            LineKind::SceneHeading { transition: false }
        );
        assert_eq!(
            classify_line("FADE OUT."),
            LineKind::SceneHeading { transition: true }
        );
        assert_eq!(classify_line("Fade away, my friend."), LineKind::PlainText);
        assert_eq!(
            classify_line("A VERY LONG LINE OF SHOUTED TEXT THAT KEEPS GOING PAST ANY CUE"),
            LineKind::PlainText
        );
    }

    #[test]
    fn test_narrator_cue_reenters_narration_mid_script() {
        let script = "SARAH\nHello.\nNARRATOR\nShe turns away.\nThe wind howls.\nSARAH\nGoodbye.";
        let elements = run(script);
        let kinds: Vec<ElementKind> = elements.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ElementKind::Dialogue, ElementKind::Narration, ElementKind::Dialogue]
        );
        assert_eq!(elements[1].text, "She turns away. The wind howls.");
        assert_eq!(elements[1].character, NARRATOR);
    }

    #[test]
    fn test_scene_heading_emitted_standalone_and_suppressible() {
        let script = "FADE IN:\nINT. OFFICE - NIGHT\nRain hammers the glass.\nSARAH CHEN\nSomething is wrong.";
        let elements = run(script);
        assert_eq!(elements.len(), 4);
        assert_eq!(elements[0].kind, ElementKind::SceneHeading);
        assert_eq!(elements[1].text, "INT. OFFICE - NIGHT");
        assert_eq!(elements[2].kind, ElementKind::Narration);
        assert_eq!(elements[3].character, "SARAH CHEN");

        let options = TokenizerOptions {
            skip_transitions: true,
            ..Default::default()
        };
        let elements = tokenize(script, &options);
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].text, "INT. OFFICE - NIGHT");

        let options = TokenizerOptions {
            skip_transitions: true,
            skip_scene_headings: true,
            ..Default::default()
        };
        assert_eq!(tokenize(script, &options).len(), 2);
    }

    #[test]
    fn test_scene_heading_inside_speech_keeps_speaker() {
        let elements = run("SARAH\nHello.\nINT. HALL - NIGHT\nStill talking.");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].character, "SARAH");
        assert_eq!(elements[0].kind, ElementKind::Dialogue);
        assert_eq!(elements[0].text, "Hello. Still talking.");
    }

    #[test]
    fn test_act_marker_mid_dialogue_closes_speech_in_previous_act() {
        let script = "**ACT ONE**\nJOHN\nI'll be back.\n**ACT TWO**\nThe house is empty.";
        let elements = run(script);
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].character, "JOHN");
        assert_eq!(elements[0].act, Act::One);
        assert_eq!(elements[1].character, NARRATOR);
        assert_eq!(elements[1].kind, ElementKind::Narration);
        assert_eq!(elements[1].act, Act::Two);
    }

    #[test]
    fn test_act_defaults_to_one_and_sequence_is_global() {
        let script = "Opening narration.\n**ACT TWO**\nJOHN\nLine one.\n**ACT THREE**\nJOHN\nLine two.";
        let elements = run(script);
        let tags: Vec<(Act, usize)> = elements.iter().map(|e| (e.act, e.sequence)).collect();
        assert_eq!(tags, vec![(Act::One, 0), (Act::Two, 1), (Act::Three, 2)]);
    }

    #[test]
    fn test_speaking_order_preserved() {
        let script = "\
**ACT ONE**
NARRATOR
A dim office.
SARAH CHEN
Something doesn't add up.
MARCUS REED
I found something.
SARAH CHEN
What is it?
NARRATOR
He drops the folder.
MARCUS REED
(quietly)
The mayor's daughter.";
        let elements = run(script);
        let order: Vec<&str> = elements
            .iter()
            .map(|e| match e.kind {
                ElementKind::Dialogue => e.character.as_str(),
                _ => e.text.as_str(),
            })
            .collect();
        assert_eq!(
            order,
            vec![
                "A dim office.",
                "SARAH CHEN",
                "MARCUS REED",
                "SARAH CHEN",
                "He drops the folder.",
                "MARCUS REED"
            ]
        );
        let sequences: Vec<usize> = elements.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, (0..elements.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_cue_without_lines_emits_nothing() {
        let elements = run("JOHN\n(pause)\nSARAH\nYes.");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].character, "SARAH");
    }

    #[test]
    fn test_distinct_characters_first_seen_order() {
        let elements = run("ZED\nHi.\nNARRATOR\nWind.\nAMY\nHey.\nZED\nBye.");
        assert_eq!(distinct_characters(&elements, NARRATOR), vec!["ZED", "AMY"]);
    }

    #[test]
    fn test_strip_code_blocks() {
        assert_eq!(strip_code_blocks("plain"), "plain");
        assert_eq!(strip_code_blocks("```\nNARRATOR\nHi.\n```"), "NARRATOR\nHi.");
        assert_eq!(strip_code_blocks("```text\nJOHN\nYo.\n```"), "JOHN\nYo.");
        assert_eq!(strip_code_blocks("  ```json  \n  {}  \n  ```  "), "{}");
    }
}
