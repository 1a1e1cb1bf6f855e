use crate::services::llm::{chat_with_retry, LlmClient, LlmConfig};
use crate::services::script::{classify_line, strip_code_blocks, Act, LineKind};
use anyhow::{bail, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

const PLOT_SYSTEM_PROMPT: &str = "You are a master storyteller who writes tightly plotted three-act stories full of surprising but fair plot twists.";

const SCRIPT_SYSTEM_PROMPT: &str = "You are a screenwriter who adapts plots into scripts for multi-voice audiobook production. You follow formatting rules exactly.";

/// What the user wants a story about.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StoryBrief {
    pub genre: String,
    pub characters: String,
    pub setting: String,
    pub title: Option<String>,
}

impl StoryBrief {
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("genre", &self.genre),
            ("characters", &self.characters),
            ("setting", &self.setting),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();
        if !missing.is_empty() {
            bail!("Story brief is missing: {}", missing.join(", "));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotActs {
    pub one: String,
    pub two: String,
    pub three: String,
}

impl PlotActs {
    pub fn get(&self, act: Act) -> &str {
        match act {
            Act::One => &self.one,
            Act::Two => &self.two,
            Act::Three => &self.three,
        }
    }

    fn slot(&mut self, act: Act) -> &mut String {
        match act {
            Act::One => &mut self.one,
            Act::Two => &mut self.two,
            Act::Three => &mut self.three,
        }
    }
}

pub fn build_plot_prompt(brief: &StoryBrief) -> Result<String> {
    brief.validate()?;
    let title = brief
        .title
        .as_deref()
        .map(|t| format!("TITLE: {}\n", t.trim()))
        .unwrap_or_default();

    Ok(format!(
        r#"Write a three-act plot with at least two major plot twists.

{title}GENRE: {genre}
CHARACTERS: {characters}
SETTING: {setting}

Start with a character roster listing EVERY character who appears, one per line, with full names and exactly (male) or (female):

**CHARACTERS:**
- Dr. Sarah Chen (female)
- Marcus Reed (male)

Then write the three acts using exactly these headers and no other act headings:

**ACT ONE - SETUP**
Introduce the protagonist, the world and the inciting incident. Foreshadow later twists.

**ACT TWO - CONFRONTATION**
Rising complications, a MIDPOINT TWIST that changes direction, then escalating tension up to a crisis.

**ACT THREE - RESOLUTION**
A FINAL TWIST that recontextualizes the story, the climax, and a resolution that fits the {genre} genre.

Mark the gender of any new character in the roster, never inside the acts."#,
        title = title,
        genre = brief.genre.trim(),
        characters = brief.characters.trim(),
        setting = brief.setting.trim(),
    ))
}

pub fn build_script_prompt(plot: &str) -> Result<String> {
    if plot.trim().is_empty() {
        bail!("Cannot build a script prompt from an empty plot");
    }
    Ok(format!(
        r#"Convert this plot into an audiobook script.

PLOT:
{plot}

Rules:
1. Skip the CHARACTERS roster. Start directly with **ACT ONE**.
2. Use exactly the act headers **ACT ONE**, **ACT TWO** and **ACT THREE**, each on its own line.
3. Put every description, action and transition under a NARRATOR cue.
4. Put spoken lines under the speaker's name in capitals, e.g. SARAH CHEN. No (male)/(female) markers.
5. No parentheticals such as (whispers) in dialogue. Describe delivery in narration instead.
6. Alternate NARRATOR and dialogue blocks. Keep each act's events inside that act.

Example:

**ACT ONE**
NARRATOR
A dim office at night. Rain hammers the windows.

SARAH CHEN
Something doesn't add up. The timeline is wrong.

NARRATOR
The door bursts open. Marcus rushes in clutching a folder.

MARCUS REED
Sarah, you need to see this."#,
        plot = plot.trim()
    ))
}

/// Splits a plot into its acts. Text before the first act header (the roster)
/// is dropped; missing acts stay empty.
pub fn parse_plot_acts(plot: &str) -> PlotActs {
    let mut acts = PlotActs::default();
    let mut current: Option<Act> = None;

    for line in plot.lines() {
        if line.trim().is_empty() {
            if let Some(act) = current {
                let slot = acts.slot(act);
                if !slot.is_empty() {
                    slot.push('\n');
                }
            }
            continue;
        }
        if let LineKind::ActMarker(act) = classify_line(line) {
            current = Some(act);
            continue;
        }
        if let Some(act) = current {
            let slot = acts.slot(act);
            slot.push_str(line.trim_end());
            slot.push('\n');
        }
    }

    for act in Act::ALL {
        let slot = acts.slot(act);
        *slot = slot.trim().to_string();
    }
    acts
}

pub async fn generate_plot(llm: &dyn LlmClient, config: &LlmConfig, brief: &StoryBrief) -> Result<String> {
    let prompt = build_plot_prompt(brief)?;
    info!("Generating plot for a {} story...", brief.genre.trim());
    match chat_with_retry(llm, config, PLOT_SYSTEM_PROMPT, &prompt).await {
        Ok(text) => Ok(strip_code_blocks(&text)),
        Err(e) if config.offline_fallback => {
            warn!("Plot generation failed ({:#}), using offline plot", e);
            Ok(fallback_plot(brief))
        }
        Err(e) => Err(e),
    }
}

pub async fn generate_script(
    llm: &dyn LlmClient,
    config: &LlmConfig,
    plot: &str,
    brief: &StoryBrief,
) -> Result<String> {
    let prompt = build_script_prompt(plot)?;
    info!("Generating script...");
    match chat_with_retry(llm, config, SCRIPT_SYSTEM_PROMPT, &prompt).await {
        Ok(text) => Ok(strip_code_blocks(&text)),
        Err(e) if config.offline_fallback => {
            warn!("Script generation failed ({:#}), using offline script", e);
            Ok(fallback_script(brief))
        }
        Err(e) => Err(e),
    }
}

pub fn fallback_plot(brief: &StoryBrief) -> String {
    format!(
        r#"**CHARACTERS:**
- Alex Morgan (female)
- Daniel Reyes (male)

**ACT ONE - SETUP**
Alex Morgan lives an ordinary life in {setting} until a strange event in this {genre} story pulls her away from it. Daniel Reyes, an old friend, offers to help.

**ACT TWO - CONFRONTATION**
The search grows dangerous. MIDPOINT TWIST: Alex learns she is not who she thought she was. Daniel's help starts to look like something else.

**ACT THREE - RESOLUTION**
FINAL TWIST: Daniel has been protecting her from the truth all along. Alex faces it and chooses her own path."#,
        setting = brief.setting.trim(),
        genre = brief.genre.trim(),
    )
}

pub fn fallback_script(brief: &StoryBrief) -> String {
    format!(
        r#"**ACT ONE**
NARRATOR
{setting}. Alex Morgan stands at a window, watching the street below.

ALEX MORGAN
Something is different tonight. I can feel it.

NARRATOR
Footsteps behind her. Daniel Reyes sets down two cups of coffee.

DANIEL REYES
You always say that. Drink, then tell me what you saw.

**ACT TWO**
NARRATOR
Days later, the files on the desk tell a story neither of them expected.

ALEX MORGAN
These records have my name on them. But I was never there.

DANIEL REYES
Then someone wanted you to believe you were.

**ACT THREE**
NARRATOR
The last door opens onto an empty room and a single photograph.

DANIEL REYES
I kept it from you to keep you safe.

ALEX MORGAN
Then it's time I kept myself safe.

NARRATOR
She walks out into the morning, and does not look back."#,
        setting = brief.setting.trim(),
    )
}
