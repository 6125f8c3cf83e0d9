use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Literal that, present in the triggering message, asks for the full treatment.
pub const OPT_IN_TOKEN: &str = "uwu";

/// Longer replies are sent as-is.
const MAX_STYLIZE_CHARS: usize = 16_000;
const STUTTER_CHANCE: f64 = 0.15;
const FACE_CHANCE: f64 = 0.5;

const FACES: &[&str] = &[
    "UwU", "owo", ">w<", "^w^", ":3", "x3", "(ᵘʷᵘ)", "(・`ω´・)", "(◕ᴗ◕✿)", "ʕ•ᴥ•ʔ",
];

/// Which parts of the transform to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StyleFlags {
    /// r/l → w, "na" → "nya", "ove" → "uv", "you" → "yu".
    pub phonetic: bool,
    /// "h-hello".
    pub stutter: bool,
    /// Kaomoji after sentences and at the end.
    pub faces: bool,
}

impl StyleFlags {
    pub const INTENSE: Self = Self {
        phonetic: true,
        stutter: true,
        faces: true,
    };

    pub const MILD: Self = Self {
        phonetic: false,
        stutter: false,
        faces: true,
    };

    /// The triggering message's opt-in wins over the persistent flag.
    pub fn select(trigger_hint: &str, style_enabled: bool) -> Option<Self> {
        if trigger_hint.to_lowercase().contains(OPT_IN_TOKEN) {
            Some(Self::INTENSE)
        } else if style_enabled {
            Some(Self::MILD)
        } else {
            None
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StyleError {
    #[error("text too long to stylize: {len} chars (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("text contains a code block")]
    CodeBlock,
}

/// Restyle an outbound reply. Never fails: on any transform error the
/// input comes back unchanged.
pub fn stylize(text: &str, trigger_hint: &str, style_enabled: bool) -> String {
    stylize_with(&mut rand::thread_rng(), text, trigger_hint, style_enabled)
}

/// [`stylize`] with a caller-supplied random source.
pub fn stylize_with<R: Rng>(
    rng: &mut R,
    text: &str,
    trigger_hint: &str,
    style_enabled: bool,
) -> String {
    let Some(flags) = StyleFlags::select(trigger_hint, style_enabled) else {
        return text.to_string();
    };
    match uwuify(rng, text, flags) {
        Ok(styled) => styled,
        Err(e) => {
            debug!(error = %e, "stylization skipped");
            text.to_string()
        }
    }
}

pub fn uwuify<R: Rng>(rng: &mut R, text: &str, flags: StyleFlags) -> Result<String, StyleError> {
    let len = text.chars().count();
    if len > MAX_STYLIZE_CHARS {
        return Err(StyleError::TooLong {
            len,
            max: MAX_STYLIZE_CHARS,
        });
    }
    if text.contains("```") {
        return Err(StyleError::CodeBlock);
    }
    if text.trim().is_empty() {
        return Ok(text.to_string());
    }

    let mut out = String::with_capacity(text.len() + text.len() / 4);
    let mut ends_with_face = false;

    for token in tokens(text) {
        if token.chars().all(char::is_whitespace) {
            out.push_str(token);
            continue;
        }
        ends_with_face = false;
        if is_protected(token) {
            out.push_str(token);
            continue;
        }

        let mut word = if flags.phonetic {
            phonetic(token)
        } else {
            token.to_string()
        };
        if flags.stutter && word.starts_with(char::is_alphabetic) && rng.gen_bool(STUTTER_CHANCE)
        {
            word = stutter(&word);
        }
        out.push_str(&word);

        if flags.faces && ends_sentence(token) && rng.gen_bool(FACE_CHANCE) {
            out.push(' ');
            out.push_str(face(rng));
            ends_with_face = true;
        }
    }

    if flags.faces && !ends_with_face {
        out.truncate(out.trim_end().len());
        out.push(' ');
        out.push_str(face(rng));
    }

    Ok(out)
}

/// Alternating runs of whitespace and non-whitespace.
fn tokens(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_space: Option<bool> = None;

    for (i, c) in text.char_indices() {
        let space = c.is_whitespace();
        if in_space.is_some_and(|s| s != space) {
            out.push(&text[start..i]);
            start = i;
        }
        in_space = Some(space);
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

/// Mentions, custom emoji, links and inline code must survive verbatim.
fn is_protected(token: &str) -> bool {
    token.starts_with('<') || token.starts_with('`') || token.contains("://")
}

fn ends_sentence(token: &str) -> bool {
    token.ends_with(['.', '!', '?'])
}

fn phonetic(word: &str) -> String {
    let chars: Vec<char> = word.chars().collect();
    let mut out = String::with_capacity(word.len() + 2);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if lower_eq(&chars[i..], "ove") {
            out.push(if c.is_uppercase() { 'U' } else { 'u' });
            out.push(if chars[i + 1].is_uppercase() { 'V' } else { 'v' });
            i += 3;
            continue;
        }
        if lower_eq(&chars[i..], "you") {
            out.push(c);
            out.push(chars[i + 2]);
            i += 3;
            continue;
        }

        match c {
            'r' | 'l' => out.push('w'),
            'R' | 'L' => out.push('W'),
            'n' | 'N' if next.is_some_and(is_vowel) => {
                out.push(c);
                out.push(if next.is_some_and(char::is_uppercase) { 'Y' } else { 'y' });
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

fn lower_eq(chars: &[char], pat: &str) -> bool {
    let n = pat.chars().count();
    chars.len() >= n
        && chars[..n]
            .iter()
            .zip(pat.chars())
            .all(|(a, b)| a.to_ascii_lowercase() == b)
}

fn is_vowel(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

fn stutter(word: &str) -> String {
    match word.chars().next() {
        Some(first) => format!("{first}-{word}"),
        None => String::new(),
    }
}

fn face<R: Rng>(rng: &mut R) -> &'static str {
    FACES.choose(rng).copied().unwrap_or("UwU")
}
