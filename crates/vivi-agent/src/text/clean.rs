use regex::Regex;

/// Removes the artifacts a chat model tends to echo back from the prompt
/// format: reply citations, its own `-sent by Name#1234` signature and
/// stray `#1234` discriminators.
///
/// Patterns are compiled once per persona name.
pub struct ReplyCleaner {
    citation: Regex,
    signature: Regex,
    name_prefix: Regex,
    discriminator: Regex,
}

impl ReplyCleaner {
    pub fn new(persona_name: &str) -> Result<Self, regex::Error> {
        let name = name_pattern(persona_name);
        Ok(Self {
            citation: Regex::new(r#"[ \t]*\(?[rR]eplying to\b[^\n]*"#)?,
            signature: Regex::new(&format!(
                r#"[-–(][ \t]?(?:sent\s+by\s+)?"?{name}\b(?:#\d{{4}})?"?\)?:?[ \t]?"#
            ))?,
            name_prefix: Regex::new(&format!(r#"^\s*"?{name}\b(?:#\d{{4}})?"?:\s*"#))?,
            discriminator: Regex::new(r"#\d{4}\b")?,
        })
    }

    /// Strip citation, then self-attribution, then discriminators.
    /// Text without any of them passes through untouched (apart from
    /// surrounding whitespace).
    pub fn clean(&self, raw: &str) -> String {
        let text = self.citation.replace_all(raw, "");
        let text = self.signature.replace_all(&text, "");
        let text = self.name_prefix.replace(&text, "");
        let text = self.discriminator.replace_all(&text, "");
        text.trim().to_string()
    }
}

/// Case-insensitive name that tolerates a space between letters ("Vi Vi").
fn name_pattern(name: &str) -> String {
    let letters: Vec<String> = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| regex::escape(&c.to_string()))
        .collect();
    format!(r"(?i:{})", letters.join(r"\s?"))
}
