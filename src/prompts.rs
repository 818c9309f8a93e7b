//! The fixed system contract sent with every translation request.
//!
//! Kept in one place so unit tests can inspect the prompt without a live
//! translation service.

/// Human-readable name for the language codes the pipeline is normally run
/// with. Unknown codes are passed through unchanged.
pub fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "ja" => "Japanese",
        "de" => "German",
        "fr" => "French",
        "es" => "Spanish",
        "it" => "Italian",
        "ko" => "Korean",
        "zh" => "Chinese",
        other => other,
    }
}

/// Build the system prompt for translating one manual page.
///
/// The page text itself is sent as the user message.
pub fn translation_system_prompt(source: &str, target: &str, preserve_terms: &[String]) -> String {
    let source = language_name(source);
    let target = language_name(target);

    let mut prompt = format!(
        "You are a professional technical translator for hardware synthesizer manuals.\n\
Translate the user's {source} text to {target}.\n\n\
Rules:\n\
1. Use a consistent technical documentation style"
    );
    if target == "Japanese" {
        prompt.push_str(" (です・ます調)");
    }
    prompt.push_str(".\n");

    if preserve_terms.is_empty() {
        prompt.push_str("2. Keep product names and technical abbreviations untranslated.\n");
    } else {
        prompt.push_str(&format!(
            "2. Keep these technical terms in {source} exactly as written: {}.\n",
            preserve_terms.join(", ")
        ));
    }

    prompt.push_str(
        "3. Keep markdown formatting, line structure, numbers and units intact.\n\
4. Output ONLY the translation, without any preamble, notes or code fences.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_languages_and_terms() {
        let terms = vec!["MIDI".to_string(), "CV".to_string()];
        let p = translation_system_prompt("en", "ja", &terms);
        assert!(p.contains("English text to Japanese"));
        assert!(p.contains("MIDI, CV"));
        assert!(p.contains("です・ます調"));
        assert!(p.contains("Output ONLY the translation"));
    }

    #[test]
    fn unknown_language_code_passes_through() {
        let p = translation_system_prompt("en", "pt-br", &[]);
        assert!(p.contains("to pt-br"));
        assert!(!p.contains("です・ます調"));
        assert!(p.contains("technical abbreviations untranslated"));
    }
}
