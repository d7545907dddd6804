/// Pairs of quote characters a model likes to wrap its answer in
const QUOTE_PAIRS: [(char, char); 7] = [
    ('"', '"'),
    ('\'', '\''),
    ('`', '`'),
    ('\u{201C}', '\u{201D}'),
    ('\u{2018}', '\u{2019}'),
    ('\u{00AB}', '\u{00BB}'),
    ('\u{300C}', '\u{300D}'),
];

/// Line prefixes that introduce the answer rather than belong to it
const PREAMBLE_PREFIXES: [&str; 6] = [
    "here is the translation",
    "here's the translation",
    "sure, here",
    "sure! here",
    "translation:",
    "translated text:",
];

/// Echoes of the request that must never be spoken
const ECHO_PREFIXES: [&str; 3] = ["translate this to", "translate the following", "you are a professional translator"];

/// Reduce a chat reply to the bare translated text.
///
/// Strips code fences, introductory and echoed instruction lines, an inline
/// `Translation:` label and surrounding quotes. Line breaks inside the
/// translation are preserved.
pub fn clean_translation(response: &str) -> String {
    let unfenced = remove_markdown_code_blocks(response.trim());

    let mut lines: Vec<&str> = unfenced.lines().map(str::trim).collect();
    skip_introduction(&mut lines);

    // only leading lines can be an echo of the request
    while let Some(&first) = lines.first().filter(|line| is_echo(line)) {
        let more_follows = lines[1..].iter().any(|line| !line.is_empty());
        match first.split_once(':').map(|(_, rest)| rest.trim()) {
            // a one-line echo carries the answer after its colon
            Some(rest) if !rest.is_empty() && !more_follows => lines[0] = rest,
            // otherwise whatever follows the colon is the echoed source
            _ => {
                lines.remove(0);
            }
        }
        if !more_follows {
            break;
        }
        skip_introduction(&mut lines);
    }

    let mut text = lines.join("\n").trim().to_string();

    for label in ["Translation:", "Translated text:"] {
        let labelled = text
            .get(..label.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(label));
        if labelled && text.len() > label.len() {
            text = text[label.len()..].trim().to_string();
        }
    }

    strip_wrapping_quotes(&text)
}

/// Drop leading blank and preamble lines
fn skip_introduction(lines: &mut Vec<&str>) {
    let skip = lines
        .iter()
        .take_while(|line| line.is_empty() || is_preamble(line))
        .count();
    lines.drain(..skip);
}

fn is_preamble(line: &str) -> bool {
    let lower = line.to_lowercase();
    let is_label_only = lower.ends_with(':') && lower.split_whitespace().count() <= 8;
    PREAMBLE_PREFIXES
        .iter()
        .any(|p| lower.starts_with(p) && (is_label_only || lower == *p))
}

fn is_echo(line: &str) -> bool {
    let lower = line.to_lowercase();
    ECHO_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Remove markdown code blocks from text
fn remove_markdown_code_blocks(text: &str) -> String {
    if text.starts_with("```") && text.ends_with("```") && text.len() >= 6 {
        let inner = &text[3..text.len() - 3];
        // drop an info string such as ```text
        let inner = match inner.find('\n') {
            Some(idx) if !inner[..idx].trim().contains(' ') => &inner[idx + 1..],
            _ => inner,
        };
        return inner.trim().to_string();
    }
    text.to_string()
}

fn strip_wrapping_quotes(text: &str) -> String {
    let mut current = text.trim();
    loop {
        let mut stripped = false;
        for (open, close) in QUOTE_PAIRS {
            if current.chars().count() >= 2 && current.starts_with(open) && current.ends_with(close) {
                let inner = &current[open.len_utf8()..current.len() - close.len_utf8()];
                // keep quotes that only wrap part of the text, e.g. "a" and "b"
                if open == close && inner.contains(open) {
                    continue;
                }
                current = inner.trim();
                stripped = true;
                break;
            }
        }
        if !stripped {
            return current.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_untouched() {
        assert_eq!(clean_translation("  Hola, ¿cómo estás?  \n"), "Hola, ¿cómo estás?");
    }

    #[test]
    fn test_wrapping_quotes_removed() {
        assert_eq!(clean_translation("\"Bonjour tout le monde\""), "Bonjour tout le monde");
        assert_eq!(clean_translation("“Hallo Welt”"), "Hallo Welt");
        assert_eq!(clean_translation("«Привет»"), "Привет");
        assert_eq!(clean_translation("'\"nested\"'"), "nested");
    }

    #[test]
    fn test_inner_quotes_kept() {
        assert_eq!(clean_translation("\"uno\" y \"dos\""), "\"uno\" y \"dos\"");
        assert_eq!(clean_translation("Dijo \"hola\""), "Dijo \"hola\"");
    }

    #[test]
    fn test_preamble_and_label_removed() {
        assert_eq!(
            clean_translation("Here is the translation:\n\n\"Hola mundo\""),
            "Hola mundo"
        );
        assert_eq!(clean_translation("Translation: Hola mundo"), "Hola mundo");
        assert_eq!(clean_translation("Sure, here is the Spanish translation:\nHola"), "Hola");
    }

    #[test]
    fn test_instruction_echo_removed() {
        assert_eq!(
            clean_translation("Translate this to Spanish: Hello\nHola"),
            "Hola"
        );
        assert_eq!(
            clean_translation("Translate this to Spanish:\n\nHere is the translation:\nHola"),
            "Hola"
        );
    }

    #[test]
    fn test_one_line_echo_keeps_answer() {
        assert_eq!(clean_translation("Translate this to Spanish: Hola"), "Hola");
        assert_eq!(clean_translation("Translate this to French: \"Bonjour\""), "Bonjour");
    }

    #[test]
    fn test_echo_phrase_inside_translation_kept() {
        assert_eq!(
            clean_translation("Hola a todos.\nTranslate the following words later."),
            "Hola a todos.\nTranslate the following words later."
        );
    }

    #[test]
    fn test_code_fence_removed() {
        assert_eq!(clean_translation("```text\nCiao a tutti\n```"), "Ciao a tutti");
        assert_eq!(clean_translation("```\nCiao\n```"), "Ciao");
    }

    #[test]
    fn test_multiline_translation_preserved() {
        assert_eq!(
            clean_translation("Primera línea.\nSegunda línea."),
            "Primera línea.\nSegunda línea."
        );
    }

    #[test]
    fn test_only_quotes_yields_empty() {
        assert_eq!(clean_translation("\"\""), "");
        assert_eq!(clean_translation("   "), "");
    }
}
