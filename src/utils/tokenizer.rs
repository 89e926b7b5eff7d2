/// Characters removed outright before splitting.
const STRIPPED_CHARS: [char; 6] = ['\'', ',', '(', ')', '[', ']'];

/// Characters that act as word separators.
const SEPARATOR_CHARS: [char; 2] = ['_', '-'];

/// Normalize free text into an ordered, de-duplicated set of search tokens.
///
/// Lowercases, strips quote/bracket punctuation, turns `_` and `-` into spaces,
/// collapses runs of spaces and splits on the remaining single spaces.
///
/// Empty input produces exactly one empty token. Callers treat that as
/// "no filter" rather than as a token to look up.
pub fn tokenize(input: &str) -> Vec<String> {
    let lowered = input.to_lowercase();

    let mut normalized = String::with_capacity(lowered.len());
    let mut prev_was_space = false;
    for ch in lowered.chars() {
        if STRIPPED_CHARS.contains(&ch) {
            continue;
        }
        let ch = if SEPARATOR_CHARS.contains(&ch) { ' ' } else { ch };
        // Only plain spaces collapse; tabs and newlines survive until trim
        if ch == ' ' {
            if prev_was_space {
                continue;
            }
            prev_was_space = true;
        } else {
            prev_was_space = false;
        }
        normalized.push(ch);
    }

    let mut tokens: Vec<String> = Vec::new();
    for part in normalized.trim().split(' ') {
        if !tokens.iter().any(|t| t == part) {
            tokens.push(part.to_string());
        }
    }
    tokens
}

/// True when a token list means "show everything".
pub fn is_unfiltered(tokens: &[String]) -> bool {
    tokens.len() == 1 && tokens[0].is_empty()
}

/// Build a synthetic attribute token such as `class=armor`.
///
/// Absent values render as `undefined` so they can still be searched for.
pub fn attribute_token(key: &str, value: Option<&str>) -> String {
    format!("{}={}", key, value.unwrap_or("undefined"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_mixed_separators() {
        let tokens = tokenize("Potion_of-Life  (Rare)");
        assert_eq!(tokens, vec!["potion", "of", "life", "rare"]);
    }

    #[test]
    fn test_tokenize_empty() {
        let tokens = tokenize("");
        assert_eq!(tokens, vec![String::new()]);
        assert!(is_unfiltered(&tokens));
    }

    #[test]
    fn test_tokenize_whitespace_only() {
        assert!(is_unfiltered(&tokenize("   ")));
        assert!(is_unfiltered(&tokenize("()[]")));
    }

    #[test]
    fn test_tokenize_dedups_in_order() {
        let tokens = tokenize("Red red RED blue");
        assert_eq!(tokens, vec!["red", "blue"]);
    }

    #[test]
    fn test_tokenize_strips_punctuation() {
        let tokens = tokenize("Hero's Sword, [Event]");
        assert_eq!(tokens, vec!["heros", "sword", "event"]);
    }

    #[test]
    fn test_tokenize_keeps_attribute_syntax() {
        let tokens = tokenize("class=armor id=00000001");
        assert_eq!(tokens, vec!["class=armor", "id=00000001"]);
    }

    #[test]
    fn test_attribute_token() {
        assert_eq!(attribute_token("class", Some("armor")), "class=armor");
        assert_eq!(attribute_token("slot", None), "slot=undefined");
    }

    #[test]
    fn test_not_unfiltered() {
        assert!(!is_unfiltered(&tokenize("sword")));
        assert!(!is_unfiltered(&[String::new(), "x".to_string()]));
    }
}
