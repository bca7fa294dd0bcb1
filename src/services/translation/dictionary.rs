use std::collections::HashSet;

/// Honorifics and onomatopoeia kept as-is
const COMIC_TERMS: &[&str] = &[
    "senpai", "sunbae", "oppa", "noona", "hyung", "sensei", "sama", "chan", "kun", "onee", "oni",
    "ah", "eh", "uh", "hm", "hmm", "ha", "heh", "hehe", "haha", "kyaa", "nyaa", "wan", "kuku",
    "ufufu", "ahaha", "ehh", "ehhh",
];

/// Interjections kept as-is
const INTERJECTIONS: &[&str] = &["ah", "eh", "uh", "hm", "hmm", "ha", "heh", "kyaa", "nya", "wan"];

/// Short-circuits words that should never reach the translation backend.
pub struct ComicDictionary {
    terms: HashSet<&'static str>,
}

impl ComicDictionary {
    pub fn new() -> Self {
        Self {
            terms: COMIC_TERMS.iter().chain(INTERJECTIONS).copied().collect(),
        }
    }

    /// Source text unchanged when the whole line is a known term
    /// (case-insensitive), otherwise `None`.
    pub fn lookup(&self, text: &str) -> Option<String> {
        let key = text.trim().to_lowercase();
        if self.terms.contains(key.as_str()) {
            Some(text.trim().to_string())
        } else {
            None
        }
    }
}

impl Default for ComicDictionary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terms_pass_through_case_insensitively() {
        let dict = ComicDictionary::new();
        assert_eq!(dict.lookup("ah").as_deref(), Some("ah"));
        assert_eq!(dict.lookup("Senpai").as_deref(), Some("Senpai"));
        assert_eq!(dict.lookup(" NYA ").as_deref(), Some("NYA"));
    }

    #[test]
    fn test_sentences_are_not_matched() {
        let dict = ComicDictionary::new();
        assert!(dict.lookup("ah, hello").is_none());
        assert!(dict.lookup("HELLO THERE").is_none());
    }
}
