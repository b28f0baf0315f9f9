use std::collections::HashMap;

/// Derives heading ids that are unique within one document.
///
/// The first occurrence of a slug is kept bare, later ones get `-2`, `-3` and so on in the
/// order they are requested. Create one slugger per document.
#[derive(Debug, Default)]
pub struct Slugger {
    occurrences: HashMap<String, usize>,
}

impl Slugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slug(&mut self, text: &str) -> String {
        let base = slugify(text);
        let mut candidate = base.clone();
        while self.occurrences.contains_key(&candidate) {
            let count = self.occurrences.entry(base.clone()).or_insert(1);
            *count += 1;
            candidate = format!("{base}-{count}");
        }
        self.occurrences.insert(candidate.clone(), 1);
        candidate
    }

    pub fn reset(&mut self) {
        self.occurrences.clear();
    }
}

/// Lowercases `text`, drops punctuation and turns spaces into `-`.
pub fn slugify(text: &str) -> String {
    text.trim()
        .chars()
        .flat_map(char::to_lowercase)
        .filter_map(|c| match c {
            ' ' => Some('-'),
            '-' | '_' => Some(c),
            c if c.is_alphanumeric() => Some(c),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Getting Started"), "getting-started");
        assert_eq!(slugify("  What's new?  "), "whats-new");
        assert_eq!(slugify("snake_case & kebab-case"), "snake_case--kebab-case");
        assert_eq!(slugify("Über Café"), "über-café");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_duplicates_get_numbered() {
        let mut slugger = Slugger::new();
        let ids: Vec<_> = ["Intro", "Intro", "Intro"].iter().map(|t| slugger.slug(t)).collect();
        assert_eq!(ids, ["intro", "intro-2", "intro-3"]);
    }

    #[test]
    fn test_suffix_collides_with_existing_slug() {
        let mut slugger = Slugger::new();
        assert_eq!(slugger.slug("Intro 2"), "intro-2");
        assert_eq!(slugger.slug("Intro"), "intro");
        assert_eq!(slugger.slug("Intro"), "intro-3");
    }

    #[test]
    fn test_reset() {
        let mut slugger = Slugger::new();
        assert_eq!(slugger.slug("Intro"), "intro");
        slugger.reset();
        assert_eq!(slugger.slug("Intro"), "intro");
    }
}
