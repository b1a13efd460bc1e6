use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use std::sync::OnceLock;

/// Lower-case, ASCII-folded, dash-separated form of `text`.
///
/// Returns an empty string when nothing slug-worthy remains.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;

    for c in text.chars().flat_map(char::to_lowercase) {
        let Some(folded) = fold(c) else {
            pending_dash = !slug.is_empty();
            continue;
        };
        if pending_dash {
            slug.push('-');
            pending_dash = false;
        }
        match folded {
            Folded::Char(c) => slug.push(c),
            Folded::Str(s) => slug.push_str(s),
        }
    }

    slug
}

enum Folded {
    Char(char),
    Str(&'static str),
}

/// ASCII spelling of a lower-case character, `None` for separators.
fn fold(c: char) -> Option<Folded> {
    let folded = match c {
        'a'..='z' | '0'..='9' => return Some(Folded::Char(c)),
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'æ' => "ae",
        'œ' => "oe",
        'ß' => "ss",
        _ => return None,
    };
    Some(Folded::Str(folded))
}

/// `page-` plus five random lower-case alphanumerics, for titles that
/// slugify to nothing.
pub fn random_page_slug() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect();
    format!("page-{suffix}")
}

/// Slugs that may appear in a URL unchanged.
pub fn is_valid_slug(slug: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(slug))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_folds_accents_and_collapses_separators() {
        assert_eq!(slugify("Guide d'Équipe  2024"), "guide-d-equipe-2024");
        assert_eq!(slugify("  Hello, World!  "), "hello-world");
        assert_eq!(slugify("Straße"), "strasse");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn random_slugs_are_valid() {
        for _ in 0..20 {
            let slug = random_page_slug();
            assert!(slug.starts_with("page-"));
            assert_eq!(slug.len(), 10);
            assert!(is_valid_slug(&slug), "{slug}");
        }
    }

    #[test]
    fn slug_validation() {
        assert!(is_valid_slug("getting-started"));
        assert!(is_valid_slug("v2"));
        assert!(!is_valid_slug("Getting-Started"));
        assert!(!is_valid_slug("a--b"));
        assert!(!is_valid_slug("-a"));
        assert!(!is_valid_slug("a b"));
        assert!(!is_valid_slug(""));
    }
}
