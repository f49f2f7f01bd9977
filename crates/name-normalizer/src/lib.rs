//! Canonicalizes team names across the schedule, odds, and rankings
//! sources, which never agree on spelling (§4.1).

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Curated disambiguation table for homonyms the schedule/odds/rankings
/// sources spell identically but mean differently (Miami OH vs Miami FL,
/// the North Carolina schools, etc). Keys and values are already
/// lowercase-normalized forms.
static DISAMBIGUATION: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("miami", "miami fl"),
        ("miami hurricanes", "miami fl"),
        ("miami redhawks", "miami oh"),
        ("miami (oh)", "miami oh"),
        ("miami (fl)", "miami fl"),
        ("north carolina", "unc"),
        ("north carolina tar heels", "unc"),
        ("north carolina a and t", "nc a and t"),
        ("nc central", "nc central"),
        ("north carolina central", "nc central"),
        ("st johns", "st johns"),
        ("saint johns", "st johns"),
        ("st marys", "saint marys ca"),
        ("saint marys", "saint marys ca"),
    ])
});

/// Suffixes/mascots stripped before matching (not before display).
const MASCOT_SUFFIXES: &[&str] = &[
    "bulldogs", "wildcats", "tigers", "eagles", "hurricanes", "tar heels",
    "blue devils", "wolfpack", "cardinals", "cavaliers", "hoyas", "spartans",
    "wolverines", "huskies", "gators", "hawkeyes", "boilermakers", "badgers",
    "cyclones", "mountaineers", "aggies", "longhorns", "sooners", "bears",
    "cougars", "owls", "panthers", "rams", "bobcats", "bearcats", "hokies",
    "gamecocks", "volunteers", "commodores", "razorbacks", "crimson tide",
];

fn lowercase_collapse(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_space = false;
    for ch in name.to_ascii_lowercase().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

fn rewrite_abbreviations(name: &str) -> String {
    name.replace(" state", " st")
        .replace("st.", "st")
        .replace(" a&m", " a and m")
        .replace("a&m", "a and m")
        .replace('&', " and ")
        .replace(" tech", " tech")
        .replace(['.', '\''], "")
}

/// Lowercases, collapses whitespace, rewrites institutional abbreviations,
/// and (for `for_matching`) strips a trailing mascot token.
pub fn normalize(name: &str, for_matching: bool) -> String {
    let base = lowercase_collapse(name);
    let rewritten = rewrite_abbreviations(&base);
    let collapsed = lowercase_collapse(&rewritten);

    if !for_matching {
        return collapsed;
    }

    for mascot in MASCOT_SUFFIXES {
        if let Some(stripped) = collapsed.strip_suffix(mascot) {
            let trimmed = stripped.trim_end();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    collapsed
}

/// `normalize` plus the disambiguation table — the stable key used as a
/// cache/join key across sources.
pub fn canonical(name: &str) -> String {
    let normalized = normalize(name, true);
    DISAMBIGUATION
        .get(normalized.as_str())
        .map(|s| s.to_string())
        .unwrap_or(normalized)
}

/// A handful of spellings a vendor might use for this team — used by
/// `RankingsSource::get_team_stats`'s last-resort lookup (§4.5).
pub fn variations(name: &str) -> Vec<String> {
    let mut out = vec![normalize(name, false), normalize(name, true), canonical(name)];
    out.sort();
    out.dedup();
    out
}

/// Longest-common-substring-based partial ratio in `[0, 100]`, matching the
/// semantics of the widely used "partial ratio" fuzzy-match family: the
/// best alignment of the shorter string inside the longer one, scored by
/// character agreement.
pub fn partial_ratio(a: &str, b: &str) -> u32 {
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if shorter.is_empty() {
        return if longer.is_empty() { 100 } else { 0 };
    }

    let longer_chars: Vec<char> = longer.chars().collect();
    let shorter_chars: Vec<char> = shorter.chars().collect();
    let window = shorter_chars.len();

    if longer_chars.len() < window {
        return char_match_ratio(&shorter_chars, &longer_chars);
    }

    let mut best = 0u32;
    for start in 0..=(longer_chars.len() - window) {
        let slice = &longer_chars[start..start + window];
        let score = char_match_ratio(&shorter_chars, slice);
        best = best.max(score);
    }
    best
}

fn char_match_ratio(a: &[char], b: &[char]) -> u32 {
    let len = a.len().max(b.len());
    if len == 0 {
        return 100;
    }
    let matches = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    ((matches * 100) / len) as u32
}

/// Fuzzy-match threshold used throughout the pipeline (odds team-label
/// recovery, event-to-game matching): invariant 6 in §8.
pub const FUZZY_MATCH_THRESHOLD: u32 = 75;

/// True iff `canonical(a) == canonical(b)`, else fall back to a fuzzy
/// partial-ratio ≥ 75 on the normalized forms (§4.1).
pub fn match_names(a: &str, b: &str) -> bool {
    if canonical(a) == canonical(b) {
        return true;
    }
    partial_ratio(&normalize(a, true), &normalize(b, true)) >= FUZZY_MATCH_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_canonical_match() {
        assert!(match_names("Duke Blue Devils", "Duke"));
    }

    #[test]
    fn state_abbreviation_normalizes() {
        assert_eq!(normalize("Ohio State", false), "ohio st");
    }

    #[test]
    fn miami_disambiguation() {
        assert_eq!(canonical("Miami Hurricanes"), "miami fl");
        assert_eq!(canonical("Miami RedHawks"), "miami oh");
        assert_ne!(canonical("Miami Hurricanes"), canonical("Miami RedHawks"));
    }

    #[test]
    fn fuzzy_threshold_matches_near_spellings() {
        // Minor vendor misspelling, still close enough to pass threshold.
        assert!(match_names("North Carolina A&T Aggies", "NC A&T"));
    }

    #[test]
    fn fuzzy_threshold_rejects_unrelated_names() {
        assert!(!match_names("Duke Blue Devils", "Kansas Jayhawks"));
    }

    #[test]
    fn partial_ratio_bounds() {
        assert_eq!(partial_ratio("", ""), 100);
        assert_eq!(partial_ratio("abc", "abc"), 100);
        assert!(partial_ratio("abc", "xyz") < 75);
    }
}
