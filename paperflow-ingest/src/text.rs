//! Text normalization helpers
//!
//! Accent folding is table-driven over the Latin-1 / Latin Extended-A letters
//! that occur in French administrative documents. Anything outside the table
//! is kept as-is for matching and dropped for folder names.

/// Maximum length of a normalized emitter name (characters)
pub const MAX_EMITTER_NAME_LEN: usize = 50;

/// Folder name used when an emitter name normalizes to nothing
pub const UNKNOWN_EMITTER: &str = "inconnu";

/// Fold a single character to its unaccented ASCII form(s)
fn fold_char(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => "A",
        'æ' => "ae",
        'Æ' => "AE",
        'ç' => "c",
        'Ç' => "C",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'È' | 'É' | 'Ê' | 'Ë' => "E",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'Ì' | 'Í' | 'Î' | 'Ï' => "I",
        'ñ' => "n",
        'Ñ' => "N",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => "O",
        'œ' => "oe",
        'Œ' => "OE",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'Ù' | 'Ú' | 'Û' | 'Ü' => "U",
        'ý' | 'ÿ' => "y",
        'Ý' | 'Ÿ' => "Y",
        'ß' => "ss",
        '’' | '‘' => "'",
        _ => return None,
    };
    Some(folded)
}

/// Replace accented letters by their ASCII equivalents
pub fn fold_accents(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match fold_char(c) {
            Some(folded) => out.push_str(folded),
            None => out.push(c),
        }
    }
    out
}

/// Lowercased, accent-folded form used by every matcher
pub fn normalize_for_match(input: &str) -> String {
    fold_accents(input).to_lowercase()
}

/// Filesystem-safe emitter folder name
///
/// Accents are folded, each run of non-alphanumeric characters becomes a
/// single `_`, leading/trailing `_` are trimmed and the result is bounded to
/// [`MAX_EMITTER_NAME_LEN`] characters. Case is preserved.
pub fn normalize_emitter_name(original: &str) -> String {
    let folded = fold_accents(original.trim());
    let mut out = String::with_capacity(folded.len());
    let mut pending_sep = false;

    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }

    if out.len() > MAX_EMITTER_NAME_LEN {
        out.truncate(MAX_EMITTER_NAME_LEN);
        while out.ends_with('_') {
            out.pop();
        }
    }

    if out.is_empty() {
        UNKNOWN_EMITTER.to_string()
    } else {
        out
    }
}

/// Lowercase alphabetic tokens of at least `min_len` characters
pub fn tokens(input: &str, min_len: usize) -> Vec<String> {
    normalize_for_match(input)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= min_len && t.chars().all(|c| c.is_alphabetic()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_accents() {
        assert_eq!(fold_accents("Crédit Agricole"), "Credit Agricole");
        assert_eq!(fold_accents("Électricité de France"), "Electricite de France");
        assert_eq!(fold_accents("œuvre"), "oeuvre");
    }

    #[test]
    fn test_normalize_for_match_lowercases() {
        assert_eq!(normalize_for_match("RELEVÉ de Compte"), "releve de compte");
    }

    #[test]
    fn test_emitter_name_keeps_case_and_replaces_specials() {
        assert_eq!(normalize_emitter_name("EDF"), "EDF");
        assert_eq!(normalize_emitter_name("Crédit Agricole"), "Credit_Agricole");
        assert_eq!(normalize_emitter_name("  S.N.C.F. / Voyages  "), "S_N_C_F_Voyages");
    }

    #[test]
    fn test_emitter_name_bounded() {
        let long = "A".repeat(80);
        assert_eq!(normalize_emitter_name(&long).len(), MAX_EMITTER_NAME_LEN);

        // Truncation never leaves a trailing separator
        let name = format!("{} B", "A".repeat(MAX_EMITTER_NAME_LEN - 1));
        assert!(!normalize_emitter_name(&name).ends_with('_'));
    }

    #[test]
    fn test_emitter_name_empty_falls_back() {
        assert_eq!(normalize_emitter_name("!!!"), UNKNOWN_EMITTER);
        assert_eq!(normalize_emitter_name(""), UNKNOWN_EMITTER);
    }

    #[test]
    fn test_tokens_filters_short_and_numeric() {
        let t = tokens("Facture n° 123 pour l'abonnement", 4);
        assert_eq!(t, vec!["facture", "pour", "abonnement"]);
    }
}
